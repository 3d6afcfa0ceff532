use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Routing key for grading requests (server publishes, graders consume). Default: "grading.request".
    #[serde(default = "default_request_queue")]
    pub request_queue: String,
    /// Routing key for grading responses (graders publish, server consumes). Default: "grading.response".
    #[serde(default = "default_response_queue")]
    pub response_queue: String,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_request_queue() -> String {
    "grading.request".into()
}
fn default_response_queue() -> String {
    "grading.response".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            request_queue: default_request_queue(),
            response_queue: default_response_queue(),
        }
    }
}
