pub type RetryStrategy = broccoli_queue::queue::RetryStrategy;

/// Connection settings for the redis-backed broker.
#[derive(Debug, Clone)]
pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

impl MqConfig {
    /// Rejected messages are parked on the failed queue, never redelivered.
    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::new().retry_failed(false)
    }
}
