use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::MqAppConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Default: 100.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Default: 5.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    100
}
fn default_min_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Where submission sources and testcase fixtures are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store. Default: "./data/objects".
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Base URL graders fetch artifacts from; object paths are joined onto it.
    pub public_base_url: String,
    /// Largest accepted object in bytes. Default: 16 MiB.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
    /// Use this bucket instead of the local root when set.
    #[cfg(feature = "object-storage")]
    #[serde(default)]
    pub s3: Option<common::storage::s3::S3Settings>,
}

fn default_storage_root() -> String {
    "./data/objects".into()
}
fn default_max_object_size() -> u64 {
    16 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    /// Live connections kept per user before the oldest is evicted. Default: 4.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    /// Frames buffered per connection before it is considered dead. Default: 64.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Pending notifications between the result consumer and the hub. Default: 1024.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

fn default_max_connections_per_user() -> usize {
    4
}
fn default_outbound_buffer() -> usize {
    64
}
fn default_notification_buffer() -> usize {
    1024
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: default_max_connections_per_user(),
            outbound_buffer: default_outbound_buffer(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerConfig {
    /// Grading responses handled concurrently. Default: 16.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    16
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdConfig {
    /// Machine tag for generated ids. Processes may share a tag; each one
    /// leases its own instance slot under it. Default: 0.
    #[serde(default)]
    pub machine_id: u16,
    /// Lifetime of the instance lease, renewed every third of it. Default: 30.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

fn default_lease_ttl_secs() -> u64 {
    30
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            machine_id: 0,
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub ids: IdConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("AUTOGRADE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("storage.root", "./data/objects")?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.request_queue", "grading.request")?
            .set_default("mq.response_queue", "grading.response")?
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., AUTOGRADE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("AUTOGRADE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
