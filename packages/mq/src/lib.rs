pub mod broker;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis;

pub use broker::{Acker, Broker, Delivery, DeliveryStream};
pub use config::MqConfig;
pub use error::MqError;
pub use memory::{MemoryBroker, Settlement};
pub use redis::RedisBroker;
