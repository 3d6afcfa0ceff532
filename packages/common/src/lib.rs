pub mod config;
pub mod grading;
pub mod id;
pub mod result_status;
pub mod storage;

pub use config::MqAppConfig;
pub use id::IdGenerator;
pub use result_status::{ResultStatus, aggregate_status};
