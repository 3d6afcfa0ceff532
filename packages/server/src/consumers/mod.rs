pub mod grading_result;

pub use grading_result::{HandleOutcome, RejectReason, ResultConsumer};
