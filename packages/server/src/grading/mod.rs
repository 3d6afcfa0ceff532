//! Outbound half of the pipeline: submission intake and grading requests.

pub mod dispatch;
pub mod intake;

pub use dispatch::{DispatchError, GradingDispatcher};
pub use intake::{SubmissionService, SubmitError};
