pub mod assignment;
pub mod submission;

pub use assignment::{AssignmentWithTestcases, NewAssignment};
pub use submission::{
    CreateSubmissionRequest, NewSubmission, ResultUpdate, SubmissionResultView, SubmissionView,
};
