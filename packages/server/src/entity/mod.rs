pub mod assignment;
pub mod id_lease;
pub mod submission;
pub mod submission_result;
pub mod testcase;
