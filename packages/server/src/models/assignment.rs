use crate::entity::{assignment, testcase};

/// Fields for a new assignment.
#[derive(Clone, Debug)]
pub struct NewAssignment {
    pub workspace_id: i64,
    /// Milliseconds, must be positive.
    pub time_limit: i32,
    /// MiB, must be positive.
    pub memory_limit: i32,
}

/// An assignment with its testcases in position order.
#[derive(Clone, Debug)]
pub struct AssignmentWithTestcases {
    pub assignment: assignment::Model,
    pub testcases: Vec<testcase::Model>,
}

