use chrono::{DateTime, Utc};
use common::{ResultStatus, aggregate_status};
use serde::{Deserialize, Serialize};

use crate::entity::{submission, submission_result};

/// Fields the caller supplies when recording a new submission.
#[derive(Clone, Debug)]
pub struct NewSubmission {
    pub id: i64,
    pub assignment_id: i64,
    pub user_id: i64,
    pub language: String,
    pub source_path: String,
}

/// Per-testcase outcome to be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultUpdate {
    pub testcase_id: i64,
    pub status: ResultStatus,
    pub status_detail: Option<String>,
    pub memory_usage: Option<i64>,
    pub time_usage: Option<i64>,
}

/// A testcase result as shown to users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResultView {
    pub testcase_id: i64,
    pub status: ResultStatus,
    pub status_detail: Option<String>,
    pub memory_usage: Option<i64>,
    pub time_usage: Option<i64>,
}

impl From<submission_result::Model> for SubmissionResultView {
    fn from(row: submission_result::Model) -> Self {
        Self {
            testcase_id: row.testcase_id,
            status: row.status,
            status_detail: row.status_detail,
            memory_usage: row.memory_usage,
            time_usage: row.time_usage,
        }
    }
}

/// A submission with its nested results; the payload of `onSubmissionUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: i64,
    pub assignment_id: i64,
    pub user_id: i64,
    pub language: String,
    pub source_path: String,
    pub compilation_log: Option<String>,
    /// Derived from `results`, never stored.
    pub status: ResultStatus,
    pub results: Vec<SubmissionResultView>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionView {
    /// Build the view; `results` must already be in testcase order.
    pub fn new(submission: submission::Model, results: Vec<submission_result::Model>) -> Self {
        let results: Vec<SubmissionResultView> =
            results.into_iter().map(SubmissionResultView::from).collect();
        let status = aggregate_status(results.iter().map(|r| r.status));

        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            user_id: submission.user_id,
            language: submission.language,
            source_path: submission.source_path,
            compilation_log: submission.compilation_log,
            status,
            results,
            created_at: submission.created_at,
        }
    }
}

/// Request body for submitting source code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    /// Programming language (e.g., "cpp", "python")
    pub language: String,
    /// Source code
    pub source: String,
}

impl CreateSubmissionRequest {
    pub const MAX_SOURCE_BYTES: usize = 256 * 1024;

    pub fn validate(&self) -> Result<(), String> {
        let language = self.language.trim();
        if language.is_empty() || language.len() > 32 {
            return Err("Language must be 1-32 characters".into());
        }
        if self.source.is_empty() {
            return Err("Source must not be empty".into());
        }
        if self.source.len() > Self::MAX_SOURCE_BYTES {
            return Err(format!(
                "Source exceeds {} bytes",
                Self::MAX_SOURCE_BYTES
            ));
        }
        Ok(())
    }
}
