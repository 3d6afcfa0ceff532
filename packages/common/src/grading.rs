use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Artifact URLs for one testcase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestArtifacts {
    /// Input fed to the program
    pub input_url: String,
    /// Expected output
    pub output_url: String,
}

/// Resource limits forwarded to the grader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSettings {
    /// Time limit in milliseconds
    pub time_limit: i32,
    /// Memory limit in MiB
    pub memory_limit: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub assignment_id: i64,
    pub submission_id: i64,
    /// Same order as `GradingRequest::tests`.
    pub testcase_ids: Vec<i64>,
    pub start_time: DateTime<Utc>,
}

/// A grading request published to the grading fleet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    /// Programming language (e.g., "cpp", "python")
    pub language: String,
    pub source_url: String,
    pub tests: Vec<TestArtifacts>,
    pub settings: GradingSettings,
    pub metadata: RequestMetadata,
}

impl GradingRequest {
    /// Returns true if every test has exactly one testcase id at the same index.
    pub fn is_aligned(&self) -> bool {
        self.tests.len() == self.metadata.testcase_ids.len()
    }
}

/// Outcome of one testcase as reported by the grader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    /// Hash of the produced output.
    #[serde(default)]
    pub hash: String,
    pub pass: bool,
    /// Execution time in milliseconds.
    pub time: i64,
    /// Optional echo of the testcase id. When present it must match the
    /// metadata id at the same index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testcase_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub submission_id: i64,
    pub testcase_ids: Vec<i64>,
}

/// A grading response consumed from the response queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResponse {
    #[serde(default)]
    pub compile_output: String,
    pub results: Vec<TestOutcome>,
    pub metadata: ResponseMetadata,
}

/// The response cannot be matched to testcases.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("response has {results} results for {testcases} testcase ids")]
    LengthMismatch { results: usize, testcases: usize },

    #[error("response carries no testcase ids")]
    Empty,

    #[error("testcase id {0} appears more than once")]
    DuplicateTestcase(i64),

    #[error("result {index} echoes testcase {echoed} but metadata lists {expected}")]
    EchoMismatch {
        index: usize,
        echoed: i64,
        expected: i64,
    },
}

impl GradingResponse {
    /// Pair every outcome with its testcase id by position.
    ///
    /// Fails when the arrays differ in length, when an id repeats, or when an
    /// echoed per-entry id disagrees with the metadata.
    pub fn correlate(&self) -> Result<Vec<(i64, &TestOutcome)>, CorrelationError> {
        let ids = &self.metadata.testcase_ids;

        if self.results.len() != ids.len() {
            return Err(CorrelationError::LengthMismatch {
                results: self.results.len(),
                testcases: ids.len(),
            });
        }
        if ids.is_empty() {
            return Err(CorrelationError::Empty);
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(CorrelationError::DuplicateTestcase(*id));
            }
        }

        ids.iter()
            .zip(&self.results)
            .enumerate()
            .map(|(index, (id, outcome))| match outcome.testcase_id {
                Some(echoed) if echoed != *id => Err(CorrelationError::EchoMismatch {
                    index,
                    echoed,
                    expected: *id,
                }),
                _ => Ok((*id, outcome)),
            })
            .collect()
    }
}
