use std::sync::Arc;

use chrono::Utc;
use common::grading::{GradingRequest, GradingSettings, RequestMetadata, TestArtifacts};
use common::storage::{StorageError, validate_object_path};
use mq::{Broker, MqError};
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::entity::submission;
use crate::models::AssignmentWithTestcases;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot build artifact URL for '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("failed to encode grading request: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("failed to publish grading request: {0}")]
    PublishFailed(#[from] MqError),

    #[error("assignment {0} has no testcases")]
    NoTestcases(i64),
}

/// Builds grading requests and publishes them to the request queue.
///
/// Never touches the database: everything a request needs is passed in.
pub struct GradingDispatcher {
    broker: Arc<dyn Broker>,
    base_url: Url,
    topic: String,
}

impl GradingDispatcher {
    /// `base_url` is where graders fetch artifacts; object paths are joined
    /// onto it as relative references.
    pub fn new(
        broker: Arc<dyn Broker>,
        base_url: &str,
        topic: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        // Without a trailing slash `join` would replace the last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            broker,
            base_url,
            topic: topic.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Resolve a stored object path to the absolute URL graders fetch.
    pub fn resolve(&self, path: &str) -> Result<String, DispatchError> {
        let path = validate_object_path(path).map_err(|e| match e {
            StorageError::InvalidPath { path, reason } => DispatchError::InvalidPath {
                path,
                reason: reason.to_string(),
            },
            other => DispatchError::InvalidPath {
                path: path.to_string(),
                reason: other.to_string(),
            },
        })?;

        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| DispatchError::InvalidPath {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build the request for `submission` without publishing it.
    ///
    /// `tests` and `metadata.testcase_ids` come from the same walk over the
    /// assignment's testcases, so index `i` of one always names index `i` of
    /// the other.
    pub fn build_request(
        &self,
        assignment: &AssignmentWithTestcases,
        submission: &submission::Model,
    ) -> Result<GradingRequest, DispatchError> {
        if assignment.testcases.is_empty() {
            return Err(DispatchError::NoTestcases(assignment.assignment.id));
        }

        let mut tests = Vec::with_capacity(assignment.testcases.len());
        let mut testcase_ids = Vec::with_capacity(assignment.testcases.len());
        for testcase in &assignment.testcases {
            tests.push(TestArtifacts {
                input_url: self.resolve(&testcase.input_path)?,
                output_url: self.resolve(&testcase.output_path)?,
            });
            testcase_ids.push(testcase.id);
        }

        Ok(GradingRequest {
            language: submission.language.clone(),
            source_url: self.resolve(&submission.source_path)?,
            tests,
            settings: GradingSettings {
                time_limit: assignment.assignment.time_limit,
                memory_limit: assignment.assignment.memory_limit,
            },
            metadata: RequestMetadata {
                assignment_id: assignment.assignment.id,
                submission_id: submission.id,
                testcase_ids,
                start_time: Utc::now(),
            },
        })
    }

    /// Build, encode and publish the grading request for `submission`.
    ///
    /// The submission and its `GRADING` rows must already be committed. There
    /// is no retry: a failure is returned to the caller as is.
    #[instrument(
        skip(self, assignment, submission),
        fields(submission_id = submission.id, assignment_id = assignment.assignment.id)
    )]
    pub async fn dispatch(
        &self,
        assignment: &AssignmentWithTestcases,
        submission: &submission::Model,
    ) -> Result<(), DispatchError> {
        let request = self.build_request(assignment, submission)?;
        let body = serde_json::to_vec(&request)?;
        self.broker.publish(&self.topic, body).await?;

        info!(
            queue = %self.topic,
            testcases = request.metadata.testcase_ids.len(),
            "Dispatched grading request"
        );
        Ok(())
    }
}
