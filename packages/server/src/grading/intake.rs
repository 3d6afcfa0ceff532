use std::sync::Arc;

use common::IdGenerator;
use common::storage::{BoxReader, ObjectStore, StorageError};
use thiserror::Error;
use tracing::{error, info, instrument};

use super::dispatch::{DispatchError, GradingDispatcher};
use crate::entity::{assignment, submission, testcase};
use crate::models::{NewAssignment, NewSubmission};
use crate::store::{ResultStore, StoreError};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to store artifact: {0}")]
    Storage(#[from] StorageError),

    /// The submission is recorded but no grader will pick it up. It stays in
    /// `GRADING` until something dispatches it again.
    #[error("submission {submission_id} was recorded but not scheduled for grading")]
    NotScheduled {
        submission_id: i64,
        #[source]
        source: DispatchError,
    },
}

pub fn source_object_path(assignment_id: i64, submission_id: i64) -> String {
    format!("submissions/{assignment_id}/{submission_id}/source")
}

pub fn testcase_object_paths(assignment_id: i64, testcase_id: i64) -> (String, String) {
    let prefix = format!("assignments/{assignment_id}/testcases/{testcase_id}");
    (format!("{prefix}/input"), format!("{prefix}/output"))
}

/// Accepts assignments, testcases and submissions and schedules grading.
#[derive(Clone)]
pub struct SubmissionService {
    store: ResultStore,
    objects: Arc<dyn ObjectStore>,
    dispatcher: Arc<GradingDispatcher>,
    ids: Arc<IdGenerator>,
}

impl SubmissionService {
    pub fn new(
        store: ResultStore,
        objects: Arc<dyn ObjectStore>,
        dispatcher: Arc<GradingDispatcher>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            store,
            objects,
            dispatcher,
            ids,
        }
    }

    pub async fn create_assignment(
        &self,
        new: NewAssignment,
    ) -> Result<assignment::Model, SubmitError> {
        let model = self.store.create_assignment(self.ids.next_id(), new).await?;
        info!(assignment_id = model.id, "Created assignment");
        Ok(model)
    }

    /// Upload both fixtures, then append the testcase to the assignment.
    pub async fn add_testcase(
        &self,
        assignment_id: i64,
        input: BoxReader,
        expected_output: BoxReader,
    ) -> Result<testcase::Model, SubmitError> {
        let testcase_id = self.ids.next_id();
        let (input_path, output_path) = testcase_object_paths(assignment_id, testcase_id);

        self.objects.upload(input, &input_path).await?;
        self.objects.upload(expected_output, &output_path).await?;

        let model = self
            .store
            .add_testcase(testcase_id, assignment_id, input_path, output_path)
            .await?;
        Ok(model)
    }

    /// Record a submission and schedule it for grading.
    ///
    /// Order matters: the source is uploaded and the submission with its
    /// `GRADING` rows committed before the request is published, so the only
    /// inconsistent outcome is a recorded submission that was never
    /// scheduled. That case is reported as [`SubmitError::NotScheduled`].
    #[instrument(skip(self, source), fields(submission_id))]
    pub async fn submit(
        &self,
        user_id: i64,
        assignment_id: i64,
        language: &str,
        source: BoxReader,
    ) -> Result<submission::Model, SubmitError> {
        let current = self.store.load_assignment(assignment_id).await?;
        if current.testcases.is_empty() {
            return Err(StoreError::NoTestcases(assignment_id).into());
        }

        let submission_id = self.ids.next_id();
        tracing::Span::current().record("submission_id", submission_id);

        let source_path = source_object_path(assignment_id, submission_id);
        self.objects.upload(source, &source_path).await?;

        // Dispatch the testcase set the result rows were created for, which
        // may differ from the early read if a testcase was added meanwhile.
        let (submission, assignment) = self
            .store
            .create_submission(NewSubmission {
                id: submission_id,
                assignment_id,
                user_id,
                language: language.to_string(),
                source_path,
            })
            .await?;

        if let Err(e) = self.dispatcher.dispatch(&assignment, &submission).await {
            error!(error = %e, "Submission recorded but not scheduled for grading");
            return Err(SubmitError::NotScheduled {
                submission_id,
                source: e,
            });
        }

        Ok(submission)
    }
}
