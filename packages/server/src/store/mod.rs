//! Transactional persistence for assignments, submissions and their results.

mod id_lease;

use std::collections::HashSet;

use chrono::Utc;
use common::ResultStatus;
use common::id::IdError;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::entity::{assignment, submission, submission_result, testcase};
use crate::models::{
    AssignmentWithTestcases, NewAssignment, NewSubmission, ResultUpdate, SubmissionView,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("submission {0} not found")]
    SubmissionNotFound(i64),

    #[error("assignment {0} not found")]
    AssignmentNotFound(i64),

    #[error("assignment {0} has no testcases")]
    NoTestcases(i64),

    #[error("assignment {0} already has submissions and can no longer change")]
    AssignmentLocked(i64),

    #[error("limits must be positive (time {time_limit} ms, memory {memory_limit} MiB)")]
    InvalidLimits { time_limit: i32, memory_limit: i32 },

    #[error("empty result batch for submission {0}")]
    EmptyResultBatch(i64),

    #[error("testcase {testcase_id} is not graded for submission {submission_id}")]
    UnknownTestcase { submission_id: i64, testcase_id: i64 },

    #[error("result for testcase {testcase_id} of submission {submission_id} is not terminal")]
    NonTerminalResult { submission_id: i64, testcase_id: i64 },

    #[error(transparent)]
    IdTag(#[from] IdError),

    #[error("every id instance under machine {0} is held by a live process")]
    NoFreeIdInstance(u16),

    #[error("lease on id instance {1} of machine {0} was lost")]
    IdLeaseLost(u16, u16),
}

/// Database-backed store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ResultStore {
    db: DatabaseConnection,
}

impl ResultStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_assignment(
        &self,
        id: i64,
        new: NewAssignment,
    ) -> Result<assignment::Model, StoreError> {
        if new.time_limit <= 0 || new.memory_limit <= 0 {
            return Err(StoreError::InvalidLimits {
                time_limit: new.time_limit,
                memory_limit: new.memory_limit,
            });
        }

        let model = assignment::ActiveModel {
            id: Set(id),
            workspace_id: Set(new.workspace_id),
            time_limit: Set(new.time_limit),
            memory_limit: Set(new.memory_limit),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(model)
    }

    /// Append a testcase at the end of the assignment's list.
    ///
    /// Refused once any submission references the assignment, since that
    /// submission's result set is already fixed.
    pub async fn add_testcase(
        &self,
        id: i64,
        assignment_id: i64,
        input_path: String,
        output_path: String,
    ) -> Result<testcase::Model, StoreError> {
        let txn = self.db.begin().await?;

        // Serializes with create_submission, which takes the same row lock.
        assignment::Entity::find_by_id(assignment_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(StoreError::AssignmentNotFound(assignment_id))?;

        let submissions = submission::Entity::find()
            .filter(submission::Column::AssignmentId.eq(assignment_id))
            .count(&txn)
            .await?;
        if submissions > 0 {
            return Err(StoreError::AssignmentLocked(assignment_id));
        }

        let last_position: Option<i32> = testcase::Entity::find()
            .select_only()
            .column(testcase::Column::Position)
            .filter(testcase::Column::AssignmentId.eq(assignment_id))
            .order_by_desc(testcase::Column::Position)
            .into_tuple()
            .one(&txn)
            .await?;

        let model = testcase::ActiveModel {
            id: Set(id),
            assignment_id: Set(assignment_id),
            input_path: Set(input_path),
            output_path: Set(output_path),
            position: Set(last_position.map_or(0, |p| p + 1)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(model)
    }

    /// Load an assignment and its testcases in position order.
    pub async fn load_assignment(
        &self,
        assignment_id: i64,
    ) -> Result<AssignmentWithTestcases, StoreError> {
        let assignment = assignment::Entity::find_by_id(assignment_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::AssignmentNotFound(assignment_id))?;

        let testcases = testcase::Entity::find()
            .filter(testcase::Column::AssignmentId.eq(assignment_id))
            .order_by_asc(testcase::Column::Position)
            .all(&self.db)
            .await?;

        Ok(AssignmentWithTestcases {
            assignment,
            testcases,
        })
    }

    /// Record a submission and one `GRADING` result per testcase, atomically.
    ///
    /// The testcase list is read under a lock on the assignment row, and the
    /// snapshot returned is exactly the set the result rows were created for.
    pub async fn create_submission(
        &self,
        new: NewSubmission,
    ) -> Result<(submission::Model, AssignmentWithTestcases), StoreError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let assignment = assignment::Entity::find_by_id(new.assignment_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(StoreError::AssignmentNotFound(new.assignment_id))?;

        let testcases = testcase::Entity::find()
            .filter(testcase::Column::AssignmentId.eq(assignment.id))
            .order_by_asc(testcase::Column::Position)
            .all(&txn)
            .await?;
        if testcases.is_empty() {
            return Err(StoreError::NoTestcases(assignment.id));
        }

        let model = submission::ActiveModel {
            id: Set(new.id),
            assignment_id: Set(new.assignment_id),
            user_id: Set(new.user_id),
            language: Set(new.language),
            source_path: Set(new.source_path),
            compilation_log: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for testcase in &testcases {
            let row = submission_result::ActiveModel {
                submission_id: Set(model.id),
                testcase_id: Set(testcase.id),
                status: Set(ResultStatus::Grading),
                status_detail: Set(None),
                memory_usage: Set(None),
                time_usage: Set(None),
                updated_at: Set(now),
                ..Default::default()
            };
            submission_result::Entity::insert(row)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        info!(
            submission_id = model.id,
            assignment_id = model.assignment_id,
            testcases = testcases.len(),
            "Recorded submission"
        );

        Ok((
            model,
            AssignmentWithTestcases {
                assignment,
                testcases,
            },
        ))
    }

    /// Commit a graded batch in one transaction.
    ///
    /// Updates the submission's compilation log and upserts every result row
    /// keyed by `(submission_id, testcase_id)`. Either everything is written or
    /// nothing is. An empty batch is an error, as is a testcase the submission
    /// was not created with or a `GRADING` status, since results never move
    /// back to `GRADING`. A redelivered batch overwrites earlier terminal
    /// statuses: the last committed response wins.
    pub async fn commit_results(
        &self,
        submission_id: i64,
        compilation_log: Option<String>,
        results: &[ResultUpdate],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let updated = submission::Entity::update_many()
            .col_expr(submission::Column::CompilationLog, Expr::value(compilation_log))
            .filter(submission::Column::Id.eq(submission_id))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(StoreError::SubmissionNotFound(submission_id));
        }

        if results.is_empty() {
            return Err(StoreError::EmptyResultBatch(submission_id));
        }

        let graded: HashSet<i64> = submission_result::Entity::find()
            .select_only()
            .column(submission_result::Column::TestcaseId)
            .filter(submission_result::Column::SubmissionId.eq(submission_id))
            .into_tuple::<i64>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();

        let now = Utc::now();
        for result in results {
            if !graded.contains(&result.testcase_id) {
                return Err(StoreError::UnknownTestcase {
                    submission_id,
                    testcase_id: result.testcase_id,
                });
            }
            if !result.status.is_terminal() {
                return Err(StoreError::NonTerminalResult {
                    submission_id,
                    testcase_id: result.testcase_id,
                });
            }

            let row = submission_result::ActiveModel {
                submission_id: Set(submission_id),
                testcase_id: Set(result.testcase_id),
                status: Set(result.status),
                status_detail: Set(result.status_detail.clone()),
                memory_usage: Set(result.memory_usage),
                time_usage: Set(result.time_usage),
                updated_at: Set(now),
                ..Default::default()
            };

            submission_result::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        submission_result::Column::SubmissionId,
                        submission_result::Column::TestcaseId,
                    ])
                    .update_columns([
                        submission_result::Column::Status,
                        submission_result::Column::StatusDetail,
                        submission_result::Column::MemoryUsage,
                        submission_result::Column::TimeUsage,
                        submission_result::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        debug!(submission_id, rows = results.len(), "Committed results");
        Ok(())
    }

    /// Load a submission with its results ordered by testcase position.
    pub async fn load_submission(&self, submission_id: i64) -> Result<SubmissionView, StoreError> {
        let submission = submission::Entity::find_by_id(submission_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::SubmissionNotFound(submission_id))?;

        let rows = submission_result::Entity::find()
            .filter(submission_result::Column::SubmissionId.eq(submission_id))
            .all(&self.db)
            .await?;

        let positions: Vec<(i64, i32)> = testcase::Entity::find()
            .select_only()
            .column(testcase::Column::Id)
            .column(testcase::Column::Position)
            .filter(testcase::Column::AssignmentId.eq(submission.assignment_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut rows = rows;
        rows.sort_by_key(|row| {
            positions
                .iter()
                .find(|(id, _)| *id == row.testcase_id)
                .map_or(i32::MAX, |(_, position)| *position)
        });

        Ok(SubmissionView::new(submission, rows))
    }
}
