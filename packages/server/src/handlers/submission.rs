use std::io::Cursor;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::storage::BoxReader;
use tracing::instrument;

use crate::error::AppError;
use crate::extractors::auth::AuthUser;
use crate::models::{CreateSubmissionRequest, SubmissionView};
use crate::state::AppState;

/// Submit code to an assignment.
///
/// Responds 201 with the recorded submission, or 503 `NOT_SCHEDULED` when it
/// was recorded but the grading request could not be published.
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_submission(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(assignment_id): Path<i64>,
    payload: Result<Json<CreateSubmissionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionView>), AppError> {
    let Json(payload) = payload?;
    payload.validate().map_err(AppError::Validation)?;

    let source: BoxReader = Box::new(Cursor::new(payload.source.into_bytes()));
    let submission = state
        .submissions
        .submit(
            auth_user.user_id,
            assignment_id,
            payload.language.trim(),
            source,
        )
        .await?;

    let view = state.store.load_submission(submission.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Get one submission with its per-testcase results.
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_submission(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionView>, AppError> {
    let view = state.store.load_submission(id).await?;
    auth_user.require_owner(view.user_id)?;
    Ok(Json(view))
}
