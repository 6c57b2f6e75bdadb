use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::auth::AuthSession;
use super::AppState;
use crate::error::ApiError;
use crate::models::StartReviewRequest;
use crate::orchestrator::{BoardSnapshot, ReviewState};

/// Open pull requests authored by the caller. No retry on upstream failure.
pub async fn list_pulls(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Result<Json<Value>, ApiError> {
    let pulls = state
        .github
        .search_open_pulls(session.access_token())
        .await?;

    Ok(Json(json!({ "pullRequests": pulls })))
}

pub async fn request_review(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<StartReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewState>, ApiError> {
    let Json(request) = payload?;
    let review_state = state
        .orchestrator
        .request_review(&session, &request)
        .await?;

    Ok(Json(review_state))
}

pub async fn review_state(AuthSession(session): AuthSession) -> Json<BoardSnapshot> {
    Json(session.board().snapshot())
}

pub async fn cancel_review(
    AuthSession(session): AuthSession,
    pr_id: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(pr_id) = pr_id?;

    if session.board().cancel(&pr_id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!(
            "No review in progress for pull request {}",
            pr_id
        )))
    }
}

pub async fn reset_review(
    AuthSession(session): AuthSession,
    pr_id: Result<Path<String>, PathRejection>,
) -> Result<Json<ReviewState>, ApiError> {
    let Path(pr_id) = pr_id?;
    session.board().reset(&pr_id)?;

    Ok(Json(session.board().state(&pr_id)))
}
