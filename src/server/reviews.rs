use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::auth::{AuthSession, MaybeSession};
use super::AppState;
use crate::error::ApiError;
use crate::models::{NewReviewRecord, ReviewRecord, ReviewRequest, SaveReviewRequest};
use crate::store::Outcome;

/// `POST /api/review`: generate a review for a pull request URL.
///
/// The session check happens before anything else, including body parsing,
/// so an unauthenticated call never reaches GitHub or the model.
pub async fn review(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(_) if session.is_none() => return Err(ApiError::Unauthorized),
        Err(rejection) => return Err(rejection.into()),
    };

    let result = state.reviewer.review(session.as_ref(), &request).await?;

    Ok(Json(json!({ "result": result })))
}

pub async fn save_review(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    payload: Result<Json<SaveReviewRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;

    let record = NewReviewRecord::new(
        session.owner(),
        request.pr_id,
        request.pr_title,
        request.pr_url,
        request.review_content,
    );

    state
        .gateway
        .create(record)
        .await
        .into_result()
        .map_err(ApiError::Internal)?;

    Ok(Json(json!({ "success": true })))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Outcome<Vec<ReviewRecord>> {
    state.gateway.list(session.owner()).await
}

pub async fn find_review(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    pr_id: Result<Path<String>, PathRejection>,
) -> Result<Outcome<Option<ReviewRecord>>, ApiError> {
    let Path(pr_id) = pr_id?;
    Ok(state.gateway.find_by_pr_id(&pr_id, session.owner()).await)
}

pub async fn delete_review(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Outcome<bool>, ApiError> {
    let Path(id) = id?;

    let outcome = state.gateway.delete_one(id, session.owner()).await;
    if outcome.data == Some(true) {
        session.board().deselect_record(id);
    }

    Ok(outcome)
}
