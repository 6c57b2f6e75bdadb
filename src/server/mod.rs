//! HTTP surface.
//!
//! Every `/api` route receives the caller's [`Session`](crate::session::Session)
//! through an extractor; handlers never look a session up on their own.

pub mod auth;
mod pulls;
mod reviews;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ApiError;
use crate::github::{GitHubClient, OAuthClient};
use crate::orchestrator::ReviewOrchestrator;
use crate::review::Reviewer;
use crate::session::SessionStore;
use crate::store::{Outcome, ReviewGateway};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub oauth: OAuthClient,
    pub github: GitHubClient,
    pub reviewer: Arc<dyn Reviewer>,
    pub orchestrator: Arc<ReviewOrchestrator>,
    pub gateway: ReviewGateway,
    pub secure_cookies: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signin", get(auth::signin))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/signout", post(auth::signout))
        .route("/api/session", get(auth::current_session))
        .route("/api/pulls", get(pulls::list_pulls))
        .route("/api/pulls/review", post(pulls::request_review))
        .route("/api/pulls/review-state", get(pulls::review_state))
        .route("/api/pulls/review/:pr_id", delete(pulls::cancel_review))
        .route("/api/pulls/review/:pr_id/reset", post(pulls::reset_review))
        .route(
            "/api/review",
            post(reviews::review).fallback(method_not_allowed),
        )
        .route("/api/save-review", post(reviews::save_review))
        .route("/api/reviews", get(reviews::list_reviews))
        .route("/api/reviews/by-pr/:pr_id", get(reviews::find_review))
        .route("/api/reviews/:id", delete(reviews::delete_review))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

impl<T: Serialize> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}
