use std::convert::Infallible;

use axum::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::AppState;
use crate::error::ApiError;
use crate::session::{clear_session_cookie, session_cookie, Session, SESSION_COOKIE};

/// The caller's session, if the request carries a valid session cookie
pub struct MaybeSession(pub Option<Session>);

/// The caller's session; rejects with 401 when absent
pub struct AuthSession(pub Session);

/// Raw value of the session cookie
fn session_cookie_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = session_cookie_value(&parts.headers).and_then(|c| state.sessions.resolve(c));
        Ok(MaybeSession(session))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeSession(session) = MaybeSession::from_request_parts(parts, state)
            .await
            .unwrap_or(MaybeSession(None));
        session.map(AuthSession).ok_or(ApiError::Unauthorized)
    }
}

pub async fn signin(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let oauth_state = state.sessions.issue_state();
    let url = state.oauth.authorize_url(&oauth_state)?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = params.error {
        warn!(error = %error, "Sign-in denied by identity provider");
        return Err(ApiError::BadRequest(format!("Sign-in failed: {}", error)));
    }

    let oauth_state = params.state.unwrap_or_default();
    if !state.sessions.take_state(&oauth_state) {
        return Err(ApiError::BadRequest(
            "Invalid or expired sign-in state".to_string(),
        ));
    }

    let code = params
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let token = state.oauth.exchange_code(&code).await?;
    let identity = state.github.current_identity(&token).await?;

    info!(login = %identity.login, "User signed in");

    let (_, cookie) = state.sessions.create(identity, token);
    let set_cookie = session_cookie(&cookie, state.sessions.ttl(), state.secure_cookies);

    Ok(([(SET_COOKIE, set_cookie)], Redirect::to("/")))
}

pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(cookie) = session_cookie_value(&headers) {
        if state.sessions.remove(cookie) {
            info!("User signed out");
        }
    }

    (
        [(SET_COOKIE, clear_session_cookie(state.secure_cookies))],
        StatusCode::NO_CONTENT,
    )
}

pub async fn current_session(AuthSession(session): AuthSession) -> Json<serde_json::Value> {
    Json(json!({
        "user": session.identity,
        "expiresAt": session.expires_at,
    }))
}
