use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::github::{GitHubError, OAuthError};
use crate::orchestrator::OrchestratorError;
use crate::review::ReviewError;

/// Error returned by HTTP handlers, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Conflict(String),

    /// A GitHub, OAuth or completion call failed
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::Unauthorized => ApiError::Unauthorized,
            ReviewError::InvalidUrl(e) => ApiError::BadRequest(e.to_string()),
            ReviewError::GitHub(e) => ApiError::Upstream(e.to_string()),
            ReviewError::Completion(e) => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::AlreadyInFlight(_) | OrchestratorError::AlreadyReviewed(_) => {
                ApiError::Conflict(e.to_string())
            }
            OrchestratorError::TimedOut { .. } => ApiError::Timeout(e.to_string()),
        }
    }
}

impl From<GitHubError> for ApiError {
    fn from(e: GitHubError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::Rejected(_) => {
                warn!(error = %e, "Sign-in rejected");
                ApiError::BadRequest(e.to_string())
            }
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CompletionError;
    use crate::github::client::InvalidPullRequestUrl;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::from(ReviewError::Unauthorized).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(ReviewError::InvalidUrl(InvalidPullRequestUrl {
                url: "https://github.com/o".to_string(),
                reason: "missing repository",
            }))
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ReviewError::Completion(CompletionError::Empty)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(OrchestratorError::AlreadyInFlight("1".to_string())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(OrchestratorError::TimedOut {
                pr_id: "1".to_string(),
                secs: 180
            })
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(OAuthError::Rejected("bad_verification_code".to_string()))
                .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_upstream_message_is_kept() {
        let err = ApiError::from(GitHubError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
            body: "Resource not accessible".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("Resource not accessible"));
    }
}
