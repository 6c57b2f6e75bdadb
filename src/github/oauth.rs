use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

/// Errors from the GitHub OAuth web flow
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth token endpoint error ({status}): {body}")]
    Status { status: StatusCode, body: String },

    /// GitHub answers 200 with an `error` field for rejected codes
    #[error("OAuth code exchange rejected: {0}")]
    Rejected(String),

    #[error("OAuth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid OAuth URL: {0}")]
    Url(#[from] url::ParseError),
}

/// GitHub OAuth app client for the web application flow
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    oauth_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(
        oauth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OAuthError> {
        let client = Client::builder()
            .user_agent(concat!("pr-review-hub/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            oauth_url: oauth_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
        })
    }

    /// URL the browser is redirected to for sign-in
    pub fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        let url = Url::parse_with_params(
            &format!("{}/login/oauth/authorize", self.oauth_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", self.scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url)
    }

    /// Exchange an authorization code for a bearer token
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .client
            .post(format!("{}/login/oauth/access_token", self.oauth_url))
            .header("Accept", "application/json")
            .json(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                code,
                redirect_uri: &self.redirect_uri,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Status { status, body });
        }

        let token: TokenResponse = response.json().await?;

        if let Some(error) = token.error {
            warn!(error = %error, "OAuth code exchange rejected");
            return Err(OAuthError::Rejected(
                token.error_description.unwrap_or(error),
            ));
        }

        let access_token = token
            .access_token
            .ok_or_else(|| OAuthError::Rejected("response carried no access token".to_string()))?;

        info!(scope = token.scope.as_deref().unwrap_or(""), "OAuth code exchanged");

        Ok(access_token)
    }
}
