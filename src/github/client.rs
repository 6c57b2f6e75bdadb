use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::models::{Identity, PullRequestLocator, PullRequestSummary};

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const OPEN_PULLS_QUERY: &str = "is:pr is:open author:@me";

const PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files of a pull request
const MAX_FILE_PAGES: usize = 30;
/// The search API serves at most 1000 results
const MAX_SEARCH_PAGES: usize = 10;

/// Errors returned by the GitHub REST API client
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Non-success response, carrying the status and the raw body
    #[error("GitHub API error ({status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid GitHub API URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// A pull request URL that does not name owner, repository and number
#[derive(Debug, Error)]
#[error("Invalid pull request URL '{url}': {reason}")]
pub struct InvalidPullRequestUrl {
    pub url: String,
    pub reason: &'static str,
}

/// GitHub API client acting on behalf of a signed-in user
///
/// The client holds no credential of its own; every call takes the
/// session's bearer token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: usize,
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: u64,
    number: u64,
    title: String,
    html_url: String,
    repository_url: String,
}

/// Pull request metadata used to build a review prompt
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestDetails {
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
    /// Total number of changed files, which may exceed what can be listed
    #[serde(default)]
    pub changed_files: Option<u64>,
}

/// A file changed in a pull request
#[derive(Debug, Clone, Deserialize)]
pub struct PullFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Absent for binary files and very large diffs
    pub patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GitHubError> {
        let client = Client::builder()
            .user_agent(concat!("pr-review-hub/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, url: impl reqwest::IntoUrl, token: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", ACCEPT_V3)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHubError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Search for open pull requests authored by the token's owner
    #[instrument(skip_all)]
    pub async fn search_open_pulls(&self, token: &str) -> Result<Vec<PullRequestSummary>, GitHubError> {
        let mut items = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let url = Url::parse_with_params(
                &format!("{}/search/issues", self.api_url),
                &[
                    ("q", OPEN_PULLS_QUERY.to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;

            let response: SearchResponse = self.send_json(self.get(url, token)).await?;
            let last = response.items.len() < PER_PAGE;
            items.extend(response.items);

            if last || items.len() >= response.total_count {
                break;
            }
        }

        let pulls: Vec<PullRequestSummary> = items
            .into_iter()
            .map(|item| PullRequestSummary {
                id: item.id.to_string(),
                number: item.number,
                repository: repository_name(&item.repository_url),
                title: item.title,
                url: item.html_url,
            })
            .collect();

        info!(count = pulls.len(), "Fetched open pull requests");

        Ok(pulls)
    }

    /// Get a pull request's metadata
    #[instrument(skip(self, token), fields(pr = %pr))]
    pub async fn get_pull(
        &self,
        token: &str,
        pr: &PullRequestLocator,
    ) -> Result<PullRequestDetails, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, pr.owner, pr.repo, pr.number
        );

        self.send_json(self.get(url, token)).await
    }

    /// List files changed in a pull request
    #[instrument(skip(self, token), fields(pr = %pr))]
    pub async fn list_pull_files(
        &self,
        token: &str,
        pr: &PullRequestLocator,
    ) -> Result<Vec<PullFile>, GitHubError> {
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = Url::parse_with_params(
                &format!(
                    "{}/repos/{}/{}/pulls/{}/files",
                    self.api_url, pr.owner, pr.repo, pr.number
                ),
                &[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;

            let batch: Vec<PullFile> = self.send_json(self.get(url, token)).await?;
            let last = batch.len() < PER_PAGE;
            files.extend(batch);

            if last {
                break;
            }
        }

        debug!(count = files.len(), "Fetched pull request files");

        Ok(files)
    }

    /// Resolve the identity behind a token, falling back to the primary
    /// verified address when the profile email is private
    pub async fn current_identity(&self, token: &str) -> Result<Identity, GitHubError> {
        let user: UserResponse = self
            .send_json(self.get(format!("{}/user", self.api_url), token))
            .await?;

        let email = match user.email {
            Some(email) => Some(email),
            None => {
                let emails: Vec<EmailResponse> = self
                    .send_json(self.get(format!("{}/user/emails", self.api_url), token))
                    .await?;
                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
            }
        };

        Ok(Identity {
            login: user.login,
            name: user.name,
            email,
        })
    }
}

/// Last path segment of a `repository_url`
fn repository_name(repository_url: &str) -> String {
    repository_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parse a pull request URL into owner, repository and number.
///
/// Accepts `https://github.com/{owner}/{repo}/pull/{number}` and the API
/// form `.../repos/{owner}/{repo}/pulls/{number}`.
pub fn parse_pull_request_url(raw: &str) -> Result<PullRequestLocator, InvalidPullRequestUrl> {
    let invalid = |reason| InvalidPullRequestUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|_| invalid("not an absolute URL"))?;
    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if segments.first() == Some(&"repos") {
        segments.remove(0);
    }

    let owner = segments.first().ok_or_else(|| invalid("missing owner"))?;
    let repo = segments.get(1).ok_or_else(|| invalid("missing repository"))?;

    match segments.get(2) {
        Some(&"pull") | Some(&"pulls") => {}
        _ => return Err(invalid("not a pull request URL")),
    }

    let number = segments
        .get(3)
        .ok_or_else(|| invalid("missing pull request number"))?
        .parse::<u64>()
        .map_err(|_| invalid("pull request number is not numeric"))?;

    Ok(PullRequestLocator {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}
