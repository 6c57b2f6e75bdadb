use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An open pull request authored by the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    /// Opaque identifier assigned by GitHub
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    /// Name of the repository the pull request belongs to
    pub repository: String,
}

/// Owner, repository and number of a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestLocator {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl std::fmt::Display for PullRequestLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Identity of a signed-in GitHub user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// Stable key that owns persisted review records: the email when known,
    /// otherwise the login.
    pub fn owner(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.login)
    }
}

/// A persisted AI review of a pull request, as stored in `pr_reviews`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub pr_id: String,
    pub pr_title: String,
    pub pr_url: String,
    pub review_content: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

/// A review record that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReviewRecord {
    pub pr_id: String,
    pub pr_title: String,
    pub pr_url: String,
    pub review_content: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

impl NewReviewRecord {
    pub fn new(
        owner: &str,
        pr_id: impl Into<String>,
        pr_title: impl Into<String>,
        pr_url: impl Into<String>,
        review_content: impl Into<String>,
    ) -> Self {
        Self {
            pr_id: pr_id.into(),
            pr_title: pr_title.into(),
            pr_url: pr_url.into(),
            review_content: review_content.into(),
            user_email: owner.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn into_record(self, id: Uuid) -> ReviewRecord {
        ReviewRecord {
            id,
            pr_id: self.pr_id,
            pr_title: self.pr_title,
            pr_url: self.pr_url,
            review_content: self.review_content,
            user_email: self.user_email,
            created_at: self.created_at,
        }
    }
}

/// Body of `POST /api/review`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of `POST /api/save-review`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReviewRequest {
    pub pr_id: String,
    pub pr_title: String,
    pub pr_url: String,
    pub review_content: String,
}

/// Body of `POST /api/pulls/review`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReviewRequest {
    pub pr_id: String,
    pub title: String,
    pub url: String,
}
