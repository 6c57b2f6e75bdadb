use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::{Completer, CompletionError, CompletionRequest};
use crate::config::ModelsConfig;
use crate::github::client::InvalidPullRequestUrl;
use crate::github::diff::render_file;
use crate::github::{parse_pull_request_url, GitHubClient, GitHubError, PullFile, PullRequestDetails};
use crate::models::ReviewRequest;
use crate::session::Session;

pub const SYSTEM_PROMPT: &str = "You are an experienced code reviewer. Review the pull request \
below and respond in Markdown. Focus on code quality: correctness, readability, maintainability, \
security and performance. Give specific, actionable feedback that references the files involved, \
and suggest concrete changes where they help.";

/// Errors from producing a review
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    InvalidUrl(#[from] InvalidPullRequestUrl),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Produces review text for a pull request on behalf of a session
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        session: Option<&Session>,
        request: &ReviewRequest,
    ) -> Result<String, ReviewError>;
}

/// Reviews pull requests by fetching their diff from GitHub and asking the
/// completion API, with a single fallback to a smaller model when the
/// primary one is rate limited.
pub struct ReviewService {
    github: GitHubClient,
    completer: Arc<dyn Completer>,
    models: ModelsConfig,
    max_patch_lines: usize,
}

impl ReviewService {
    pub fn new(
        github: GitHubClient,
        completer: Arc<dyn Completer>,
        models: ModelsConfig,
        max_patch_lines: usize,
    ) -> Self {
        Self {
            github,
            completer,
            models,
            max_patch_lines,
        }
    }

    async fn complete_with_fallback(&self, prompt: String) -> Result<String, ReviewError> {
        let mut request = CompletionRequest {
            model: self.models.primary.clone(),
            max_tokens: self.models.max_tokens,
            temperature: self.models.temperature,
            system: SYSTEM_PROMPT.to_string(),
            user: prompt,
        };

        match self.completer.complete(&request).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_rate_limited() => {
                warn!(
                    primary = %self.models.primary,
                    fallback = %self.models.fallback,
                    error = %e,
                    "Primary model rate limited, retrying with fallback"
                );
                request.model = self.models.fallback.clone();
                Ok(self.completer.complete(&request).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Reviewer for ReviewService {
    #[instrument(skip(self, session, request), fields(url = %request.url))]
    async fn review(
        &self,
        session: Option<&Session>,
        request: &ReviewRequest,
    ) -> Result<String, ReviewError> {
        let session = session.ok_or(ReviewError::Unauthorized)?;
        let pr = parse_pull_request_url(&request.url)?;

        info!(pr = %pr, "Reviewing pull request");

        let token = session.access_token();
        let (details, files) = tokio::try_join!(
            self.github.get_pull(token, &pr),
            self.github.list_pull_files(token, &pr),
        )?;

        let prompt = build_prompt(
            &details,
            request.title.as_deref(),
            &files,
            self.max_patch_lines,
        );

        let review = self.complete_with_fallback(prompt).await?;

        info!(pr = %pr, bytes = review.len(), "Review generated");

        Ok(review)
    }
}

/// Combine title, description and per-file truncated diffs into one prompt
pub fn build_prompt(
    details: &PullRequestDetails,
    title_hint: Option<&str>,
    files: &[PullFile],
    max_patch_lines: usize,
) -> String {
    let title = if details.title.trim().is_empty() {
        title_hint.unwrap_or("(untitled)")
    } else {
        details.title.as_str()
    };

    let description = details
        .body
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or("(no description)");

    let mut prompt = format!(
        "Pull request: {}\nURL: {}\n\nDescription:\n{}\n\nChanged files ({}):\n\n",
        title,
        details.html_url,
        description,
        details.changed_files.unwrap_or(files.len() as u64)
    );

    for file in files {
        prompt.push_str(&render_file(file, max_patch_lines));
        prompt.push('\n');
    }

    let listed = files.len() as u64;
    if let Some(total) = details.changed_files.filter(|total| *total > listed) {
        prompt.push_str(&format!("... {} more files not shown\n", total - listed));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::OpenAiAdapter;
    use crate::github::diff::truncation_marker;
    use crate::models::Identity;
    use std::time::Duration;
    use wiremock::matchers::{any, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PR_URL: &str = "https://github.com/octocat/hello-world/pull/5";

    fn session() -> Session {
        Session::new(
            Identity {
                login: "octocat".to_string(),
                name: None,
                email: Some("octocat@example.com".to_string()),
            },
            "gh-token",
            chrono::Duration::hours(1),
        )
    }

    fn service(github: &MockServer, openai: &MockServer) -> ReviewService {
        let completer = OpenAiAdapter::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_api_url(&openai.uri());

        ReviewService::new(
            GitHubClient::new(github.uri(), Duration::from_secs(5)).unwrap(),
            Arc::new(completer),
            ModelsConfig::default(),
            100,
        )
    }

    fn request(url: &str) -> ReviewRequest {
        ReviewRequest {
            url: url.to_string(),
            title: Some("Add caching".to_string()),
        }
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }))
    }

    async fn mount_pull(github: &MockServer, patch: &str) {
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello-world/pulls/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Add caching",
                "body": "Caches the expensive lookups.",
                "html_url": PR_URL
            })))
            .mount(github)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello-world/pulls/5/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "filename": "src/cache.rs",
                "status": "modified",
                "additions": 250,
                "deletions": 0,
                "patch": patch
            }])))
            .mount(github)
            .await;
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_upstream_calls() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&github).await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&openai).await;

        let err = service(&github, &openai)
            .review(None, &request(PR_URL))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Unauthorized));
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[tokio::test]
    async fn test_url_without_number_makes_no_upstream_calls() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&github).await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&openai).await;

        let err = service(&github, &openai)
            .review(Some(&session()), &request("https://github.com/octocat/hello-world/pull"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_successful_review() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_pull(&github, "@@ -1 +1 @@\n-old\n+new").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o", "max_tokens": 2000})))
            .respond_with(completion("## Review\nNice work."))
            .expect(1)
            .mount(&openai)
            .await;

        let review = service(&github, &openai)
            .review(Some(&session()), &request(PR_URL))
            .await
            .unwrap();
        assert_eq!(review, "## Review\nNice work.");
    }

    #[tokio::test]
    async fn test_rate_limited_primary_falls_back_once() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_pull(&github, "+line").await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
            })))
            .expect(1)
            .mount(&openai)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(completion("fallback review"))
            .expect(1)
            .mount(&openai)
            .await;

        let review = service(&github, &openai)
            .review(Some(&session()), &request(PR_URL))
            .await
            .unwrap();
        assert_eq!(review, "fallback review");
        assert_eq!(openai.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_completion_error_is_not_retried() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_pull(&github, "+line").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "context too long", "type": "invalid_request_error", "code": null}
            })))
            .expect(1)
            .mount(&openai)
            .await;

        let err = service(&github, &openai)
            .review(Some(&session()), &request(PR_URL))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Completion(CompletionError::Api { .. })));
        assert_eq!(openai.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_github_error_is_propagated_with_status_and_body() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible by integration"))
            .mount(&github)
            .await;
        Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&openai).await;

        let err = service(&github, &openai)
            .review(Some(&session()), &request(PR_URL))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("403"));
        assert!(message.contains("Resource not accessible by integration"));
    }

    #[tokio::test]
    async fn test_long_patch_is_truncated_in_prompt() {
        let github = MockServer::start().await;
        let openai = MockServer::start().await;
        let patch = (1..=250)
            .map(|i| format!("+line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        mount_pull(&github, &patch).await;
        Mock::given(method("POST"))
            .respond_with(completion("ok"))
            .expect(1)
            .mount(&openai)
            .await;

        service(&github, &openai)
            .review(Some(&session()), &request(PR_URL))
            .await
            .unwrap();

        let requests = openai.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let prompt = body["messages"][1]["content"].as_str().unwrap();

        let kept: Vec<String> = (1..=100).map(|i| format!("+line {}", i)).collect();
        let expected = format!("{}\n{}", kept.join("\n"), truncation_marker(150));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains("+line 101"));
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
    }

    #[test]
    fn test_build_prompt_uses_hint_for_untitled() {
        let details = PullRequestDetails {
            title: String::new(),
            body: None,
            html_url: PR_URL.to_string(),
            changed_files: None,
        };

        let prompt = build_prompt(&details, Some("Hinted title"), &[], 100);
        assert!(prompt.starts_with("Pull request: Hinted title"));
        assert!(prompt.contains("(no description)"));
        assert!(prompt.contains("Changed files (0)"));
    }

    #[test]
    fn test_build_prompt_notes_files_not_listed() {
        let details = PullRequestDetails {
            title: "Large refactor".to_string(),
            body: None,
            html_url: PR_URL.to_string(),
            changed_files: Some(3),
        };
        let files = vec![PullFile {
            filename: "src/lib.rs".to_string(),
            status: "modified".to_string(),
            additions: 1,
            deletions: 1,
            patch: Some("-a\n+b".to_string()),
        }];

        let prompt = build_prompt(&details, None, &files, 100);
        assert!(prompt.contains("Changed files (3)"));
        assert!(prompt.contains("... 2 more files not shown"));
    }
}
