pub mod client;
pub mod diff;
pub mod oauth;

pub use client::{parse_pull_request_url, GitHubClient, GitHubError, PullFile, PullRequestDetails};
pub use oauth::{OAuthClient, OAuthError};
