use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::github::diff::DEFAULT_MAX_PATCH_LINES;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub models: ModelsConfig,
    pub review: ReviewConfig,
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Externally visible base URL, used to build the OAuth redirect URI
    pub public_url: String,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
    pub session_ttl_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            public_url: "http://localhost:3000".to_string(),
            secure_cookies: false,
            session_ttl_hours: 24,
        }
    }
}

/// GitHub API and OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub oauth_url: String,
    pub scope: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            oauth_url: "https://github.com".to_string(),
            scope: "repo".to_string(),
        }
    }
}

/// Completion model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub api_url: String,
    pub primary: String,
    /// Used once when the primary model is rate limited
    pub fallback: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            primary: "gpt-4o".to_string(),
            fallback: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.2,
        }
    }
}

/// Review request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_patch_lines: usize,
    /// Timeout applied to every outbound HTTP call
    pub upstream_timeout_secs: u64,
    /// Deadline for a whole orchestrated review
    pub deadline_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_patch_lines: DEFAULT_MAX_PATCH_LINES,
            upstream_timeout_secs: 60,
            deadline_secs: 180,
        }
    }
}

impl ReviewConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Where review records are persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// JSON file inside a local directory, for development
    Json { path: PathBuf },
    /// PostgreSQL reached through `DATABASE_URL`
    Postgres,
    /// Hosted table exposed through a PostgREST-compatible API
    Rest { url: String, table: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Json {
            path: PathBuf::from(".pr-review/reviews"),
        }
    }
}

/// Secrets read from the environment, never from the config file
#[derive(Clone)]
pub struct Secrets {
    pub github_client_id: String,
    pub github_client_secret: String,
    pub session_secret: String,
    pub openai_api_key: String,
    pub database_url: Option<String>,
    pub supabase_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("github_client_id", &self.github_client_id)
            .finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            github_client_id: required_env("GITHUB_CLIENT_ID")?,
            github_client_secret: required_env("GITHUB_CLIENT_SECRET")?,
            session_secret: required_env("SESSION_SECRET")?,
            openai_api_key: required_env("OPENAI_API_KEY")?,
            database_url: std::env::var("DATABASE_URL").ok(),
            supabase_key: std::env::var("SUPABASE_SERVICE_KEY").ok(),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} not set", name))
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// OAuth callback URL registered with the GitHub OAuth app
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/auth/callback",
            self.server.public_url.trim_end_matches('/')
        )
    }
}
