use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pr_review_hub::adapters::OpenAiAdapter;
use pr_review_hub::config::{Config, Secrets, StorageConfig};
use pr_review_hub::github::{GitHubClient, OAuthClient};
use pr_review_hub::orchestrator::ReviewOrchestrator;
use pr_review_hub::review::{ReviewService, Reviewer};
use pr_review_hub::server::{router, AppState};
use pr_review_hub::session::SessionStore;
use pr_review_hub::store::{JsonStore, PostgresStore, RestStore, ReviewGateway, ReviewStore};

#[derive(Parser)]
#[command(name = "pr-review-hub")]
#[command(about = "Request and keep AI code reviews of your open GitHub pull requests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, default_value = ".pr-review/config.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web service
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long, env = "PR_REVIEW_BIND")]
        bind: Option<SocketAddr>,
    },

    /// Apply database migrations (postgres backend)
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("pr_review_hub=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Migrate => migrate().await,
    }
}

async fn serve(config: Config, bind: Option<SocketAddr>) -> Result<()> {
    let secrets = Secrets::from_env()?;
    let timeout = config.review.upstream_timeout();

    let store = open_store(&config.storage, &secrets, timeout).await?;
    let gateway = ReviewGateway::new(store);

    let github = GitHubClient::new(&config.github.api_url, timeout)
        .context("Failed to build GitHub client")?;
    let oauth = OAuthClient::new(
        &config.github.oauth_url,
        &secrets.github_client_id,
        &secrets.github_client_secret,
        config.redirect_uri(),
        &config.github.scope,
        timeout,
    )
    .context("Failed to build OAuth client")?;

    let completer = OpenAiAdapter::new(secrets.openai_api_key.clone(), timeout)
        .context("Failed to build completion client")?
        .with_api_url(&config.models.api_url);

    let reviewer: Arc<dyn Reviewer> = Arc::new(ReviewService::new(
        github.clone(),
        Arc::new(completer),
        config.models.clone(),
        config.review.max_patch_lines,
    ));

    let ttl = chrono::Duration::hours(i64::try_from(config.server.session_ttl_hours)?);
    let sessions = SessionStore::new(&secrets.session_secret, ttl)
        .map_err(|e| anyhow::anyhow!("Invalid SESSION_SECRET: {}", e))?;

    let state = AppState {
        sessions: Arc::new(sessions),
        oauth,
        github,
        reviewer: reviewer.clone(),
        orchestrator: Arc::new(ReviewOrchestrator::new(
            reviewer,
            gateway.clone(),
            config.review.deadline(),
        )),
        gateway,
        secure_cookies: config.server.secure_cookies,
    };

    let addr = bind.unwrap_or(config.server.bind);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        addr = %addr,
        primary = %config.models.primary,
        fallback = %config.models.fallback,
        "Listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");

    Ok(())
}

async fn open_store(
    storage: &StorageConfig,
    secrets: &Secrets,
    timeout: std::time::Duration,
) -> Result<Arc<dyn ReviewStore>> {
    let store: Arc<dyn ReviewStore> = match storage {
        StorageConfig::Json { path } => Arc::new(JsonStore::new(path)?),
        StorageConfig::Postgres => {
            let url = secrets
                .database_url
                .as_deref()
                .context("DATABASE_URL not set")?;
            Arc::new(PostgresStore::new(url).await?)
        }
        StorageConfig::Rest { url, table } => {
            let key = secrets
                .supabase_key
                .as_deref()
                .context("SUPABASE_SERVICE_KEY not set")?;
            Arc::new(RestStore::new(url, table, key, timeout)?)
        }
    };

    Ok(store)
}

async fn migrate() -> Result<()> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let store = PostgresStore::new(&url).await?;
    store.migrate().await?;

    println!("Migrations applied");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
