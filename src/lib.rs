pub mod adapters;
pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod orchestrator;
pub mod review;
pub mod server;
pub mod session;
pub mod store;

pub use adapters::{Completer, OpenAiAdapter};
pub use config::Config;
pub use error::ApiError;
pub use github::GitHubClient;
pub use models::*;
pub use orchestrator::{ReviewBoard, ReviewOrchestrator, ReviewState};
pub use review::{ReviewService, Reviewer};
pub use server::{router, AppState};
pub use session::{Session, SessionStore};
pub use store::{JsonStore, Outcome, PostgresStore, RestStore, ReviewGateway, ReviewStore};
