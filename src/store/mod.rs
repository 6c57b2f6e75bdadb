pub mod json;
pub mod postgres;
pub mod rest;

pub use json::JsonStore;
pub use postgres::PostgresStore;
pub use rest::RestStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{NewReviewRecord, ReviewRecord};

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Review table error ({status}): {body}")]
    Remote {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Review table request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Review file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Review file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Backend for review records. Every read and delete is scoped by owner.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert a record and return it with its assigned id
    async fn create(&self, record: NewReviewRecord) -> Result<ReviewRecord, StoreError>;

    /// All records of an owner, most recent first
    async fn list(&self, owner: &str) -> Result<Vec<ReviewRecord>, StoreError>;

    /// Delete a record only if it belongs to the owner. Returns whether a
    /// record was removed.
    async fn delete_one(&self, id: Uuid, owner: &str) -> Result<bool, StoreError>;

    /// The owner's most recent review of a pull request
    async fn find_by_pr_id(
        &self,
        pr_id: &str,
        owner: &str,
    ) -> Result<Option<ReviewRecord>, StoreError>;
}

/// Result of a gateway call: a success flag plus data or a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        if self.success {
            self.data
                .ok_or_else(|| "Operation returned no data".to_string())
        } else {
            Err(self.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }

    fn from_result(operation: &str, result: Result<T, StoreError>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(e) => {
                error!(operation, error = %e, "Review store operation failed");
                Outcome::failed(e.to_string())
            }
        }
    }
}

/// Fail-soft access to review records.
///
/// Backend errors are logged and folded into an [`Outcome`]; nothing is
/// returned as `Err` past this boundary.
#[derive(Clone)]
pub struct ReviewGateway {
    store: Arc<dyn ReviewStore>,
}

impl ReviewGateway {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, record: NewReviewRecord) -> Outcome<ReviewRecord> {
        debug!(pr_id = %record.pr_id, owner = %record.user_email, "Saving review");
        Outcome::from_result("create", self.store.create(record).await)
    }

    pub async fn list(&self, owner: &str) -> Outcome<Vec<ReviewRecord>> {
        Outcome::from_result("list", self.store.list(owner).await)
    }

    pub async fn delete_one(&self, id: Uuid, owner: &str) -> Outcome<bool> {
        Outcome::from_result("delete", self.store.delete_one(id, owner).await)
    }

    pub async fn find_by_pr_id(&self, pr_id: &str, owner: &str) -> Outcome<Option<ReviewRecord>> {
        Outcome::from_result("find", self.store.find_by_pr_id(pr_id, owner).await)
    }
}

/// Sort records most recent first, keeping later inserts ahead on ties
pub(crate) fn newest_first(mut records: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
    records.reverse();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}
