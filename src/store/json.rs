use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::{newest_first, ReviewStore, StoreError};
use crate::models::{NewReviewRecord, ReviewRecord};

/// JSON file-based store for local development
pub struct JsonStore {
    path: PathBuf,
    // serialises read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).with_context(|| {
            format!("Failed to create review directory: {}", base_path.display())
        })?;

        info!(path = %base_path.display(), "Initialized JSON review store");

        Ok(Self {
            path: base_path.join("reviews.json"),
            lock: Mutex::new(()),
        })
    }

    fn load_all(&self) -> Result<Vec<ReviewRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_all(&self, records: &[ReviewRecord]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for JsonStore {
    async fn create(&self, record: NewReviewRecord) -> Result<ReviewRecord, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = self.load_all()?;
        let record = record.into_record(Uuid::new_v4());
        records.push(record.clone());
        self.save_all(&records)?;

        debug!(id = %record.id, "Saved review to file");

        Ok(record)
    }

    async fn list(&self, owner: &str) -> Result<Vec<ReviewRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let owned = self
            .load_all()?
            .into_iter()
            .filter(|r| r.user_email == owner)
            .collect();

        Ok(newest_first(owned))
    }

    async fn delete_one(&self, id: Uuid, owner: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|r| !(r.id == id && r.user_email == owner));

        if records.len() == before {
            return Ok(false);
        }

        self.save_all(&records)?;
        Ok(true)
    }

    async fn find_by_pr_id(
        &self,
        pr_id: &str,
        owner: &str,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let matching = self
            .load_all()?
            .into_iter()
            .filter(|r| r.pr_id == pr_id && r.user_email == owner)
            .collect();

        Ok(newest_first(matching).into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";

    fn review(owner: &str, pr_id: &str) -> NewReviewRecord {
        NewReviewRecord::new(
            owner,
            pr_id,
            format!("PR {}", pr_id),
            format!("https://github.com/o/r/pull/{}", pr_id),
            "## Review\nLooks fine.",
        )
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let first = store.create(review(ALICE, "1")).await.unwrap();
        let second = store.create(review(ALICE, "2")).await.unwrap();
        assert_ne!(first.id, second.id);

        let listed = store.list(ALICE).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn test_list_never_returns_other_owners() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        store.create(review(ALICE, "1")).await.unwrap();
        store.create(review(BOB, "2")).await.unwrap();
        store.create(review(BOB, "3")).await.unwrap();

        let alice = store.list(ALICE).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert!(alice.iter().all(|r| r.user_email == ALICE));

        let bob = store.list(BOB).await.unwrap();
        assert_eq!(bob.len(), 2);
        assert!(bob.iter().all(|r| r.user_email == BOB));
    }

    #[tokio::test]
    async fn test_delete_is_owner_scoped() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        let bobs = store.create(review(BOB, "2")).await.unwrap();

        assert!(!store.delete_one(bobs.id, ALICE).await.unwrap());
        assert_eq!(store.list(BOB).await.unwrap().len(), 1);

        assert!(store.delete_one(bobs.id, BOB).await.unwrap());
        assert!(store.list(BOB).await.unwrap().is_empty());

        assert!(!store.delete_one(Uuid::new_v4(), BOB).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_pr_id() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();

        store.create(review(ALICE, "7")).await.unwrap();
        let latest = store.create(review(ALICE, "7")).await.unwrap();
        store.create(review(BOB, "8")).await.unwrap();

        let found = store.find_by_pr_id("7", ALICE).await.unwrap().unwrap();
        assert_eq!(found.id, latest.id);

        assert!(store.find_by_pr_id("8", ALICE).await.unwrap().is_none());
        assert!(store.find_by_pr_id("404", ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let created = {
            let store = JsonStore::new(dir.path()).unwrap();
            store.create(review(ALICE, "1")).await.unwrap()
        };

        let reopened = JsonStore::new(dir.path()).unwrap();
        let listed = reopened.list(ALICE).await.unwrap();
        assert_eq!(listed, vec![created]);
    }
}
