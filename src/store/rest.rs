use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::{ReviewStore, StoreError};
use crate::models::{NewReviewRecord, ReviewRecord};

/// Review store backed by a hosted table behind a PostgREST-compatible API
/// (`{base}/rest/v1/{table}`)
pub struct RestStore {
    client: Client,
    table_url: Url,
    api_key: String,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        table: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let table_url = Url::parse(&format!(
            "{}/rest/v1/{}",
            base_url.trim_end_matches('/'),
            table
        ))
        .map_err(|e| StoreError::Other(format!("Invalid review table URL: {}", e)))?;

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            table_url,
            api_key: api_key.into(),
        })
    }

    fn url(&self, filters: &[(&str, String)]) -> Url {
        let mut url = self.table_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Remote { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReviewStore for RestStore {
    #[instrument(skip_all, fields(pr_id = %record.pr_id))]
    async fn create(&self, record: NewReviewRecord) -> Result<ReviewRecord, StoreError> {
        let response = self
            .authorize(self.client.post(self.table_url.clone()))
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await?;

        let saved: Vec<ReviewRecord> = Self::parse(response).await?;
        let saved = saved
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Other("Insert returned no rows".to_string()))?;

        debug!(id = %saved.id, "Saved review to hosted table");

        Ok(saved)
    }

    async fn list(&self, owner: &str) -> Result<Vec<ReviewRecord>, StoreError> {
        let url = self.url(&[
            ("select", "*".to_string()),
            ("user_email", format!("eq.{}", owner)),
            ("order", "created_at.desc".to_string()),
        ]);

        let response = self.authorize(self.client.get(url)).send().await?;
        Self::parse(response).await
    }

    async fn delete_one(&self, id: Uuid, owner: &str) -> Result<bool, StoreError> {
        let url = self.url(&[
            ("id", format!("eq.{}", id)),
            ("user_email", format!("eq.{}", owner)),
        ]);

        let response = self
            .authorize(self.client.delete(url))
            .header("Prefer", "return=representation")
            .send()
            .await?;

        let deleted: Vec<ReviewRecord> = Self::parse(response).await?;
        Ok(!deleted.is_empty())
    }

    async fn find_by_pr_id(
        &self,
        pr_id: &str,
        owner: &str,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let url = self.url(&[
            ("select", "*".to_string()),
            ("pr_id", format!("eq.{}", pr_id)),
            ("user_email", format!("eq.{}", owner)),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ]);

        let response = self.authorize(self.client.get(url)).send().await?;
        let rows: Vec<ReviewRecord> = Self::parse(response).await?;
        Ok(rows.into_iter().next())
    }
}
