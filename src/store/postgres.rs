use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ReviewStore, StoreError};
use crate::models::{NewReviewRecord, ReviewRecord};

/// PostgreSQL-backed review store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL with the given connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations complete");

        Ok(())
    }
}

#[async_trait]
impl ReviewStore for PostgresStore {
    async fn create(&self, record: NewReviewRecord) -> Result<ReviewRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO pr_reviews (pr_id, pr_title, pr_url, review_content, user_email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, pr_id, pr_title, pr_url, review_content, user_email, created_at
            "#,
        )
        .bind(&record.pr_id)
        .bind(&record.pr_title)
        .bind(&record.pr_url)
        .bind(&record.review_content)
        .bind(&record.user_email)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        let saved = record_from_row(&row)?;

        debug!(id = %saved.id, "Saved review to database");

        Ok(saved)
    }

    async fn list(&self, owner: &str) -> Result<Vec<ReviewRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, pr_id, pr_title, pr_url, review_content, user_email, created_at
            FROM pr_reviews
            WHERE user_email = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete_one(&self, id: Uuid, owner: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pr_reviews WHERE id = $1 AND user_email = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_pr_id(
        &self,
        pr_id: &str,
        owner: &str,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, pr_id, pr_title, pr_url, review_content, user_email, created_at
            FROM pr_reviews
            WHERE pr_id = $1 AND user_email = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(pr_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn record_from_row(row: &PgRow) -> Result<ReviewRecord, StoreError> {
    Ok(ReviewRecord {
        id: row.try_get("id")?,
        pr_id: row.try_get("pr_id")?,
        pr_title: row.try_get("pr_title")?,
        pr_url: row.try_get("pr_url")?,
        review_content: row.try_get("review_content")?,
        user_email: row.try_get("user_email")?,
        created_at: row.try_get("created_at")?,
    })
}
