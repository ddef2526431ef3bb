//! SQLite posting store.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Running the tracker from cron on one machine
//! - Local development
//! - Tests (in-memory database)

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{PersistenceError, StoreResult};
use crate::stores::memory::check_partition;
use crate::traits::store::{ChangeSet, PostingQuery, PostingStore};
use crate::types::posting::{JobPosting, PostingStatus};

const SELECT_COLUMNS: &str = "source_id, external_id, title, location, url, posted_at, department, \
     description, first_seen_at, last_seen_at, status, raw_fingerprint";

/// SQLite-based posting store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and migrate) the database at `database_url`.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://job_listings.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Every pooled connection would open its own empty database, so the
    /// pool is pinned to a single long-lived connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_postings (
                source_id TEXT NOT NULL,
                external_id TEXT NOT NULL,
                title TEXT NOT NULL,
                location TEXT,
                url TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                department TEXT,
                description TEXT,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                raw_fingerprint TEXT NOT NULL,
                PRIMARY KEY (source_id, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_job_postings_status ON job_postings(source_id, status);
            CREATE INDEX IF NOT EXISTS idx_job_postings_first_seen ON job_postings(first_seen_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::storage)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(field: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Corrupt(format!("invalid {} {:?}: {}", field, value, e)))
}

#[derive(Debug, FromRow)]
struct PostingRow {
    source_id: String,
    external_id: String,
    title: String,
    location: Option<String>,
    url: String,
    posted_at: String,
    department: Option<String>,
    description: Option<String>,
    first_seen_at: String,
    last_seen_at: String,
    status: String,
    raw_fingerprint: String,
}

impl PostingRow {
    fn into_posting(self) -> StoreResult<JobPosting> {
        let status = PostingStatus::parse(&self.status)
            .ok_or_else(|| PersistenceError::Corrupt(format!("unknown status {:?}", self.status)))?;

        Ok(JobPosting {
            posted_at: parse_timestamp("posted_at", &self.posted_at)?,
            first_seen_at: parse_timestamp("first_seen_at", &self.first_seen_at)?,
            last_seen_at: parse_timestamp("last_seen_at", &self.last_seen_at)?,
            source_id: self.source_id,
            external_id: self.external_id,
            title: self.title,
            location: self.location,
            url: self.url,
            department: self.department,
            description: self.description,
            status,
            raw_fingerprint: self.raw_fingerprint,
        })
    }
}

#[async_trait]
impl PostingStore for SqliteStore {
    async fn get_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>> {
        let sql = format!(
            "SELECT {} FROM job_postings WHERE source_id = ? ORDER BY external_id",
            SELECT_COLUMNS
        );
        let rows: Vec<PostingRow> = sqlx::query_as(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::storage)?;

        rows.into_iter().map(PostingRow::into_posting).collect()
    }

    async fn get_active_postings(&self, source_id: &str) -> StoreResult<Vec<JobPosting>> {
        let sql = format!(
            "SELECT {} FROM job_postings WHERE source_id = ? AND status = 'active' ORDER BY external_id",
            SELECT_COLUMNS
        );
        let rows: Vec<PostingRow> = sqlx::query_as(&sql)
            .bind(source_id)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::storage)?;

        rows.into_iter().map(PostingRow::into_posting).collect()
    }

    async fn commit(&self, source_id: &str, changes: &ChangeSet) -> StoreResult<()> {
        check_partition(source_id, changes)?;
        if changes.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on any error rolls it back
        let mut tx = self.pool.begin().await.map_err(PersistenceError::storage)?;

        for posting in &changes.upserts {
            sqlx::query(
                r#"
                INSERT INTO job_postings (
                    source_id, external_id, title, location, url, posted_at, department,
                    description, first_seen_at, last_seen_at, status, raw_fingerprint
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(source_id, external_id) DO UPDATE SET
                    title = excluded.title,
                    location = excluded.location,
                    url = excluded.url,
                    posted_at = excluded.posted_at,
                    department = excluded.department,
                    description = excluded.description,
                    first_seen_at = excluded.first_seen_at,
                    last_seen_at = excluded.last_seen_at,
                    status = excluded.status,
                    raw_fingerprint = excluded.raw_fingerprint
                "#,
            )
            .bind(&posting.source_id)
            .bind(&posting.external_id)
            .bind(&posting.title)
            .bind(&posting.location)
            .bind(&posting.url)
            .bind(timestamp(&posting.posted_at))
            .bind(&posting.department)
            .bind(&posting.description)
            .bind(timestamp(&posting.first_seen_at))
            .bind(timestamp(&posting.last_seen_at))
            .bind(posting.status.as_str())
            .bind(&posting.raw_fingerprint)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::storage)?;
        }

        for identity in &changes.closed {
            sqlx::query(
                "UPDATE job_postings SET status = 'closed' WHERE source_id = ? AND external_id = ?",
            )
            .bind(&identity.source_id)
            .bind(&identity.external_id)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::storage)?;
        }

        tx.commit().await.map_err(PersistenceError::storage)?;
        Ok(())
    }

    async fn query(&self, query: &PostingQuery) -> StoreResult<Vec<JobPosting>> {
        let sql = format!(
            r#"
            SELECT {} FROM job_postings
            WHERE (?1 IS NULL OR source_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR first_seen_at >= ?3)
            ORDER BY first_seen_at DESC, source_id, external_id
            "#,
            SELECT_COLUMNS
        );
        let rows: Vec<PostingRow> = sqlx::query_as(&sql)
            .bind(query.source_id.as_deref())
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.first_seen_since.as_ref().map(timestamp))
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::storage)?;

        rows.into_iter().map(PostingRow::into_posting).collect()
    }
}
