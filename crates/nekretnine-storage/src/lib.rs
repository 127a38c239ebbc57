//! Listing persistence + HTTP page fetch utilities.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use nekretnine_core::Listing;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

pub use sqlx::Error as SqlxError;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Something that can hand back the HTML of one listings page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Single-shot GET client. Failures surface to the caller; the next scheduled
/// run is the retry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }
            let body = resp.text().await?;
            debug!(status = %status, bytes = body.len(), "page fetched");
            Ok(body)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_text(url).await
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Selection of not-yet-delivered listings.
///
/// `ingested_within: None` is plain flag-based delivery. A window additionally
/// drops unvisited rows older than the window; they stay unvisited in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnvisitedQuery {
    pub ingested_within: Option<TimeDelta>,
}

impl UnvisitedQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within(window: TimeDelta) -> Self {
        Self {
            ingested_within: Some(window),
        }
    }

    /// A window reaching past the earliest representable time has no cutoff.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ingested_within
            .and_then(|window| now.checked_sub_signed(window))
    }
}

/// Durable owner of listing records.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert when `listing.id` is unknown. Existing rows are left untouched,
    /// including their `visited` flag. Returns whether a row was inserted.
    async fn upsert(&self, listing: &Listing) -> Result<bool, StoreError>;

    /// Unvisited listings ordered by ingestion time, then id.
    async fn query_unvisited(&self, query: &UnvisitedQuery) -> Result<Vec<Listing>, StoreError>;

    /// Flip `visited` to true. Idempotent; unknown ids are ignored.
    async fn mark_visited(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn upsert(&self, listing: &Listing) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO listings (id, name, price, location, url, visited)
             VALUES ($1, $2, $3, $4, $5, FALSE)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&listing.id)
        .bind(&listing.name)
        .bind(&listing.price)
        .bind(&listing.location)
        .bind(&listing.url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn query_unvisited(&self, query: &UnvisitedQuery) -> Result<Vec<Listing>, StoreError> {
        let cutoff = query.cutoff(Utc::now());
        let rows = sqlx::query(
            "SELECT id, name, price, location, url, visited
             FROM listings
             WHERE visited = FALSE
               AND ($1::timestamptz IS NULL OR created_at >= $1)
             ORDER BY created_at, id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Listing, StoreError> {
                Ok(Listing {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    price: row.try_get("price")?,
                    location: row.try_get("location")?,
                    url: row.try_get("url")?,
                    visited: row.try_get("visited")?,
                })
            })
            .collect()
    }

    async fn mark_visited(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE listings SET visited = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryRow {
    listing: Listing,
    created_at: DateTime<Utc>,
}

/// Process-local store with the same semantics as [`PgListingStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryListingStore {
    rows: Arc<Mutex<Vec<MemoryRow>>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit ingestion timestamp.
    pub async fn upsert_at(&self, listing: &Listing, created_at: DateTime<Utc>) -> bool {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|row| row.listing.id == listing.id) {
            return false;
        }
        rows.push(MemoryRow {
            listing: Listing {
                visited: false,
                ..listing.clone()
            },
            created_at,
        });
        true
    }

    pub async fn get(&self, id: &str) -> Option<Listing> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|row| row.listing.id == id)
            .map(|row| row.listing.clone())
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn upsert(&self, listing: &Listing) -> Result<bool, StoreError> {
        Ok(self.upsert_at(listing, Utc::now()).await)
    }

    async fn query_unvisited(&self, query: &UnvisitedQuery) -> Result<Vec<Listing>, StoreError> {
        let cutoff = query.cutoff(Utc::now());
        let rows = self.rows.lock().await;
        let mut selected = rows
            .iter()
            .filter(|row| !row.listing.visited)
            .filter(|row| cutoff.map_or(true, |cutoff| row.created_at >= cutoff))
            .collect::<Vec<_>>();
        selected.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.listing.id.cmp(&b.listing.id))
        });
        Ok(selected.into_iter().map(|row| row.listing.clone()).collect())
    }

    async fn mark_visited(&self, id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.iter_mut().find(|row| row.listing.id == id) {
            row.listing.visited = true;
        }
        Ok(())
    }
}
