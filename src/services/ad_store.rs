//! Persistence for ads in the `t_ad` table.

use crate::models::ad::Ad;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced ad does not exist.
    #[error("ad {0} does not exist")]
    MissingAd(i64),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create/update/delete access to ad rows.
///
/// Mutations report the number of rows they touched; a count of zero is the
/// only signal that the identifier did not resolve.
#[async_trait]
pub trait AdStore: Send + Sync {
    /// Insert a new ad and return its assigned identifier.
    async fn create(&self, ad: &Ad) -> StoreResult<i64>;

    /// Apply the non-empty fields of `ad` to the row with `ad.id`.
    ///
    /// `user_id` is never written.
    async fn update(&self, ad: &Ad) -> StoreResult<u64>;

    async fn delete(&self, id: i64) -> StoreResult<u64>;

    async fn find(&self, id: i64) -> StoreResult<Option<Ad>>;
}

/// `AdStore` backed by the shared SQLite pool.
#[derive(Clone)]
pub struct SqlAdStore {
    db: SqlitePool,
}

impl SqlAdStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AdStore for SqlAdStore {
    async fn create(&self, ad: &Ad) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO t_ad (user_id, title, description, price, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&ad.user_id)
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(ad.price)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, ad: &Ad) -> StoreResult<u64> {
        let title = Some(ad.title.as_str()).filter(|s| !s.is_empty());
        let description = Some(ad.description.as_str()).filter(|s| !s.is_empty());

        let result = sqlx::query(
            "UPDATE t_ad SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                price = COALESCE(?, price),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(ad.price)
        .bind(Utc::now())
        .bind(ad.id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM t_ad WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Ad>> {
        let ad = sqlx::query_as::<_, Ad>(
            "SELECT id, user_id, title, description, price, created_at, updated_at
             FROM t_ad WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(ad)
    }
}
