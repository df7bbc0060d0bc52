//! Persistence for photos in the `t_photo` table.

use super::ad_store::{StoreError, StoreResult};
use crate::models::photo::Photo;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

/// Create/delete access to photo rows. Photos are never updated.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Insert a photo for `ad_id`. Fails with [`StoreError::MissingAd`] when
    /// the ad does not exist. Photo rows outlive their ad.
    async fn create(&self, ad_id: i64, url_original: &str) -> StoreResult<Photo>;

    /// Delete photo `id`, but only if it belongs to `ad_id`.
    async fn delete(&self, ad_id: i64, id: i64) -> StoreResult<u64>;

    async fn find(&self, id: i64) -> StoreResult<Option<Photo>>;
}

#[derive(Clone)]
pub struct SqlPhotoStore {
    db: SqlitePool,
}

impl SqlPhotoStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PhotoStore for SqlPhotoStore {
    async fn create(&self, ad_id: i64, url_original: &str) -> StoreResult<Photo> {
        // The ad check and the insert run as one statement; no row means
        // the ad does not exist.
        let photo = sqlx::query_as::<_, Photo>(
            "INSERT INTO t_photo (ad_id, url_original, created_at)
             SELECT ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM t_ad WHERE id = ?)
             RETURNING id, ad_id, url_original, created_at",
        )
        .bind(ad_id)
        .bind(url_original)
        .bind(Utc::now())
        .bind(ad_id)
        .fetch_optional(&self.db)
        .await?;

        photo.ok_or(StoreError::MissingAd(ad_id))
    }

    async fn delete(&self, ad_id: i64, id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM t_photo WHERE id = ? AND ad_id = ?")
            .bind(id)
            .bind(ad_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(
            "SELECT id, ad_id, url_original, created_at FROM t_photo WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(photo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::ad::Ad,
        services::ad_store::{AdStore, SqlAdStore},
        testing::memory_pool,
    };

    async fn seeded() -> (SqlAdStore, SqlPhotoStore, i64) {
        let pool = memory_pool().await;
        let ads = SqlAdStore::new(pool.clone());
        let ad_id = ads
            .create(&Ad {
                user_id: "u1".into(),
                title: "Bike".into(),
                description: "Red bike".into(),
                ..Ad::default()
            })
            .await
            .unwrap();
        (ads, SqlPhotoStore::new(pool), ad_id)
    }

    #[tokio::test]
    async fn create_links_photo_to_ad() {
        let (_, photos, ad_id) = seeded().await;

        let photo = photos
            .create(ad_id, "https://cdn.test/bucket/1-1-0")
            .await
            .unwrap();

        assert!(photo.id > 0);
        assert_eq!(photo.ad_id, ad_id);
        assert_eq!(
            photos.find(photo.id).await.unwrap().unwrap().url_original,
            "https://cdn.test/bucket/1-1-0"
        );
    }

    #[tokio::test]
    async fn create_for_unknown_ad_is_rejected() {
        let (_, photos, ad_id) = seeded().await;

        let err = photos.create(ad_id + 100, "https://x").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingAd(id) if id == ad_id + 100));
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_owning_ad() {
        let (ads, photos, ad_id) = seeded().await;
        let other_ad = ads
            .create(&Ad {
                user_id: "u2".into(),
                title: "Lamp".into(),
                description: "Desk lamp".into(),
                ..Ad::default()
            })
            .await
            .unwrap();
        let photo = photos.create(ad_id, "https://x").await.unwrap();

        assert_eq!(photos.delete(other_ad, photo.id).await.unwrap(), 0);
        assert!(photos.find(photo.id).await.unwrap().is_some());

        assert_eq!(photos.delete(ad_id, photo.id).await.unwrap(), 1);
        assert!(photos.find(photo.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_an_ad_keeps_its_photo_rows() {
        let (ads, photos, ad_id) = seeded().await;
        let photo = photos.create(ad_id, "https://x").await.unwrap();

        assert_eq!(ads.delete(ad_id).await.unwrap(), 1);
        assert_eq!(photos.find(photo.id).await.unwrap(), Some(photo.clone()));

        // Once the ad is gone no new photo may reference it.
        let err = photos.create(ad_id, "https://y").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingAd(id) if id == ad_id));
    }
}
