//! Represents a photo attached to an ad.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An uploaded photo.
///
/// Photos are immutable once created: the only mutation is deletion, which is
/// always scoped to the owning ad.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Photo {
    /// Store-assigned identifier.
    pub id: i64,

    /// The ad this photo belongs to.
    pub ad_id: i64,

    /// Public URL of the original upload in object storage.
    pub url_original: String,

    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}
