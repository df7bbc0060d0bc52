//! Represents a classified listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A classified ad.
///
/// The same shape is used for request bodies and stored rows, so every field
/// tolerates being absent on input. An `id` of `0` means "not persisted yet".
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, Default, PartialEq)]
pub struct Ad {
    /// Store-assigned identifier, `0` until the ad is created.
    #[serde(default, alias = "id_ad")]
    pub id: i64,

    /// Owning user. Set once at creation and never updated.
    #[serde(default, alias = "id_user")]
    pub user_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ad {
    /// True when any field required for creation is empty.
    pub fn missing_required_fields(&self) -> bool {
        self.user_id.trim().is_empty()
            || self.title.trim().is_empty()
            || self.description.trim().is_empty()
    }

    /// True when the price is absent or zero.
    pub fn missing_price(&self) -> bool {
        self.price.is_none_or(|price| price == 0.0)
    }
}
