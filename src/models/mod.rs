//! Core data models for the ad manager.
//!
//! These entities map to the `t_ad` and `t_photo` tables via `sqlx::FromRow`
//! and serialize as the JSON bodies of the HTTP API via `serde`.

pub mod ad;
pub mod photo;
