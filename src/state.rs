use crate::services::ad_service::AdService;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn AdService>,
    /// Pool used by the readiness probe.
    pub db: SqlitePool,
}
