//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use vocalis_core::config::CallbackConfig;
use vocalis_database::DatabasePool;
use vocalis_service::CallbackService;

/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Callback authentication settings.
    pub callback_config: Arc<CallbackConfig>,
    /// Applies completion callbacks.
    pub callback_service: Arc<CallbackService>,
    /// Database pool, absent when running on the in-memory store.
    pub db_pool: Option<DatabasePool>,
    /// Process start time.
    pub started_at: Instant,
}
