//! Application state shared across all handlers.

use std::sync::Arc;

use geostitch_core::config::AppConfig;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_database::connection::DatabasePool;
use geostitch_entity::registry::ResourceCatalog;
use geostitch_service::dispatch::TriggerDispatcher;
use geostitch_service::imagery::ImageryLookup;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. All fields are
/// `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// PostgreSQL connection pool
    pub db: DatabasePool,
    /// Object store gateway
    pub store: Arc<dyn ObjectStore>,
    /// Resource record catalog
    pub catalog: Arc<dyn ResourceCatalog>,
    /// Trigger dispatcher
    pub dispatcher: Arc<TriggerDispatcher>,
    /// Booking imagery read path
    pub imagery: Arc<ImageryLookup>,
}
