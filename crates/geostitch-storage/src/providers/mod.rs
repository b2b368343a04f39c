//! Object store provider implementations.

pub mod local;
pub mod s3;

use std::sync::Arc;

use geostitch_core::config::object_store::ObjectStoreConfig;
use geostitch_core::error::AppError;
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;

/// Construct the configured object store provider.
pub async fn build_store(config: &ObjectStoreConfig) -> AppResult<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "local" => {
            let store = local::LocalObjectStore::new(&config.local.root_path).await?;
            Ok(Arc::new(store))
        }
        "s3" => {
            let store = s3::S3ObjectStore::new(&config.s3).await?;
            Ok(Arc::new(store))
        }
        other => Err(AppError::configuration(format!(
            "Unknown object store provider: '{other}'"
        ))),
    }
}
