//! Building collaborators from `bqmirror.toml`

use bqmirror_cache::{CacheResult, CacheStore};
use bqmirror_catalog::{BigQueryDirectory, BqCliDirectory, RemoteDirectory, RemoteError};
use bqmirror_core::{Config, RemoteBackend};
use std::sync::Arc;
use tracing::info;

/// Create the remote directory selected by `[remote] backend`
///
/// The api backend needs `billing_project` and uses Application Default
/// Credentials.
pub async fn directory_from_config(config: &Config) -> Result<Arc<dyn RemoteDirectory>, RemoteError> {
    match config.remote.backend {
        RemoteBackend::Cli => {
            info!(bq_path = %config.remote.bq_path, "using bq CLI directory");
            Ok(Arc::new(BqCliDirectory::new(config.remote.bq_path.clone())))
        }
        RemoteBackend::Api => {
            let billing_project = config
                .remote
                .billing_project
                .clone()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    RemoteError::Config("remote.billing_project is required for the api backend".into())
                })?;
            info!(%billing_project, "using BigQuery API directory");
            Ok(Arc::new(BigQueryDirectory::with_adc(billing_project).await?))
        }
    }
}

/// Open the store at `[cache] path`, or the per-user default
pub fn open_store(config: &Config) -> CacheResult<CacheStore> {
    match &config.cache.path {
        Some(path) => CacheStore::open(path),
        None => CacheStore::open_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cli_backend_by_default() {
        let directory = directory_from_config(&Config::default()).await.unwrap();
        assert_eq!(directory.name(), "bq-cli");
    }

    #[tokio::test]
    async fn api_backend_requires_billing_project() {
        let mut config = Config::default();
        config.remote.backend = RemoteBackend::Api;

        let result = directory_from_config(&config).await;
        assert!(matches!(result, Err(RemoteError::Config(_))));
    }

    #[test]
    fn store_at_configured_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.path = Some(dir.path().join("nested").join("cache.db"));

        let store = open_store(&config).unwrap();
        assert_eq!(store.path(), config.cache.path.as_deref());
    }
}
