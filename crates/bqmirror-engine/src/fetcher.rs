//! Schema refresh cycles
//!
//! One cycle walks the warehouse top-down and replaces cached scopes as it
//! goes:
//!
//! 1. List projects. Failure aborts the cycle.
//! 2. Replace the project list.
//! 3. Per project: list datasets and replace them. Failure skips the project.
//! 4. Per dataset mentioned by an open document: fetch folded tables and
//!    replace them. Failure skips the dataset.
//!
//! Column fetches run concurrently up to [`FetchOptions::concurrency`].
//! Cycles never overlap; a second caller waits for the running cycle.

use bqmirror_cache::{CacheError, CacheResult, CacheStore};
use bqmirror_catalog::{with_timeout, RemoteDirectory, RemoteError};
use bqmirror_core::{Dataset, RefreshReport, RemoteConfig, Scope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Errors that can occur during a refresh
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The project list could not be fetched; nothing was written
    #[error("Failed to list projects: {0}")]
    ProjectList(#[source] RemoteError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Cache task failed: {0}")]
    Task(String),
}

/// Limits applied to a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Deadline for each remote call
    pub timeout: Duration,

    /// Row cap for each grouped column query
    pub max_column_rows: usize,

    /// Column fetches in flight at once
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for FetchOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_column_rows: config.max_column_rows,
            concurrency: config.concurrency.max(1),
        }
    }
}

/// Whether any open document mentions `dataset_id`
///
/// A plain substring test: a dataset named `sales` is referenced by any text
/// containing `sales`, including `wholesales`.
pub fn is_referenced(dataset_id: &str, open_texts: &[String]) -> bool {
    open_texts.iter().any(|text| text.contains(dataset_id))
}

/// Pulls metadata from a remote directory into the cache store
pub struct SchemaFetcher {
    directory: Arc<dyn RemoteDirectory>,
    store: Arc<CacheStore>,
    options: FetchOptions,
    in_flight: Mutex<()>,
}

impl SchemaFetcher {
    pub fn new(directory: Arc<dyn RemoteDirectory>, store: Arc<CacheStore>) -> Self {
        Self {
            directory,
            store,
            options: FetchOptions::default(),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = FetchOptions {
            concurrency: options.concurrency.max(1),
            ..options
        };
        self
    }

    pub fn options(&self) -> FetchOptions {
        self.options
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Run one refresh cycle against the given open document texts
    pub async fn refresh(&self, open_texts: &[String]) -> Result<RefreshReport, RefreshError> {
        let _cycle = self.in_flight.lock().await;
        let mut report = RefreshReport::new();

        let projects = with_timeout(self.options.timeout, self.directory.list_projects())
            .await
            .map_err(|e| {
                warn!(directory = self.directory.name(), error = %e, "failed to list projects, aborting refresh");
                RefreshError::ProjectList(e)
            })?;

        {
            let projects = projects.clone();
            blocking(&self.store, move |store| store.replace_projects(&projects)).await?;
        }
        report.projects = projects.len();

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut fetches = JoinSet::new();

        for project in &projects {
            let datasets = match self.refresh_datasets(&project.id).await {
                Ok(datasets) => datasets,
                Err(e) => {
                    warn!(project = %project.id, error = %e, "skipping datasets");
                    report.add_failure(Scope::datasets(&project.id), e.to_string());
                    continue;
                }
            };
            report.dataset_scopes += 1;

            for dataset in datasets.into_iter().filter(|d| d.project == project.id) {
                if !is_referenced(&dataset.id, open_texts) {
                    debug!(project = %dataset.project, dataset = %dataset.id, "not referenced, skipping columns");
                    report.datasets_not_referenced += 1;
                    continue;
                }

                let directory = Arc::clone(&self.directory);
                let store = Arc::clone(&self.store);
                let semaphore = Arc::clone(&semaphore);
                let options = self.options;

                fetches.spawn(async move {
                    let scope = Scope::columns(&dataset.project, &dataset.id);
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => refresh_columns(directory, store, dataset, options).await,
                        Err(e) => Err(RefreshError::Task(e.to_string())),
                    };
                    (scope, outcome)
                });
            }
        }

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((_, Ok(tables))) => {
                    report.column_scopes += 1;
                    report.tables += tables;
                }
                Ok((scope, Err(e))) => {
                    warn!(%scope, error = %e, "skipping columns");
                    report.add_failure(scope, e.to_string());
                }
                Err(e) => warn!(error = %e, "column fetch task failed"),
            }
        }

        report.finish();
        info!(
            projects = report.projects,
            datasets = report.dataset_scopes,
            columns = report.column_scopes,
            tables = report.tables,
            not_referenced = report.datasets_not_referenced,
            failures = report.failures.len(),
            "refresh finished"
        );
        Ok(report)
    }

    async fn refresh_datasets(&self, project: &str) -> Result<Vec<Dataset>, RefreshError> {
        let datasets = with_timeout(self.options.timeout, self.directory.list_datasets(project)).await?;

        let owned = datasets.clone();
        let project = project.to_string();
        blocking(&self.store, move |store| store.replace_datasets(&project, &owned)).await?;

        Ok(datasets)
    }
}

/// Fetch and replace one dataset's tables, returning the table count
async fn refresh_columns(
    directory: Arc<dyn RemoteDirectory>,
    store: Arc<CacheStore>,
    dataset: Dataset,
    options: FetchOptions,
) -> Result<usize, RefreshError> {
    let tables = with_timeout(
        options.timeout,
        directory.list_columns(&dataset, options.max_column_rows),
    )
    .await?;

    let count = tables.len();
    blocking(&store, move |store| {
        store.replace_columns(&dataset.project, &dataset.id, &tables)
    })
    .await?;

    Ok(count)
}

/// Run a store call on the blocking pool
async fn blocking<F>(store: &Arc<CacheStore>, f: F) -> Result<(), RefreshError>
where
    F: FnOnce(&CacheStore) -> CacheResult<()> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| RefreshError::Task(e.to_string()))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_gate() {
        let texts = vec!["SELECT * FROM `p.wholesales.orders`".to_string()];
        assert!(is_referenced("wholesales", &texts));
        assert!(is_referenced("sales", &texts));
        assert!(!is_referenced("marketing", &texts));
        assert!(!is_referenced("sales", &[]));
    }

    #[test]
    fn options_follow_config() {
        let config = RemoteConfig {
            timeout_secs: 5,
            max_column_rows: 500,
            concurrency: 0,
            ..RemoteConfig::default()
        };

        let options = FetchOptions::from(&config);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_column_rows, 500);
        assert_eq!(options.concurrency, 1);
    }

    #[tokio::test]
    async fn fetcher_clamps_concurrency() {
        let fetcher = SchemaFetcher::new(
            Arc::new(bqmirror_catalog::MockDirectory::new()),
            Arc::new(CacheStore::open_in_memory().unwrap()),
        )
        .with_options(FetchOptions {
            concurrency: 0,
            ..FetchOptions::default()
        });

        assert_eq!(fetcher.options().concurrency, 1);
    }
}
