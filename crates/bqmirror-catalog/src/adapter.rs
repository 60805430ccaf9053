//! Remote directory trait for listing warehouse metadata and validating queries

use bqmirror_core::{Dataset, Project, Table};
use std::future::Future;
use std::time::Duration;

/// Outcome of a successful dry run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DryRunResult {
    /// Estimated bytes processed, if the service reported one
    pub processed_bytes: Option<u64>,
}

impl DryRunResult {
    pub fn with_bytes(processed_bytes: u64) -> Self {
        Self {
            processed_bytes: Some(processed_bytes),
        }
    }
}

/// Errors that can occur when talking to the warehouse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The warehouse rejected the query; the text may embed a `[row:col]` marker
    #[error("{0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RemoteError {
    /// Whether this is a query validation failure rather than a transport problem
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Source of warehouse metadata and query validation
///
/// Implementations: the `bq` command-line tool ([`crate::BqCliDirectory`]),
/// the BigQuery REST API ([`crate::BigQueryDirectory`]) and an in-memory fake
/// ([`crate::MockDirectory`]).
#[async_trait::async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Get the directory name (e.g., "bq-cli", "BigQuery")
    fn name(&self) -> &'static str;

    /// List every project visible to the caller
    async fn list_projects(&self) -> Result<Vec<Project>, RemoteError>;

    /// List the datasets of one project
    async fn list_datasets(&self, project: &str) -> Result<Vec<Dataset>, RemoteError>;

    /// Fetch every table of a dataset with its columns
    ///
    /// Table names come back folded (see [`bqmirror_core::fold_shard_suffix`]).
    /// At most `max_rows` column rows are read.
    async fn list_columns(&self, dataset: &Dataset, max_rows: usize) -> Result<Vec<Table>, RemoteError>;

    /// Validate `sql` without running it
    async fn dry_run(&self, sql: &str) -> Result<DryRunResult, RemoteError>;
}

/// Run a remote call with a deadline, mapping expiry to [`RemoteError::Timeout`]
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}

/// Build the grouped INFORMATION_SCHEMA query for one dataset
///
/// Shard suffixes are folded server-side, and each (table, column, type)
/// triple is returned once, ordered by its first ordinal position.
pub fn columns_query(dataset: &Dataset, max_rows: usize) -> Result<String, RemoteError> {
    let project = checked_identifier(&dataset.project)?;
    let dataset_id = checked_identifier(&dataset.id)?;

    Ok(format!(
        r#"
        SELECT
            REGEXP_REPLACE(table_name, r'[0-9]{{8,}}$', '*') AS table_id,
            column_name,
            data_type,
            MIN(ordinal_position) AS ordinal
        FROM `{}.{}.INFORMATION_SCHEMA.COLUMNS`
        GROUP BY table_id, column_name, data_type
        ORDER BY table_id, ordinal
        LIMIT {}
        "#,
        project, dataset_id, max_rows
    ))
}

fn checked_identifier(id: &str) -> Result<&str, RemoteError> {
    if id.is_empty() || id.contains('`') || id.contains('\\') {
        return Err(RemoteError::Config(format!("Invalid identifier: {:?}", id)));
    }
    Ok(id)
}
