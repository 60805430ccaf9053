//! Mock remote directory for testing
//!
//! Serves predefined projects, datasets, tables and dry-run outcomes from
//! memory. It's useful for:
//! - Unit testing refresh and diagnostic logic
//! - Simulating per-scope failures and slow responses
//! - Asserting which remote calls were (not) made
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bqmirror_catalog::{MockDirectory, RemoteDirectory, RemoteError};
//! use bqmirror_core::{Column, Dataset, Project};
//!
//! let directory = MockDirectory::new();
//! directory.add_project(Project::new("p")).await;
//! directory.add_dataset(Dataset::new("p", "sales", "US")).await;
//! directory.add_table("p", "sales", "orders_20240101", vec![Column::new("id", "INT64")]).await;
//! directory.fail_columns("p", "sales", RemoteError::Unavailable("down".into())).await;
//! ```

use crate::adapter::{DryRunResult, RemoteDirectory, RemoteError};
use bqmirror_core::{Column, Dataset, Project, Scope, Table};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_projects: usize,
    pub list_datasets: usize,
    pub list_columns: usize,
    pub dry_run: usize,
}

#[derive(Default)]
struct Counters {
    list_projects: AtomicUsize,
    list_datasets: AtomicUsize,
    list_columns: AtomicUsize,
    dry_run: AtomicUsize,
}

/// A canned dry-run answer for one SQL text
#[derive(Clone)]
struct DryRunAnswer {
    result: Result<DryRunResult, RemoteError>,
    latency: Duration,
}

/// Mock remote directory
///
/// Clones share the same state, so a test can keep a handle for assertions
/// after handing a clone to the code under test.
#[derive(Clone)]
pub struct MockDirectory {
    /// Projects in listing order
    projects: Arc<RwLock<Vec<Project>>>,

    /// Datasets by project id
    datasets: Arc<RwLock<HashMap<String, Vec<Dataset>>>>,

    /// Raw (unfolded) table rows by (project, dataset)
    tables: Arc<RwLock<HashMap<(String, String), Vec<(String, Column)>>>>,

    /// Errors to return per scope
    errors: Arc<RwLock<HashMap<Scope, RemoteError>>>,

    /// Dry-run answers by exact SQL text
    dry_runs: Arc<RwLock<HashMap<String, DryRunAnswer>>>,

    /// Answer for SQL without a canned response
    default_dry_run: Result<DryRunResult, RemoteError>,

    /// Datasets whose columns were requested, in call order
    column_requests: Arc<Mutex<Vec<(String, String)>>>,

    counters: Arc<Counters>,

    /// Simulated latency for listing calls
    latency: Duration,
}

impl MockDirectory {
    /// Create an empty mock directory
    pub fn new() -> Self {
        Self {
            projects: Arc::new(RwLock::new(Vec::new())),
            datasets: Arc::new(RwLock::new(HashMap::new())),
            tables: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            dry_runs: Arc::new(RwLock::new(HashMap::new())),
            default_dry_run: Ok(DryRunResult::with_bytes(0)),
            column_requests: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
            latency: Duration::ZERO,
        }
    }

    /// Simulate latency on every listing call
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency = Duration::from_millis(latency_ms);
        self
    }

    /// Answer for SQL that has no canned dry-run response
    pub fn with_default_dry_run(mut self, result: Result<DryRunResult, RemoteError>) -> Self {
        self.default_dry_run = result;
        self
    }

    pub async fn add_project(&self, project: Project) {
        self.projects.write().await.push(project);
    }

    pub async fn set_projects(&self, projects: Vec<Project>) {
        *self.projects.write().await = projects;
    }

    pub async fn add_dataset(&self, dataset: Dataset) {
        self.datasets
            .write()
            .await
            .entry(dataset.project.clone())
            .or_default()
            .push(dataset);
    }

    /// Replace the datasets listed for a project
    pub async fn set_datasets(&self, project: &str, datasets: Vec<Dataset>) {
        self.datasets.write().await.insert(project.to_string(), datasets);
    }

    /// Add a table under its raw (unfolded) name
    pub async fn add_table(&self, project: &str, dataset: &str, name: &str, columns: Vec<Column>) {
        let mut tables = self.tables.write().await;
        let rows = tables
            .entry((project.to_string(), dataset.to_string()))
            .or_default();
        rows.extend(columns.into_iter().map(|c| (name.to_string(), c)));
    }

    /// Drop every table of a dataset
    pub async fn clear_tables(&self, project: &str, dataset: &str) {
        self.tables
            .write()
            .await
            .remove(&(project.to_string(), dataset.to_string()));
    }

    /// Make the project listing fail
    pub async fn fail_projects(&self, error: RemoteError) {
        self.errors.write().await.insert(Scope::Projects, error);
    }

    /// Make the dataset listing of one project fail
    pub async fn fail_datasets(&self, project: &str, error: RemoteError) {
        self.errors.write().await.insert(Scope::datasets(project), error);
    }

    /// Make the column query of one dataset fail
    pub async fn fail_columns(&self, project: &str, dataset: &str, error: RemoteError) {
        self.errors
            .write()
            .await
            .insert(Scope::columns(project, dataset), error);
    }

    /// Clear all configured errors
    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    /// Canned dry-run answer for an exact SQL text
    pub async fn add_dry_run(&self, sql: &str, result: Result<DryRunResult, RemoteError>) {
        self.add_dry_run_with_latency(sql, result, 0).await;
    }

    /// Canned dry-run answer that arrives after `latency_ms`
    pub async fn add_dry_run_with_latency(
        &self,
        sql: &str,
        result: Result<DryRunResult, RemoteError>,
        latency_ms: u64,
    ) {
        self.dry_runs.write().await.insert(
            sql.to_string(),
            DryRunAnswer {
                result,
                latency: Duration::from_millis(latency_ms),
            },
        );
    }

    /// Calls made so far
    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            list_projects: self.counters.list_projects.load(Ordering::SeqCst),
            list_datasets: self.counters.list_datasets.load(Ordering::SeqCst),
            list_columns: self.counters.list_columns.load(Ordering::SeqCst),
            dry_run: self.counters.dry_run.load(Ordering::SeqCst),
        }
    }

    /// `(project, dataset)` pairs whose columns were requested
    pub fn column_requests(&self) -> Vec<(String, String)> {
        self.column_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn error_for(&self, scope: &Scope) -> Option<RemoteError> {
        self.errors.read().await.get(scope).cloned()
    }
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteDirectory for MockDirectory {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        self.counters.list_projects.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.error_for(&Scope::Projects).await {
            return Err(error);
        }
        Ok(self.projects.read().await.clone())
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<Dataset>, RemoteError> {
        self.counters.list_datasets.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.error_for(&Scope::datasets(project)).await {
            return Err(error);
        }
        Ok(self
            .datasets
            .read()
            .await
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_columns(&self, dataset: &Dataset, max_rows: usize) -> Result<Vec<Table>, RemoteError> {
        self.counters.list_columns.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.column_requests.lock() {
            requests.push((dataset.project.clone(), dataset.id.clone()));
        }
        self.simulate_latency().await;

        if let Some(error) = self.error_for(&Scope::columns(&dataset.project, &dataset.id)).await {
            return Err(error);
        }

        let tables = self.tables.read().await;
        let rows = tables
            .get(&(dataset.project.clone(), dataset.id.clone()))
            .map(|rows| rows.iter().take(max_rows).cloned().collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(Table::group_rows(&dataset.project, &dataset.id, rows))
    }

    async fn dry_run(&self, sql: &str) -> Result<DryRunResult, RemoteError> {
        self.counters.dry_run.fetch_add(1, Ordering::SeqCst);

        let answer = self.dry_runs.read().await.get(sql).cloned();
        match answer {
            Some(answer) => {
                if !answer.latency.is_zero() {
                    tokio::time::sleep(answer.latency).await;
                }
                answer.result
            }
            None => self.default_dry_run.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_configured_hierarchy() {
        let directory = MockDirectory::new();
        directory.add_project(Project::new("p")).await;
        directory.add_dataset(Dataset::new("p", "d", "US")).await;
        directory
            .add_table("p", "d", "t_20210101", vec![Column::new("id", "INT64")])
            .await;

        assert_eq!(directory.list_projects().await.unwrap(), vec![Project::new("p")]);

        let datasets = directory.list_datasets("p").await.unwrap();
        assert_eq!(datasets.len(), 1);

        let tables = directory.list_columns(&datasets[0], 10_000).await.unwrap();
        assert_eq!(tables[0].id, "t_*");

        assert_eq!(
            directory.call_counts(),
            CallCounts {
                list_projects: 1,
                list_datasets: 1,
                list_columns: 1,
                dry_run: 0,
            }
        );
        assert_eq!(directory.column_requests(), vec![("p".to_string(), "d".to_string())]);
    }

    #[tokio::test]
    async fn unknown_project_has_no_datasets() {
        let directory = MockDirectory::new();
        assert!(directory.list_datasets("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scoped_failures() {
        let directory = MockDirectory::new();
        directory
            .fail_columns("p", "b", RemoteError::Unavailable("down".into()))
            .await;

        let a = Dataset::new("p", "a", "US");
        let b = Dataset::new("p", "b", "US");
        assert!(directory.list_columns(&a, 10).await.is_ok());
        assert_eq!(
            directory.list_columns(&b, 10).await,
            Err(RemoteError::Unavailable("down".into()))
        );

        directory.clear_errors().await;
        assert!(directory.list_columns(&b, 10).await.is_ok());
    }

    #[tokio::test]
    async fn row_cap_is_applied() {
        let directory = MockDirectory::new();
        let columns = (0..5).map(|i| Column::new(format!("c{}", i), "INT64")).collect();
        directory.add_table("p", "d", "wide", columns).await;

        let tables = directory
            .list_columns(&Dataset::new("p", "d", "US"), 3)
            .await
            .unwrap();
        assert_eq!(tables[0].columns.len(), 3);
    }

    #[tokio::test]
    async fn canned_and_default_dry_runs() {
        let directory = MockDirectory::new()
            .with_default_dry_run(Ok(DryRunResult::with_bytes(42)));
        directory
            .add_dry_run("SELECT 1;;", Err(RemoteError::Rejected("Syntax error at [1:10]".into())))
            .await;

        assert!(directory.dry_run("SELECT 1;;").await.is_err());
        assert_eq!(directory.dry_run("SELECT 2").await, Ok(DryRunResult::with_bytes(42)));
        assert_eq!(directory.call_counts().dry_run, 2);
    }
}
