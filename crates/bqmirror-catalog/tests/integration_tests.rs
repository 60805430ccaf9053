//! Integration tests for remote directories
//!
//! Mock and parsing tests need no credentials. Tests against a real `bq`
//! installation are marked `#[ignore]`:
//!
//! ```bash
//! # Run all non-ignored tests
//! cargo test -p bqmirror-catalog --test integration_tests
//!
//! # Run against an authenticated bq CLI
//! BQMIRROR_PROJECT=my-project cargo test -p bqmirror-catalog --test integration_tests -- --ignored
//! ```

mod fixtures;

use bqmirror_catalog::cli::{parse_column_rows, parse_datasets, parse_dry_run, parse_projects};
use bqmirror_catalog::{with_timeout, BqCliDirectory, DryRunResult, RemoteDirectory, RemoteError};
use bqmirror_core::{Dataset, Project};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Mock Directory Tests (No credentials required)
// =============================================================================

#[tokio::test]
async fn test_mock_directory_walks_hierarchy() {
    let directory = fixtures::warehouse().await;

    let projects = directory.list_projects().await.unwrap();
    assert_eq!(
        projects,
        vec![Project::new("acme-prod"), Project::new("acme-sandbox")]
    );

    let datasets = directory.list_datasets("acme-prod").await.unwrap();
    assert_eq!(datasets.len(), 2);
    assert_eq!(datasets[0].location, "EU");

    assert!(directory.list_datasets("acme-sandbox").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mock_directory_folds_date_shards() {
    let directory = fixtures::warehouse().await;
    let analytics = Dataset::new("acme-prod", "analytics", "EU");

    let tables = directory.list_columns(&analytics, 10_000).await.unwrap();
    let ids: Vec<&str> = tables.iter().map(|t| t.id.as_str()).collect();

    assert_eq!(ids, vec!["events_*", "users"]);
    assert_eq!(tables[0].columns, fixtures::events_columns());
}

#[tokio::test]
async fn test_mock_directory_behind_trait_object() {
    let directory: Arc<dyn RemoteDirectory> = Arc::new(fixtures::warehouse().await);
    assert_eq!(directory.name(), "Mock");
    assert_eq!(directory.dry_run("SELECT 1;").await, Ok(DryRunResult::with_bytes(0)));
}

#[tokio::test]
async fn test_mock_directory_project_failure() {
    let directory = fixtures::warehouse().await;
    directory
        .fail_projects(RemoteError::Authentication("token expired".into()))
        .await;

    let result = directory.list_projects().await;
    assert!(matches!(result, Err(RemoteError::Authentication(_))));
}

#[tokio::test]
async fn test_latency_with_timeout() {
    let directory = fixtures::warehouse().await.with_latency(200);

    let result = with_timeout(Duration::from_millis(20), directory.list_projects()).await;
    assert_eq!(result, Err(RemoteError::Timeout(Duration::from_millis(20))));
}

#[tokio::test]
async fn test_rejected_dry_run_keeps_message() {
    let directory = fixtures::warehouse().await;
    let message = "Syntax error: Unexpected \";\" at [1:10]";
    directory
        .add_dry_run("SELECT 1;;", Err(RemoteError::Rejected(message.into())))
        .await;

    let error = directory.dry_run("SELECT 1;;").await.unwrap_err();
    assert!(error.is_validation());
    assert_eq!(error.to_string(), message);
}

// =============================================================================
// bq CLI output parsing
// =============================================================================

#[test]
fn test_parse_cli_projects() {
    let projects = parse_projects(fixtures::BQ_PROJECTS_JSON).unwrap();
    assert_eq!(
        projects,
        vec![Project::new("acme-prod"), Project::new("acme-sandbox")]
    );
}

#[test]
fn test_parse_cli_datasets_preserves_location() {
    let datasets = parse_datasets("acme-prod", fixtures::BQ_DATASETS_JSON).unwrap();
    assert_eq!(
        datasets,
        vec![
            Dataset::new("acme-prod", "analytics", "EU"),
            Dataset::new("acme-prod", "staging", "US"),
        ]
    );
}

#[test]
fn test_parse_cli_columns() {
    let dataset = Dataset::new("acme-prod", "analytics", "EU");
    let tables = parse_column_rows(&dataset, fixtures::BQ_COLUMNS_JSON).unwrap();

    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].id, "events_*");
    assert_eq!(tables[0].project, "acme-prod");
    assert_eq!(tables[0].dataset, "analytics");
    assert_eq!(tables[1].columns.len(), 2);
}

#[test]
fn test_parse_cli_dry_run() {
    let result = parse_dry_run(fixtures::BQ_DRY_RUN_JSON).unwrap();
    assert_eq!(result.processed_bytes, Some(1024 * 1024 * 1024));
}

// =============================================================================
// Real bq CLI (requires an authenticated Google Cloud SDK)
// =============================================================================

#[tokio::test]
#[ignore = "requires an authenticated bq CLI"]
async fn test_bq_cli_lists_datasets() {
    let project = std::env::var("BQMIRROR_PROJECT").expect("BQMIRROR_PROJECT not set");
    let directory = BqCliDirectory::new("bq");

    let datasets = directory.list_datasets(&project).await.unwrap();
    assert!(datasets.iter().all(|d| d.project == project));
}

#[tokio::test]
#[ignore = "requires an authenticated bq CLI"]
async fn test_bq_cli_dry_run_rejects_bad_sql() {
    let directory = BqCliDirectory::new("bq");

    let result = directory.dry_run("SELECT 1;;").await;
    match result {
        Err(RemoteError::Rejected(message)) => assert!(message.contains("[1:")),
        other => panic!("expected a rejected query, got {:?}", other),
    }
}
