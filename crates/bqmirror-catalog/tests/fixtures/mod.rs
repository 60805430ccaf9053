//! Test fixtures for remote directory integration tests
//!
//! A small warehouse with two projects, a date-sharded events table, and
//! canned `bq` JSON outputs matching what the CLI prints.

#![allow(dead_code)]

use bqmirror_catalog::MockDirectory;
use bqmirror_core::{Column, Dataset, Project};

/// Columns of a daily events shard
pub fn events_columns() -> Vec<Column> {
    vec![
        Column::new("event_id", "STRING"),
        Column::new("user_id", "INT64"),
        Column::new("payload", "STRUCT<name STRING, value FLOAT64>"),
        Column::new("tags", "ARRAY<STRING>"),
    ]
}

/// Columns of a users table
pub fn users_columns() -> Vec<Column> {
    vec![
        Column::new("id", "INT64"),
        Column::new("email", "STRING"),
        Column::new("created_at", "TIMESTAMP"),
    ]
}

/// Mock directory populated with:
/// - `acme-prod`: `analytics` (EU) with `events_20240101`, `events_20240102`, `users`
/// - `acme-prod`: `staging` (US) with `users`
/// - `acme-sandbox`: no datasets
pub async fn warehouse() -> MockDirectory {
    let directory = MockDirectory::new();

    directory.add_project(Project::new("acme-prod")).await;
    directory.add_project(Project::new("acme-sandbox")).await;

    directory.add_dataset(Dataset::new("acme-prod", "analytics", "EU")).await;
    directory.add_dataset(Dataset::new("acme-prod", "staging", "US")).await;

    directory
        .add_table("acme-prod", "analytics", "events_20240101", events_columns())
        .await;
    directory
        .add_table("acme-prod", "analytics", "events_20240102", events_columns())
        .await;
    directory
        .add_table("acme-prod", "analytics", "users", users_columns())
        .await;
    directory
        .add_table("acme-prod", "staging", "users", users_columns())
        .await;

    directory
}

/// `bq ls --projects --format=json`
pub const BQ_PROJECTS_JSON: &str = r#"[
  {"friendlyName": "Acme Prod", "id": "acme-prod", "kind": "bigquery#project",
   "numericId": "111", "projectReference": {"projectId": "acme-prod"}},
  {"friendlyName": "Acme Sandbox", "id": "acme-sandbox", "kind": "bigquery#project",
   "numericId": "222", "projectReference": {"projectId": "acme-sandbox"}}
]"#;

/// `bq ls --datasets --format=json --project_id=acme-prod`
pub const BQ_DATASETS_JSON: &str = r#"[
  {"datasetReference": {"datasetId": "analytics", "projectId": "acme-prod"},
   "id": "acme-prod:analytics", "kind": "bigquery#dataset", "location": "EU"},
  {"datasetReference": {"datasetId": "staging", "projectId": "acme-prod"},
   "id": "acme-prod:staging", "kind": "bigquery#dataset", "location": "US"}
]"#;

/// `bq query --format=json` over the grouped columns query
pub const BQ_COLUMNS_JSON: &str = r#"[
  {"table_id": "events_*", "column_name": "event_id", "data_type": "STRING", "ordinal": "1"},
  {"table_id": "events_*", "column_name": "user_id", "data_type": "INT64", "ordinal": "2"},
  {"table_id": "users", "column_name": "id", "data_type": "INT64", "ordinal": "1"},
  {"table_id": "users", "column_name": "email", "data_type": "STRING", "ordinal": "2"}
]"#;

/// `bq query --dry_run --format=json`
pub const BQ_DRY_RUN_JSON: &str = r#"{
  "configuration": {"dryRun": true, "query": {"query": "SELECT 1", "useLegacySql": false}},
  "jobReference": {"location": "US", "projectId": "acme-prod"},
  "statistics": {"query": {"totalBytesProcessed": "1073741824"}, "totalBytesProcessed": "1073741824"},
  "status": {"state": "DONE"}
}"#;
