//! Remote directory backed by the `bq` command-line tool
//!
//! Every call spawns `bq` with `--format=json` and parses its stdout. The
//! child is killed if the calling future is dropped (for example when a
//! timeout expires).
//!
//! ## Usage
//!
//! ```rust,ignore
//! let directory = BqCliDirectory::new("bq");
//! let projects = directory.list_projects().await?;
//! ```

use crate::adapter::{columns_query, DryRunResult, RemoteDirectory, RemoteError};
use bqmirror_core::{Column, Dataset, Project, Table};
use serde::Deserialize;
use serde_json::Value;
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::debug;

/// Upper bound passed to `bq ls --max_results`
const LIST_LIMIT: &str = "100000";

/// Prefix `bq` puts in front of query validation failures
const QUERY_ERROR_PREFIX: &str = "Error in query string:";

/// Marker in `bq` failures raised while running a query job
const QUERY_OPERATION_MARKER: &str = "error in query operation";

/// `bq` command-line directory
pub struct BqCliDirectory {
    /// Executable to run
    bq_path: String,
}

impl BqCliDirectory {
    pub fn new(bq_path: impl Into<String>) -> Self {
        Self {
            bq_path: bq_path.into(),
        }
    }

    /// Run `bq` and return stdout, or the failure text on a non-zero exit
    async fn run(&self, args: &[String]) -> Result<String, CliFailure> {
        debug!(bq = %self.bq_path, ?args, "running bq");

        let output = Command::new(&self.bq_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CliFailure::Spawn(RemoteError::Config(format!(
                    "'{}' not found. Install the Google Cloud SDK or set remote.bq_path",
                    self.bq_path
                ))),
                _ => CliFailure::Spawn(RemoteError::Unavailable(e.to_string())),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // bq reports most failures on stdout
            let text = if stdout.trim().is_empty() { stderr.trim() } else { stdout.trim() };
            Err(CliFailure::Exit(text.to_string()))
        }
    }

    async fn run_listing(&self, args: &[String]) -> Result<String, RemoteError> {
        self.run(args).await.map_err(|failure| match failure {
            CliFailure::Spawn(e) => e,
            CliFailure::Exit(text) => classify_failure(&text),
        })
    }
}

enum CliFailure {
    /// The process could not be started
    Spawn(RemoteError),

    /// The process exited with a failure status
    Exit(String),
}

#[async_trait::async_trait]
impl RemoteDirectory for BqCliDirectory {
    fn name(&self) -> &'static str {
        "bq-cli"
    }

    async fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        let args = vec![
            "ls".to_string(),
            "--projects".to_string(),
            "--format=json".to_string(),
            format!("--max_results={}", LIST_LIMIT),
        ];
        let stdout = self.run_listing(&args).await?;
        parse_projects(&stdout)
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<Dataset>, RemoteError> {
        let args = vec![
            "ls".to_string(),
            "--datasets".to_string(),
            "--format=json".to_string(),
            format!("--max_results={}", LIST_LIMIT),
            format!("--project_id={}", project),
        ];
        let stdout = self.run_listing(&args).await?;
        parse_datasets(project, &stdout)
    }

    async fn list_columns(&self, dataset: &Dataset, max_rows: usize) -> Result<Vec<Table>, RemoteError> {
        let query = columns_query(dataset, max_rows)?;
        let mut args = vec![
            "query".to_string(),
            "--nouse_legacy_sql".to_string(),
            "--format=json".to_string(),
            format!("--max_rows={}", max_rows),
            format!("--project_id={}", dataset.project),
        ];
        if !dataset.location.is_empty() {
            args.push(format!("--location={}", dataset.location));
        }
        args.push("--".to_string());
        args.push(query);

        let stdout = self.run_listing(&args).await?;
        parse_column_rows(dataset, &stdout)
    }

    async fn dry_run(&self, sql: &str) -> Result<DryRunResult, RemoteError> {
        let args = vec![
            "query".to_string(),
            "--nouse_legacy_sql".to_string(),
            "--dry_run".to_string(),
            "--format=json".to_string(),
            // Ends flag parsing; SQL may start with a `--` comment
            "--".to_string(),
            sql.to_string(),
        ];

        match self.run(&args).await {
            Ok(stdout) => parse_dry_run(&stdout),
            Err(CliFailure::Spawn(e)) => Err(e),
            Err(CliFailure::Exit(text)) => Err(classify_dry_run_failure(&text)),
        }
    }
}

/// Map a failed `bq query --dry_run` onto the error taxonomy
///
/// Anything the warehouse reports against the query itself (a bad reference,
/// a syntax error) is a rejection; the prefix `bq` adds is dropped.
fn classify_dry_run_failure(text: &str) -> RemoteError {
    if let Some(at) = text.find(QUERY_ERROR_PREFIX) {
        return RemoteError::Rejected(text[at + QUERY_ERROR_PREFIX.len()..].trim().to_string());
    }
    if let Some(at) = text.find(QUERY_OPERATION_MARKER) {
        let rest = &text[at + QUERY_OPERATION_MARKER.len()..];
        let message = rest.strip_prefix(':').unwrap_or(rest).trim();
        if !message.is_empty() {
            return RemoteError::Rejected(message.to_string());
        }
    }
    classify_failure(text)
}

/// Map `bq` failure text onto the error taxonomy
fn classify_failure(text: &str) -> RemoteError {
    let lower = text.to_lowercase();
    if lower.contains("access denied") || lower.contains("permission") {
        RemoteError::PermissionDenied(text.to_string())
    } else if lower.contains("not found") {
        RemoteError::NotFound(text.to_string())
    } else if lower.contains("credential") || lower.contains("gcloud auth") {
        RemoteError::Authentication(text.to_string())
    } else {
        RemoteError::Unavailable(text.to_string())
    }
}

fn parse_json(stdout: &str) -> Result<Value, RemoteError> {
    // `bq ls` prints nothing at all for an empty listing
    if stdout.trim().is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    serde_json::from_str(stdout).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
}

fn as_items(value: &Value) -> Result<&Vec<Value>, RemoteError> {
    value
        .as_array()
        .ok_or_else(|| RemoteError::MalformedResponse(format!("expected a JSON array, got {}", value)))
}

/// Extract projects from `bq ls --projects` output (or an API project list)
pub fn parse_projects(stdout: &str) -> Result<Vec<Project>, RemoteError> {
    project_items(&parse_json(stdout)?)
}

pub(crate) fn project_items(value: &Value) -> Result<Vec<Project>, RemoteError> {
    as_items(value)?
        .iter()
        .map(|item| {
            item.pointer("/projectReference/projectId")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .map(Project::new)
                .ok_or_else(|| RemoteError::MalformedResponse(format!("project without id: {}", item)))
        })
        .collect()
}

/// Extract datasets from `bq ls --datasets` output (or an API dataset list)
pub fn parse_datasets(project: &str, stdout: &str) -> Result<Vec<Dataset>, RemoteError> {
    dataset_items(project, &parse_json(stdout)?)
}

pub(crate) fn dataset_items(project: &str, value: &Value) -> Result<Vec<Dataset>, RemoteError> {
    as_items(value)?
        .iter()
        .map(|item| -> Result<Dataset, RemoteError> {
            let id = item
                .pointer("/datasetReference/datasetId")
                .and_then(Value::as_str)
                .ok_or_else(|| RemoteError::MalformedResponse(format!("dataset without id: {}", item)))?;
            let owner = item
                .pointer("/datasetReference/projectId")
                .and_then(Value::as_str)
                .unwrap_or(project);
            let location = item.get("location").and_then(Value::as_str).unwrap_or_default();
            Ok(Dataset::new(owner, id, location))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ColumnRow {
    table_id: String,
    column_name: String,
    data_type: String,
}

/// Group the rows of [`columns_query`] into tables
pub fn parse_column_rows(dataset: &Dataset, stdout: &str) -> Result<Vec<Table>, RemoteError> {
    let value = parse_json(stdout)?;
    let rows: Vec<ColumnRow> =
        serde_json::from_value(value).map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

    Ok(Table::group_rows(
        &dataset.project,
        &dataset.id,
        rows.into_iter()
            .map(|row| (row.table_id, Column::new(row.column_name, row.data_type))),
    ))
}

/// Read the byte estimate out of a dry-run job description
pub fn parse_dry_run(stdout: &str) -> Result<DryRunResult, RemoteError> {
    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

    let bytes = value
        .pointer("/statistics/totalBytesProcessed")
        .or_else(|| value.pointer("/statistics/query/totalBytesProcessed"))
        .or_else(|| value.get("totalBytesProcessed"))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        });

    Ok(DryRunResult {
        processed_bytes: bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_project_listing() {
        let stdout = r#"[
            {"friendlyName": "Main", "id": "main-proj", "numericId": "1",
             "projectReference": {"projectId": "main-proj"}},
            {"id": "legacy-proj"}
        ]"#;

        let projects = parse_projects(stdout).unwrap();
        assert_eq!(projects, vec![Project::new("main-proj"), Project::new("legacy-proj")]);
    }

    #[test]
    fn empty_listing_is_empty() {
        assert!(parse_projects("").unwrap().is_empty());
        assert!(parse_datasets("p", "  \n").unwrap().is_empty());
    }

    #[test]
    fn parses_dataset_listing_with_location() {
        let stdout = r#"[
            {"datasetReference": {"datasetId": "analytics", "projectId": "p"},
             "id": "p:analytics", "kind": "bigquery#dataset", "location": "EU"},
            {"datasetReference": {"datasetId": "raw"}, "location": "US"}
        ]"#;

        let datasets = parse_datasets("p", stdout).unwrap();
        assert_eq!(
            datasets,
            vec![Dataset::new("p", "analytics", "EU"), Dataset::new("p", "raw", "US")]
        );
    }

    #[test]
    fn malformed_listing_is_reported() {
        assert!(matches!(parse_projects("{not json"), Err(RemoteError::MalformedResponse(_))));
        assert!(matches!(parse_projects(r#"{"a": 1}"#), Err(RemoteError::MalformedResponse(_))));
        assert!(matches!(
            parse_datasets("p", r#"[{"location": "US"}]"#),
            Err(RemoteError::MalformedResponse(_))
        ));
    }

    #[test]
    fn groups_column_rows() {
        let dataset = Dataset::new("p", "d", "US");
        let stdout = r#"[
            {"table_id": "t_*", "column_name": "id", "data_type": "INT64", "ordinal": "1"},
            {"table_id": "t_*", "column_name": "payload", "data_type": "STRUCT<a INT64>", "ordinal": "2"},
            {"table_id": "users", "column_name": "email", "data_type": "STRING", "ordinal": "1"}
        ]"#;

        let tables = parse_column_rows(&dataset, stdout).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].id, "t_*");
        assert_eq!(tables[0].columns[1], Column::new("payload", "STRUCT<a INT64>"));
        assert_eq!(tables[1].id, "users");
    }

    #[test]
    fn parses_dry_run_bytes() {
        let stdout = r#"{"statistics": {"totalBytesProcessed": "1536", "query": {}}}"#;
        assert_eq!(parse_dry_run(stdout).unwrap(), DryRunResult::with_bytes(1536));

        let missing = r#"{"statistics": {}}"#;
        assert_eq!(parse_dry_run(missing).unwrap().processed_bytes, None);
    }

    #[test]
    fn classifies_failures() {
        assert!(matches!(
            classify_failure("Access Denied: Project p: User does not have permission"),
            RemoteError::PermissionDenied(_)
        ));
        assert!(matches!(classify_failure("Not found: Dataset p:d"), RemoteError::NotFound(_)));
        assert!(matches!(
            classify_failure("You do not currently have an active account selected. Run gcloud auth login"),
            RemoteError::Authentication(_)
        ));
        assert!(matches!(classify_failure("connection reset"), RemoteError::Unavailable(_)));
    }

    #[test]
    fn dry_run_failures_against_the_query_are_rejections() {
        let error = classify_dry_run_failure(
            "BigQuery error in query operation: Not found: Dataset p:d was not found in location US",
        );
        assert!(error.is_validation());
        assert_eq!(error.to_string(), "Not found: Dataset p:d was not found in location US");

        let syntax = classify_dry_run_failure("Error in query string: Syntax error: Unexpected \";\" at [1:10]");
        assert!(matches!(syntax, RemoteError::Rejected(m) if m == "Syntax error: Unexpected \";\" at [1:10]"));

        assert!(matches!(
            classify_dry_run_failure("Not found: Project p"),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            classify_dry_run_failure("Run gcloud auth login"),
            RemoteError::Authentication(_)
        ));
    }

    /// Writes an executable stand-in for `bq` that records its argv and
    /// prints `stdout`
    #[cfg(unix)]
    fn fake_bq(dir: &tempfile::TempDir, stdout: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.path().join("bq");
        let body = format!(
            "#!/bin/sh\nprintf '%s\\0' \"$@\" > '{}'\ncat <<'JSON'\n{}\nJSON\n",
            dir.path().join("argv").display(),
            stdout
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn recorded_argv(dir: &tempfile::TempDir) -> Vec<String> {
        let raw = std::fs::read(dir.path().join("argv")).unwrap();
        raw.split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dry_run_passes_comment_led_sql_after_flag_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_bq(&dir, r#"{"statistics": {"totalBytesProcessed": "10"}}"#);
        let directory = BqCliDirectory::new(script.display().to_string());

        let sql = "-- daily report\nSELECT 1";
        let result = directory.dry_run(sql).await.unwrap();
        assert_eq!(result, DryRunResult::with_bytes(10));

        let argv = recorded_argv(&dir);
        assert_eq!(argv.last().map(String::as_str), Some(sql));
        assert_eq!(argv[argv.len() - 2], "--");
        assert!(argv.contains(&"--dry_run".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn column_query_follows_flag_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_bq(&dir, "[]");
        let directory = BqCliDirectory::new(script.display().to_string());

        let tables = directory
            .list_columns(&Dataset::new("p", "d", "EU"), 50)
            .await
            .unwrap();
        assert!(tables.is_empty());

        let argv = recorded_argv(&dir);
        let terminator = argv.iter().position(|arg| arg == "--").unwrap();
        assert_eq!(terminator, argv.len() - 2);
        assert!(argv[..terminator].contains(&"--location=EU".to_string()));
        assert!(argv[terminator + 1].contains("INFORMATION_SCHEMA.COLUMNS"));
    }

    #[tokio::test]
    async fn missing_executable_is_a_config_error() {
        let directory = BqCliDirectory::new("/nonexistent/bq-binary");
        let result = directory.list_projects().await;
        assert!(matches!(result, Err(RemoteError::Config(_))));
    }
}
