//! BigQuery remote directory using the REST API
//!
//! Listing goes through the projects/datasets endpoints; column metadata is
//! read from `INFORMATION_SCHEMA.COLUMNS` with the query routed to the
//! dataset's location. Required IAM permissions:
//! - bigquery.datasets.get
//! - bigquery.tables.get
//! - bigquery.jobs.create (for queries and dry runs)
//!
//! ## Authentication
//!
//! 1. Service account JSON file (explicit path)
//! 2. Application Default Credentials (ADC)
//!
//! ## Usage
//!
//! ```rust,ignore
//! let directory = BigQueryDirectory::with_adc("billing-project").await?;
//! let datasets = directory.list_datasets("my-project").await?;
//! ```
//!
//! Reference: https://cloud.google.com/bigquery/docs/information-schema-columns

use crate::adapter::{DryRunResult, RemoteDirectory, RemoteError};
use bqmirror_core::{Dataset, Project, Table};

#[cfg(feature = "bigquery")]
use crate::adapter::columns_query;
#[cfg(feature = "bigquery")]
use crate::cli::{dataset_items, project_items};
#[cfg(feature = "bigquery")]
use bqmirror_core::Column;
#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{
    error::BQError, model::query_request::QueryRequest, model::query_response::ResultSet,
    Client as BigQueryClient,
};

/// BigQuery REST directory
pub struct BigQueryDirectory {
    /// Project billed for queries and dry runs
    billing_project: String,

    /// BigQuery client (only available with bigquery feature)
    #[cfg(feature = "bigquery")]
    client: BigQueryClient,
}

impl BigQueryDirectory {
    /// Create a directory using Application Default Credentials (ADC)
    ///
    /// ADC automatically detects credentials from:
    /// - GOOGLE_APPLICATION_CREDENTIALS environment variable
    /// - gcloud CLI default credentials
    /// - GCE/GKE metadata service
    #[cfg(feature = "bigquery")]
    pub async fn with_adc(billing_project: impl Into<String>) -> Result<Self, RemoteError> {
        let client = BigQueryClient::from_application_default_credentials()
            .await
            .map_err(|e| RemoteError::Authentication(format!(
                "Failed to authenticate with ADC: {}. \
                 Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                e
            )))?;

        Ok(Self {
            billing_project: billing_project.into(),
            client,
        })
    }

    /// Create directory without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn with_adc(billing_project: impl Into<String>) -> Result<Self, RemoteError> {
        let _ = billing_project.into();
        Err(not_compiled())
    }

    /// Create a directory using a service account key file
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_file(
        billing_project: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, RemoteError> {
        let key_path_str = key_path.as_ref().to_string_lossy().to_string();

        let client = BigQueryClient::from_service_account_key_file(&key_path_str)
            .await
            .map_err(|e| RemoteError::Authentication(format!(
                "Failed to read service account key file '{}': {}",
                key_path_str, e
            )))?;

        Ok(Self {
            billing_project: billing_project.into(),
            client,
        })
    }

    /// Create directory without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_file(
        billing_project: impl Into<String>,
        _key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, RemoteError> {
        let _ = billing_project.into();
        Err(not_compiled())
    }

    /// Project billed for queries
    pub fn billing_project(&self) -> &str {
        &self.billing_project
    }
}

#[cfg(not(feature = "bigquery"))]
fn not_compiled() -> RemoteError {
    RemoteError::Config(
        "BigQuery API support not compiled. Rebuild with: cargo build --features bigquery".to_string(),
    )
}

/// Map a client error onto the error taxonomy
#[cfg(feature = "bigquery")]
fn classify(e: BQError) -> RemoteError {
    let message = match &e {
        BQError::ResponseError { error } => error.error.message.clone(),
        other => other.to_string(),
    };

    if message.contains("Not found") {
        RemoteError::NotFound(message)
    } else if message.contains("Access Denied") || message.contains("Permission") {
        RemoteError::PermissionDenied(message)
    } else {
        RemoteError::Unavailable(message)
    }
}

#[cfg(feature = "bigquery")]
fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::MalformedResponse(e.to_string()))
}

#[async_trait::async_trait]
impl RemoteDirectory for BigQueryDirectory {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    #[cfg(feature = "bigquery")]
    async fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        let list = self
            .client
            .project()
            .list(gcp_bigquery_client::project::GetOptions::default())
            .await
            .map_err(classify)?;

        let value = to_json(&list)?;
        match value.get("projects") {
            Some(items) => project_items(items),
            None => Ok(Vec::new()),
        }
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_projects(&self) -> Result<Vec<Project>, RemoteError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn list_datasets(&self, project: &str) -> Result<Vec<Dataset>, RemoteError> {
        let list = self
            .client
            .dataset()
            .list(project, gcp_bigquery_client::dataset::ListOptions::default().all(true))
            .await
            .map_err(classify)?;

        let value = to_json(&list)?;
        match value.get("datasets") {
            Some(items) => dataset_items(project, items),
            None => Ok(Vec::new()),
        }
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_datasets(&self, _project: &str) -> Result<Vec<Dataset>, RemoteError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn list_columns(&self, dataset: &Dataset, max_rows: usize) -> Result<Vec<Table>, RemoteError> {
        let mut request = QueryRequest::new(columns_query(dataset, max_rows)?);
        if !dataset.location.is_empty() {
            request.location = Some(dataset.location.clone());
        }
        request.max_results = Some(max_rows.min(i32::MAX as usize) as i32);

        let response = self
            .client
            .job()
            .query(&self.billing_project, request)
            .await
            .map_err(classify)?;

        let mut rows = Vec::new();
        let mut rs = ResultSet::new_from_query_response(response);
        while rs.next_row() {
            let get = |name: &str| -> Result<String, RemoteError> {
                rs.get_string_by_name(name)
                    .map_err(|e| RemoteError::MalformedResponse(format!("Failed to get {}: {}", name, e)))?
                    .ok_or_else(|| RemoteError::MalformedResponse(format!("{} is null", name)))
            };

            let table_id = get("table_id")?;
            let column = Column::new(get("column_name")?, get("data_type")?);
            rows.push((table_id, column));
        }

        Ok(Table::group_rows(&dataset.project, &dataset.id, rows))
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_columns(&self, _dataset: &Dataset, _max_rows: usize) -> Result<Vec<Table>, RemoteError> {
        Err(not_compiled())
    }

    #[cfg(feature = "bigquery")]
    async fn dry_run(&self, sql: &str) -> Result<DryRunResult, RemoteError> {
        let mut request = QueryRequest::new(sql.to_string());
        request.dry_run = Some(true);

        let response = self
            .client
            .job()
            .query(&self.billing_project, request)
            .await
            .map_err(|e| match e {
                BQError::ResponseError { error } => RemoteError::Rejected(error.error.message),
                other => classify(other),
            })?;

        Ok(DryRunResult {
            processed_bytes: response
                .total_bytes_processed
                .as_deref()
                .and_then(|b| b.parse().ok()),
        })
    }

    #[cfg(not(feature = "bigquery"))]
    async fn dry_run(&self, _sql: &str) -> Result<DryRunResult, RemoteError> {
        Err(not_compiled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(not(feature = "bigquery"))]
    async fn construction_requires_feature() {
        let result = BigQueryDirectory::with_adc("billing").await;
        assert!(matches!(result, Err(RemoteError::Config(_))));

        let result = BigQueryDirectory::from_service_account_file("billing", "/tmp/key.json").await;
        assert!(matches!(result, Err(RemoteError::Config(_))));
    }

    #[tokio::test]
    #[ignore = "requires BigQuery credentials"]
    #[cfg(feature = "bigquery")]
    async fn lists_projects_with_adc() {
        let project = std::env::var("BQMIRROR_BILLING_PROJECT").unwrap();
        let directory = BigQueryDirectory::with_adc(project).await.unwrap();
        let projects = directory.list_projects().await.unwrap();
        assert!(!projects.is_empty());
    }
}
