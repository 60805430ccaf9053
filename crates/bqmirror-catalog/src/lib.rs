//! Remote directories for warehouse metadata
//!
//! A remote directory lists projects and datasets, reads table/column metadata
//! from `INFORMATION_SCHEMA.COLUMNS`, and dry-runs SQL for validation.
//!
//! ## Implementations
//!
//! - [`BqCliDirectory`] - shells out to the `bq` command-line tool (default)
//! - [`BigQueryDirectory`] - BigQuery REST API, enabled with the `bigquery` feature
//! - [`MockDirectory`] - in-memory fake for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use bqmirror_catalog::{BqCliDirectory, RemoteDirectory};
//!
//! let directory = BqCliDirectory::new("bq");
//! for project in directory.list_projects().await? {
//!     let datasets = directory.list_datasets(&project.id).await?;
//! }
//! ```

pub mod adapter;
pub mod bigquery;
pub mod cli;
pub mod mock;

pub use adapter::{columns_query, with_timeout, DryRunResult, RemoteDirectory, RemoteError};
pub use bigquery::BigQueryDirectory;
pub use cli::BqCliDirectory;
pub use mock::{CallCounts, MockDirectory};
