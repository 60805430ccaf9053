//! bqmirror engine - cache synchronization and dry-run diagnostics
//!
//! This crate implements the two workflows behind the editor integration:
//! - Schema refresh: walk projects, datasets and columns and replace each
//!   cached scope independently
//! - Dry-run validation: map warehouse error text onto token-aligned
//!   document ranges and format byte-cost estimates

pub mod bytes;
pub mod diagnostics;
pub mod fetcher;
pub mod locator;
pub mod position;
pub mod setup;

pub use bytes::format_bytes;
pub use diagnostics::{DiagnosticEngine, Validation, ERROR_COST_LABEL};
pub use fetcher::{is_referenced, FetchOptions, RefreshError, SchemaFetcher};
pub use locator::{BracketLocator, ErrorLocator};
pub use position::{error_offset, map_error_location, token_range};
pub use setup::{directory_from_config, open_store};
