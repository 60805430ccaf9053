//! bqmirror Language Server Protocol implementation
//!
//! Keeps the local schema mirror fresh while SQL files are edited and turns
//! warehouse dry runs into inline diagnostics.
//!
//! ## Features
//!
//! - **Refresh**: the mirror is refreshed when a document is opened or saved,
//!   fetching columns only for datasets the open documents mention
//! - **Diagnostics**: every save dry-runs the document and publishes the
//!   error, if any, on the offending token
//! - **Cost**: the estimated bytes processed are sent as a `bqmirror/cost`
//!   notification
//! - **Commands**: `bqmirror.clearCache`, `bqmirror.updateCache`, `bqmirror.dryRun`
//!
//! ## Usage
//!
//! ```bash
//! bqmirror-lsp
//! ```
//!
//! Settings are read from `bqmirror.toml` at the workspace root.

mod backend;
pub mod commands;

pub use backend::{to_lsp_diagnostic, Backend, CostNotification, CostParams};
pub use commands::Command;
