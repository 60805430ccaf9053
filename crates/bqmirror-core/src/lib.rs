//! bqmirror core
//!
//! Domain model shared by every bqmirror crate: the mirrored warehouse
//! hierarchy, source tokens, editor diagnostics, refresh reports and the
//! `bqmirror.toml` configuration.

pub mod config;
pub mod diagnostic;
pub mod model;
pub mod report;

pub use config::{CacheConfig, Config, ConfigError, DiagnosticsConfig, RemoteBackend, RemoteConfig};
pub use diagnostic::{Diagnostic, Position, Range, Severity};
pub use model::{fold_shard_suffix, Column, Dataset, Project, Scope, Table, Token};
pub use report::{RefreshReport, ScopeFailure};
