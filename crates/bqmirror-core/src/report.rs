//! Refresh cycle report

use serde::{Deserialize, Serialize};
use crate::model::Scope;

/// A scope that could not be refreshed during a cycle
///
/// The cached rows of a failed scope are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFailure {
    /// The scope that was skipped
    pub scope: Scope,

    /// Error message from the remote call or the store
    pub message: String,
}

/// Summary of one refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Cycle start (ISO 8601)
    pub started_at: String,

    /// Cycle end (ISO 8601), set by [`RefreshReport::finish`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    /// Number of projects written
    pub projects: usize,

    /// Number of projects whose dataset list was replaced
    pub dataset_scopes: usize,

    /// Number of datasets whose tables were replaced
    pub column_scopes: usize,

    /// Number of tables written across all column scopes
    pub tables: usize,

    /// Datasets skipped because no open document mentions them
    pub datasets_not_referenced: usize,

    /// Scopes skipped because of an error
    pub failures: Vec<ScopeFailure>,
}

impl RefreshReport {
    /// Start a new report stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            projects: 0,
            dataset_scopes: 0,
            column_scopes: 0,
            tables: 0,
            datasets_not_referenced: 0,
            failures: Vec::new(),
        }
    }

    /// Record a skipped scope
    pub fn add_failure(&mut self, scope: Scope, message: impl Into<String>) {
        self.failures.push(ScopeFailure {
            scope,
            message: message.into(),
        });
    }

    /// Stamp the end time
    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Whether any scope failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for RefreshReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report() {
        let report = RefreshReport::new();
        assert_eq!(report.projects, 0);
        assert!(report.finished_at.is_none());
        assert!(!report.has_failures());
    }

    #[test]
    fn report_with_failures() {
        let mut report = RefreshReport::new();
        report.add_failure(Scope::columns("p", "b"), "timed out");
        report.finish();

        assert!(report.has_failures());
        assert!(report.finished_at.is_some());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"columns\""));
        assert!(json.contains("timed out"));
    }
}
