//! Dry-run validation turned into editor diagnostics
//!
//! A document is submitted to the warehouse as a dry run. A successful run
//! yields a byte-cost label and no diagnostics. A failed run yields exactly
//! one error diagnostic, placed on the token the error message points at or,
//! when that cannot be resolved, on the whole document.

use crate::bytes::format_bytes;
use crate::locator::{BracketLocator, ErrorLocator};
use crate::position::map_error_location;
use bqmirror_catalog::{with_timeout, RemoteDirectory, RemoteError};
use bqmirror_core::{Config, Diagnostic, Range};
use bqmirror_sql::Tokenizer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Cost label reported for a failed dry run
pub const ERROR_COST_LABEL: &str = "ERROR";

/// Outcome of validating one document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Formatted byte estimate, the unknown-cost label, or [`ERROR_COST_LABEL`]
    pub cost_label: String,

    /// Zero diagnostics on success, exactly one on failure
    pub diagnostics: Vec<Diagnostic>,
}

impl Validation {
    pub fn is_error(&self) -> bool {
        self.cost_label == ERROR_COST_LABEL
    }
}

/// Runs dry runs and maps their failures onto document ranges
pub struct DiagnosticEngine {
    directory: Arc<dyn RemoteDirectory>,
    tokenizer: Arc<dyn Tokenizer>,
    locator: Arc<dyn ErrorLocator>,
    timeout: Duration,
    unknown_cost_label: String,

    /// Source of request ids
    next_request: AtomicU64,

    /// Latest request id per document
    latest: Mutex<HashMap<String, u64>>,
}

impl DiagnosticEngine {
    /// Create an engine with the bracket locator and default settings
    pub fn new(directory: Arc<dyn RemoteDirectory>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        let defaults = Config::default();
        Self {
            directory,
            tokenizer,
            locator: Arc::new(BracketLocator),
            timeout: defaults.remote.timeout(),
            unknown_cost_label: defaults.diagnostics.unknown_cost_label,
            next_request: AtomicU64::new(0),
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Create an engine using the timeout and labels from `config`
    pub fn from_config(
        directory: Arc<dyn RemoteDirectory>,
        tokenizer: Arc<dyn Tokenizer>,
        config: &Config,
    ) -> Self {
        Self::new(directory, tokenizer)
            .with_timeout(config.remote.timeout())
            .with_unknown_cost_label(config.diagnostics.unknown_cost_label.clone())
    }

    pub fn with_locator(mut self, locator: Arc<dyn ErrorLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_unknown_cost_label(mut self, label: impl Into<String>) -> Self {
        self.unknown_cost_label = label.into();
        self
    }

    /// Validate `text` on behalf of `document`
    ///
    /// Returns `None` when a newer validation for the same document was
    /// started while this one was in flight; the stale result is dropped.
    pub async fn validate(&self, document: &str, text: &str) -> Option<Validation> {
        let request = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert(document.to_string(), request);
        }

        let validation = self.validate_text(text).await;

        let current = self
            .latest
            .lock()
            .ok()
            .and_then(|latest| latest.get(document).copied());
        if current != Some(request) {
            debug!(document, request, ?current, "discarding stale validation");
            return None;
        }
        Some(validation)
    }

    /// Stop tracking a closed document
    pub fn forget(&self, document: &str) {
        if let Ok(mut latest) = self.latest.lock() {
            latest.remove(document);
        }
    }

    /// Validate `text` without stale-result tracking
    pub async fn validate_text(&self, text: &str) -> Validation {
        match with_timeout(self.timeout, self.directory.dry_run(text)).await {
            Ok(result) => Validation {
                cost_label: result
                    .processed_bytes
                    .map(format_bytes)
                    .unwrap_or_else(|| self.unknown_cost_label.clone()),
                diagnostics: Vec::new(),
            },
            Err(error) => {
                if !error.is_validation() {
                    warn!(directory = self.directory.name(), %error, "dry run failed");
                }
                Validation {
                    cost_label: ERROR_COST_LABEL.to_string(),
                    diagnostics: vec![self.diagnose(text, &error)],
                }
            }
        }
    }

    /// Build the single diagnostic for a failed dry run
    pub fn diagnose(&self, text: &str, error: &RemoteError) -> Diagnostic {
        let message = error.to_string();
        let range = self
            .locate(text, &message)
            .unwrap_or_else(|| Range::whole_document(text));
        Diagnostic::error(range, message)
    }

    fn locate(&self, text: &str, message: &str) -> Option<Range> {
        let (row, col) = self.locator.locate(message)?;
        let tokens = match self.tokenizer.tokenize(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "tokenizing failed, using whole document");
                return None;
            }
        };
        map_error_location(text, &tokens, row, col)
    }
}
