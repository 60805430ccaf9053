//! LSP backend implementation for bqmirror
//!
//! Tracks open documents, refreshes the schema mirror on open/save and
//! publishes dry-run diagnostics on save.

use crate::commands::{self, Command};
use anyhow::Context;
use bqmirror_cache::CacheStore;
use bqmirror_core::{Config, Diagnostic as MirrorDiagnostic, Severity};
use bqmirror_engine::{directory_from_config, open_store, DiagnosticEngine, FetchOptions, SchemaFetcher};
use bqmirror_sql::SqlTokenizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, ExecuteCommandOptions,
    ExecuteCommandParams, InitializeParams, InitializeResult, InitializedParams, MessageType,
    Position, Range, SaveOptions, ServerCapabilities, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions, TextDocumentSyncSaveOptions, Url,
};
use tower_lsp::{Client, LanguageServer};

/// `bqmirror/cost` notification: the cost label of the last dry run
pub enum CostNotification {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostParams {
    pub uri: Url,

    /// Formatted byte estimate, or `ERROR`
    pub label: String,
}

impl Notification for CostNotification {
    type Params = CostParams;
    const METHOD: &'static str = "bqmirror/cost";
}

/// Collaborators built from the workspace configuration
struct Services {
    store: Arc<CacheStore>,
    fetcher: SchemaFetcher,
    engine: DiagnosticEngine,
}

impl Services {
    async fn build(config: &Config) -> anyhow::Result<Self> {
        let directory = directory_from_config(config)
            .await
            .context("failed to create remote directory")?;

        let store = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || open_store(&config))
                .await
                .context("cache open task failed")?
                .context("failed to open metadata cache")?
        };
        let store = Arc::new(store);

        let fetcher = SchemaFetcher::new(Arc::clone(&directory), Arc::clone(&store))
            .with_options(FetchOptions::from(&config.remote));
        let engine = DiagnosticEngine::from_config(directory, Arc::new(SqlTokenizer::bigquery()), config);

        Ok(Self {
            store,
            fetcher,
            engine,
        })
    }
}

/// LSP backend for bqmirror
pub struct Backend {
    /// LSP client for communicating with the editor
    client: Client,
    /// Currently open documents (URI -> text content)
    documents: Arc<RwLock<HashMap<Url, String>>>,
    /// Project root directory
    root_uri: Arc<RwLock<Option<Url>>>,
    /// Remote directory, store and engines; `None` until initialized or if setup failed
    services: Arc<RwLock<Option<Arc<Services>>>>,
}

impl Backend {
    /// Create a new LSP backend
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            root_uri: Arc::new(RwLock::new(None)),
            services: Arc::new(RwLock::new(None)),
        }
    }

    /// Load configuration from `bqmirror.toml` at the workspace root
    async fn load_config(&self) -> Config {
        let root_uri = self.root_uri.read().await;

        if let Some(root_path) = root_uri.as_ref().and_then(|u| u.to_file_path().ok()) {
            let config_path = root_path.join(Config::FILE_NAME);

            if config_path.exists() {
                match Config::from_file(&config_path) {
                    Ok(config) => {
                        self.client
                            .log_message(
                                MessageType::INFO,
                                format!("Loaded config from {}", config_path.display()),
                            )
                            .await;
                        return config;
                    }
                    Err(e) => {
                        self.client
                            .log_message(
                                MessageType::WARNING,
                                format!("Ignoring {}: {}", config_path.display(), e),
                            )
                            .await;
                    }
                }
            }
        }

        Config::default()
    }

    async fn services(&self) -> Option<Arc<Services>> {
        self.services.read().await.clone()
    }

    async fn open_texts(&self) -> Vec<String> {
        self.documents.read().await.values().cloned().collect()
    }

    /// Refresh the mirror in the background
    ///
    /// Cycles queue up behind the fetcher's own guard, so repeated saves
    /// never run two cycles at once.
    async fn spawn_refresh(&self) {
        let Some(services) = self.services().await else {
            return;
        };
        let texts = self.open_texts().await;
        let client = self.client.clone();

        tokio::spawn(async move {
            match services.fetcher.refresh(&texts).await {
                Ok(report) => {
                    for failure in &report.failures {
                        client
                            .log_message(
                                MessageType::WARNING,
                                format!("Skipped {}: {}", failure.scope, failure.message),
                            )
                            .await;
                    }
                }
                Err(e) => {
                    client
                        .log_message(MessageType::ERROR, format!("Schema refresh failed: {}", e))
                        .await;
                }
            }
        });
    }

    /// Dry-run an open document and publish the outcome
    async fn validate_document(&self, uri: &Url) {
        let Some(services) = self.services().await else {
            return;
        };
        let Some(text) = self.documents.read().await.get(uri).cloned() else {
            return;
        };

        let Some(validation) = services.engine.validate(uri.as_str(), &text).await else {
            return;
        };

        let diagnostics = validation
            .diagnostics
            .into_iter()
            .map(|diag| to_lsp_diagnostic(diag, &text))
            .collect();
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, None)
            .await;
        self.client
            .send_notification::<CostNotification>(CostParams {
                uri: uri.clone(),
                label: validation.cost_label,
            })
            .await;
    }

    async fn run_command(&self, command: Command) -> Result<Option<Value>> {
        let services = self
            .services()
            .await
            .ok_or_else(|| internal_error("bqmirror is not initialized"))?;

        match command {
            Command::ClearCache => {
                let store = Arc::clone(&services.store);
                tokio::task::spawn_blocking(move || store.clear())
                    .await
                    .map_err(|e| internal_error(e.to_string()))?
                    .map_err(|e| internal_error(e.to_string()))?;

                self.client
                    .log_message(MessageType::INFO, "Cleared bqmirror cache")
                    .await;
                Ok(None)
            }
            Command::UpdateCache { texts } => {
                let texts = match texts {
                    Some(texts) => texts,
                    None => self.open_texts().await,
                };
                let report = services
                    .fetcher
                    .refresh(&texts)
                    .await
                    .map_err(|e| internal_error(e.to_string()))?;

                serde_json::to_value(&report)
                    .map(Some)
                    .map_err(|e| internal_error(e.to_string()))
            }
            Command::DryRun { target } => {
                // An open document's URI validates and publishes; anything else is SQL text
                if let Ok(uri) = Url::parse(&target) {
                    if self.documents.read().await.contains_key(&uri) {
                        self.validate_document(&uri).await;
                        return Ok(None);
                    }
                }

                let validation = services.engine.validate_text(&target).await;
                let diagnostics: Vec<Diagnostic> = validation
                    .diagnostics
                    .into_iter()
                    .map(|diag| to_lsp_diagnostic(diag, &target))
                    .collect();
                Ok(Some(serde_json::json!({
                    "costLabel": validation.cost_label,
                    "diagnostics": diagnostics,
                })))
            }
        }
    }
}

fn internal_error(message: impl Into<String>) -> Error {
    let message: String = message.into();
    Error {
        code: ErrorCode::InternalError,
        message: message.into(),
        data: None,
    }
}

/// Convert a mirror diagnostic on `text` to an LSP diagnostic
///
/// Mirror ranges count characters; LSP counts UTF-16 code units.
pub fn to_lsp_diagnostic(diag: MirrorDiagnostic, text: &str) -> Diagnostic {
    let severity = match diag.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
    };

    Diagnostic {
        range: Range {
            start: utf16_position(text, diag.range.start.line, diag.range.start.character),
            end: utf16_position(text, diag.range.end.line, diag.range.end.character),
        },
        severity: Some(severity),
        source: Some("bqmirror".to_string()),
        message: diag.message,
        ..Default::default()
    }
}

fn utf16_position(text: &str, line: u32, character: u32) -> Position {
    let character = match text.split('\n').nth(line as usize) {
        Some(content) => content
            .chars()
            .take(character as usize)
            .map(|c| c.len_utf16() as u32)
            .sum(),
        None => character,
    };
    Position { line, character }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let root_uri = params.root_uri.clone();
        *self.root_uri.write().await = root_uri;

        let config = self.load_config().await;
        match Services::build(&config).await {
            Ok(services) => *self.services.write().await = Some(Arc::new(services)),
            Err(e) => {
                self.client
                    .log_message(MessageType::ERROR, format!("bqmirror disabled: {:#}", e))
                    .await;
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: commands::ALL.iter().map(|c| c.to_string()).collect(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "bqmirror LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(services) = self.services.write().await.take() {
            let store = Arc::clone(&services.store);
            match tokio::task::spawn_blocking(move || store.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to close metadata cache"),
                Err(e) => tracing::warn!(error = %e, "cache close task failed"),
            }
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.text_document.text;

        self.documents.write().await.insert(uri, text);
        self.spawn_refresh().await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        // Full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.write().await.insert(uri, change.text);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;

        if let Some(text) = params.text {
            self.documents.write().await.insert(uri.clone(), text);
        }

        self.validate_document(&uri).await;
        self.spawn_refresh().await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);

        if let Some(services) = self.services().await {
            services.engine.forget(uri.as_str());
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        let command = Command::parse(&params.command, &params.arguments).map_err(Error::invalid_params)?;
        self.run_command(command).await
    }
}
