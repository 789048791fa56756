use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use bitbake_ls::analyzer::{Analyzer, Debouncer};
use bitbake_ls::config::Config;
use bitbake_ls::embedded::{EmbeddedLanguageService, NoopService, TreeSitterService};
use bitbake_ls::handlers::{self, embedded};
use bitbake_ls::resolver::{FileEvent, InventoryWatcher};

const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);
const WATCH_POLL: Duration = Duration::from_millis(250);

/// Text of a change waiting for the debounce delay.
type PendingChange = (Option<i32>, String);

pub struct Backend {
    client: Client,
    analyzer: Arc<Analyzer>,
    pending: Arc<Debouncer<PendingChange>>,
    service: std::sync::RwLock<Arc<dyn EmbeddedLanguageService>>,
    shutdown: CancellationToken,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            analyzer: Arc::new(Analyzer::default()),
            pending: Arc::new(Debouncer::new()),
            service: std::sync::RwLock::new(Arc::new(TreeSitterService::new())),
            shutdown: CancellationToken::new(),
        }
    }

    fn service(&self) -> Arc<dyn EmbeddedLanguageService> {
        self.service.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Token for one request; fires when the server shuts down.
    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// True when `position` is on a BitBake symbol or directive, which take
    /// priority over embedded code.
    fn on_bitbake_symbol(&self, uri: &Url, position: Position) -> bool {
        self.analyzer
            .get(uri)
            .map(|doc| doc.occurrence_at(position).is_some() || doc.directive_at(position).is_some())
            .unwrap_or(false)
    }

    async fn publish(&self, uri: Url) {
        publish_diagnostics(&self.client, &self.analyzer, self.service().as_ref(), uri, &self.request_token()).await;
    }

    fn start_watcher(&self) {
        let roots = self.analyzer.layer_roots();
        if roots.is_empty() || self.analyzer.config().inventory_file.is_some() {
            return;
        }
        let watcher = match InventoryWatcher::new(&roots, WATCH_DEBOUNCE) {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::warn!("not watching layers: {}", e);
                return;
            }
        };
        let analyzer = self.analyzer.clone();
        let shutdown = self.shutdown.clone();
        std::thread::spawn(move || watch_layers(watcher, analyzer, shutdown));
    }
}

async fn publish_diagnostics(
    client: &Client,
    analyzer: &Analyzer,
    service: &dyn EmbeddedLanguageService,
    uri: Url,
    cancel: &CancellationToken,
) {
    let Some(document) = analyzer.get(&uri) else {
        return;
    };
    let mut diagnostics = handlers::diagnostics(analyzer, &uri);
    diagnostics.extend(embedded::diagnostics(analyzer, service, &uri, cancel).await);
    client.publish_diagnostics(uri, diagnostics, document.version).await;
}

fn watch_layers(watcher: InventoryWatcher, analyzer: Arc<Analyzer>, shutdown: CancellationToken) {
    while !shutdown.is_cancelled() {
        let events = match watcher.recv_timeout(WATCH_POLL) {
            Ok(Some(events)) => events,
            Ok(None) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };
        let deleted = events.iter().filter(|e| matches!(e, FileEvent::Deleted(_))).count();
        tracing::debug!("{} layer changes ({} deleted), rescanning", events.len(), deleted);
        if let Err(e) = analyzer.refresh_inventory() {
            tracing::warn!("inventory refresh failed: {}", e);
        }
    }
}

pub fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec!["{".to_string(), " ".to_string(), "/".to_string()]),
            ..Default::default()
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        references_provider: Some(OneOf::Left(true)),
        rename_provider: Some(OneOf::Right(RenameOptions {
            prepare_provider: Some(true),
            work_done_progress_options: Default::default(),
        })),
        document_symbol_provider: Some(OneOf::Left(true)),
        semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
            SemanticTokensOptions {
                legend: handlers::legend(),
                full: Some(SemanticTokensFullOptions::Bool(true)),
                range: None,
                ..Default::default()
            },
        )),
        ..Default::default()
    }
}

#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| folder.uri.clone())
        .or_else(|| params.root_uri.clone())
        .and_then(|uri| uri.to_file_path().ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = workspace_root(&params);
        let mut config = match &root {
            Some(root) => Config::load(root).unwrap_or_else(|e| {
                tracing::warn!("ignoring workspace configuration: {}", e);
                Config::default()
            }),
            None => Config::default(),
        };
        if let Some(options) = &params.initialization_options {
            if let Err(e) = config.merge_json(options) {
                tracing::warn!("ignoring initializationOptions: {}", e);
            }
        }
        if !config.embedded {
            *self.service.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(NoopService);
        }
        tracing::info!("initializing for {:?}", root);
        self.analyzer.configure(config, root);

        Ok(InitializeResult {
            capabilities: capabilities(),
            server_info: Some(ServerInfo {
                name: "bitbake-ls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let analyzer = self.analyzer.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            if let Err(e) = analyzer.refresh_inventory() {
                tracing::warn!("inventory unavailable: {}", e);
            }
            if let Some(path) = analyzer.config().trace_file {
                if let Err(e) = analyzer.load_trace(&path) {
                    tracing::warn!("scan trace {} unavailable: {}", path.display(), e);
                }
            }
        })
        .await;
        if let Err(e) = loaded {
            tracing::error!("initial scan panicked: {}", e);
        }
        self.start_watcher();

        for uri in self.analyzer.open_documents() {
            self.publish(uri).await;
        }
        self.client
            .log_message(MessageType::INFO, "bitbake-ls ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        tracing::debug!("opened {}", doc.uri);
        self.analyzer.analyze(&doc.uri, Some(doc.version), &doc.text);
        self.publish(doc.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let generation = self
            .pending
            .schedule(&uri, (Some(params.text_document.version), change.text));

        let delay = Duration::from_millis(self.analyzer.config().debounce_ms);
        let client = self.client.clone();
        let analyzer = self.analyzer.clone();
        let pending = self.pending.clone();
        let service = self.service();
        let cancel = self.request_token();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // a newer change or a close replaced this one
            let Some((version, text)) = pending.take(&uri, generation) else {
                return;
            };
            if analyzer.analyze(&uri, version, &text).version != version {
                return;
            }
            publish_diagnostics(&client, &analyzer, service.as_ref(), uri, &cancel).await;
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.pending.clear(&uri);
        self.analyzer.close(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let mut items = handlers::completion(&self.analyzer, uri, position);
        if let Some(request) = handlers::shadow_request(&self.analyzer, uri, position) {
            let service = self.service();
            items.extend(embedded::completion(service.as_ref(), &request, &self.request_token()).await);
        }
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        if let Some(hover) = handlers::hover(&self.analyzer, uri, position) {
            return Ok(Some(hover));
        }
        let Some(request) = handlers::shadow_request(&self.analyzer, uri, position) else {
            return Ok(None);
        };
        let service = self.service();
        Ok(embedded::hover(service.as_ref(), &request, &self.request_token()).await)
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let locations = match handlers::shadow_request(&self.analyzer, uri, position) {
            Some(request) if !self.on_bitbake_symbol(uri, position) => {
                let service = self.service();
                embedded::definition(&self.analyzer, service.as_ref(), &request, &self.request_token()).await
            }
            _ => handlers::definition(&self.analyzer, uri, position),
        };
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let locations = match handlers::shadow_request(&self.analyzer, uri, position) {
            Some(request) if !self.on_bitbake_symbol(uri, position) => {
                let service = self.service();
                embedded::references(&self.analyzer, service.as_ref(), &request, &self.request_token()).await
            }
            _ => handlers::references(&self.analyzer, uri, position, params.context.include_declaration),
        };
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(locations))
    }

    async fn prepare_rename(&self, params: TextDocumentPositionParams) -> Result<Option<PrepareRenameResponse>> {
        let uri = &params.text_document.uri;
        if let Some((range, placeholder)) = handlers::prepare_rename(&self.analyzer, uri, params.position) {
            return Ok(Some(PrepareRenameResponse::RangeWithPlaceholder { range, placeholder }));
        }
        if handlers::shadow_request(&self.analyzer, uri, params.position).is_some() {
            return Ok(Some(PrepareRenameResponse::DefaultBehavior { default_behavior: true }));
        }
        Ok(None)
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        if let Some(edit) = handlers::rename(&self.analyzer, uri, position, &params.new_name) {
            return Ok(Some(edit));
        }
        let Some(request) = handlers::shadow_request(&self.analyzer, uri, position) else {
            return Ok(None);
        };
        let service = self.service();
        let edits = embedded::rename(service.as_ref(), &request, &params.new_name, &self.request_token()).await;
        if edits.is_empty() {
            return Ok(None);
        }
        let mut edit = WorkspaceEdit::default();
        handlers::merge_edits(&mut edit, edits);
        Ok(Some(edit))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> Result<Option<DocumentSymbolResponse>> {
        let Some(document) = self.analyzer.get(&params.text_document.uri) else {
            return Ok(None);
        };
        Ok(Some(DocumentSymbolResponse::Nested(handlers::document_symbols(&document))))
    }

    async fn semantic_tokens_full(&self, params: SemanticTokensParams) -> Result<Option<SemanticTokensResult>> {
        let Some(document) = self.analyzer.get(&params.text_document.uri) else {
            return Ok(None);
        };
        Ok(Some(SemanticTokensResult::Tokens(handlers::semantic_tokens(&document))))
    }
}
