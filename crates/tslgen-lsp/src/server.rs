//! LSP server implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value as Json, json};
use tokio::sync::{Mutex, RwLock};
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, info, warn};
use tslgen_yaml::{LineIndex, LinePosition, parse_stream};

use crate::completion::{Suggestion, SuggestionKind, complete, completion_schema};
use crate::config::Settings;
use crate::daemon::{
    ALREADY_ACTIVE, DaemonCommand, GenerateOutcome, GenerateRequest, GeneratorDaemon, build_steps,
    local_cpu_flags, run_build,
};
use crate::diagnostics::check;
use crate::preview::{PreviewData, build_target, render_preview};
use crate::project::{DataFileKind, Project, ProjectRegistry};
use crate::symbols::outline;

pub const PREVIEW_COMMAND: &str = "tslgen.preview";
pub const BUILD_COMMAND: &str = "tslgen.build";
pub const KILL_DAEMON_COMMAND: &str = "tslgen.killDaemon";

/// How long a build waits for a fresh daemon to report ready.
const DAEMON_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Schema source files of all generator profiles.
const SCHEMA_WATCH_PATTERN: &str = "**/*_generator_schema.yaml";

/// Document state tracked by the server
struct DocumentState {
    content: String,
    version: i32,
}

/// Everything the server knows: open documents, initialized projects,
/// running daemons and the active settings.
pub struct Workspace {
    pub registry: ProjectRegistry,
    documents: RwLock<HashMap<Url, DocumentState>>,
    settings: RwLock<Settings>,
    daemons: Mutex<HashMap<PathBuf, Arc<GeneratorDaemon>>>,
}

impl Workspace {
    pub fn new(settings: Settings) -> Self {
        Workspace {
            registry: ProjectRegistry::new(),
            documents: RwLock::new(HashMap::new()),
            settings: RwLock::new(settings),
            daemons: Mutex::new(HashMap::new()),
        }
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    async fn content(&self, uri: &Url) -> Option<String> {
        let docs = self.documents.read().await;
        docs.get(uri).map(|doc| doc.content.clone())
    }

    async fn project(&self, uri: &Url) -> Option<Arc<Project>> {
        let path = uri.to_file_path().ok()?;
        self.registry.project_for(&path).await
    }

    /// The daemon of `project`, started on first use. The flag is set when
    /// this call started it.
    async fn daemon(
        &self,
        project: &Project,
        settings: &Settings,
    ) -> std::result::Result<(Arc<GeneratorDaemon>, bool), String> {
        let root = &project.specs.root;
        let mut daemons = self.daemons.lock().await;
        if let Some(daemon) = daemons.get(root) {
            return Ok((daemon.clone(), false));
        }
        let build_dir = build_dir(root, project, settings);
        std::fs::create_dir_all(&build_dir)
            .map_err(|e| format!("Could not create {}: {e}", build_dir.display()))?;
        let command = DaemonCommand::generator(
            &settings.python_interpreter,
            root,
            &project.specs.profile,
            &build_dir,
        );
        let daemon = Arc::new(GeneratorDaemon::spawn(&command).map_err(|e| e.to_string())?);
        daemons.insert(root.clone(), daemon.clone());
        Ok((daemon, true))
    }

    pub async fn shutdown_daemons(&self) {
        let mut daemons = self.daemons.lock().await;
        for (root, daemon) in daemons.drain() {
            debug!(?root, "Stopping generator daemon");
            daemon.shutdown().await;
        }
    }
}

fn build_dir(root: &Path, project: &Project, settings: &Settings) -> PathBuf {
    root.join(
        settings
            .build_dir_name
            .as_deref()
            .unwrap_or(project.specs.profile.build_dir),
    )
}

/// Kind of a data file: by location, or by content outside the data folders.
fn file_kind(uri: &Url, stream: &tslgen_yaml::Stream) -> DataFileKind {
    let by_location = uri
        .to_file_path()
        .map(|path| DataFileKind::from_location(&path))
        .unwrap_or(DataFileKind::Unknown);
    match by_location {
        DataFileKind::Unknown => DataFileKind::from_content(stream),
        kind => kind,
    }
}

pub(crate) fn to_lsp_position(position: LinePosition) -> Position {
    Position::new(position.line, position.character)
}

pub(crate) fn from_lsp_position(position: Position) -> LinePosition {
    LinePosition::new(position.line, position.character)
}

/// The tslgen language server
pub struct TslgenLanguageServer {
    /// LSP client for sending notifications
    client: Client,
    workspace: Arc<Workspace>,
}

impl TslgenLanguageServer {
    pub fn new(client: Client) -> Self {
        Self::with_settings(client, Settings::load())
    }

    pub fn with_settings(client: Client, settings: Settings) -> Self {
        Self {
            client,
            workspace: Arc::new(Workspace::new(settings)),
        }
    }

    /// Publish diagnostics for a document
    async fn publish_diagnostics(&self, uri: Url, content: &str, version: Option<i32>) {
        let diagnostics = self.compute_diagnostics(&uri, content).await;
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    async fn compute_diagnostics(&self, uri: &Url, content: &str) -> Vec<Diagnostic> {
        let stream = parse_stream(content);
        let kind = match uri.to_file_path() {
            Ok(path) => DataFileKind::from_location(&path),
            Err(()) => DataFileKind::Unknown,
        };
        let schema = match self.workspace.project(uri).await {
            Some(project) => Some(project.schema().await),
            None => None,
        };
        let findings = check(&stream, kind, schema.as_ref().map(|schema| &schema.schemata));
        debug!(%uri, count = findings.len(), "Computed diagnostics");

        let index = LineIndex::new(content);
        findings
            .iter()
            .map(|finding| finding.to_diagnostic(&index))
            .collect()
    }

    async fn store(&self, uri: Url, content: String, version: i32) {
        self.publish_diagnostics(uri.clone(), &content, Some(version))
            .await;
        let mut docs = self.workspace.documents.write().await;
        docs.insert(uri, DocumentState { content, version });
    }

    /// Re-publish diagnostics of every open document.
    async fn refresh_diagnostics(&self) {
        let docs: Vec<(Url, String, i32)> = {
            let docs = self.workspace.documents.read().await;
            docs.iter()
                .map(|(uri, doc)| (uri.clone(), doc.content.clone(), doc.version))
                .collect()
        };
        for (uri, content, version) in docs {
            self.publish_diagnostics(uri, &content, Some(version)).await;
        }
    }

    async fn preview(&self, uri: Url, position: Position) -> PreviewData {
        let Some(project) = self.workspace.project(&uri).await else {
            return self
                .report_preview(format!("{uri} is not part of a generator project."))
                .await;
        };
        let Some(content) = self.workspace.content(&uri).await else {
            return PreviewData::default();
        };
        let offset = LineIndex::new(&content).offset(from_lsp_position(position));
        let schema = project.schema().await;

        match render_preview(&project.specs, &schema.defaults, &content, offset) {
            Ok(preview) => {
                for message in preview.messages {
                    self.client.show_message(MessageType::ERROR, message).await;
                }
                preview.data
            }
            Err(e) => self.report_preview(e.to_string()).await,
        }
    }

    async fn report_preview(&self, message: String) -> PreviewData {
        self.client
            .show_message(MessageType::WARNING, message.clone())
            .await;
        PreviewData {
            static_content: message,
            variable_content: Vec::new(),
        }
    }

    /// Generate, build and test the definition under the cursor.
    async fn build(&self, uri: Url, position: Position) -> Json {
        match self.try_build(uri, position).await {
            Ok(status) => status,
            Err(message) => {
                warn!(%message, "Build failed");
                self.client
                    .show_message(MessageType::ERROR, message.clone())
                    .await;
                json!({ "status": "failed", "message": message })
            }
        }
    }

    async fn try_build(&self, uri: Url, position: Position) -> std::result::Result<Json, String> {
        let settings = self.workspace.settings().await;
        if !settings.enable_daemon {
            return Err("The generator daemon is disabled.".to_string());
        }
        let project = self
            .workspace
            .project(&uri)
            .await
            .ok_or_else(|| format!("{uri} is not part of a generator project."))?;
        let content = self
            .workspace
            .content(&uri)
            .await
            .ok_or_else(|| format!("{uri} is not open."))?;
        let offset = LineIndex::new(&content).offset(from_lsp_position(position));
        let target = build_target(&content, offset).map_err(|e| e.to_string())?;

        let (daemon, started) = self.workspace.daemon(&project, &settings).await?;
        // A running daemon that is not idle is busy with another build.
        if started
            && tokio::time::timeout(DAEMON_START_TIMEOUT, daemon.ready())
                .await
                .is_err()
        {
            warn!("Generator daemon did not report ready in time");
        }
        let request = GenerateRequest {
            lscpu_flags: local_cpu_flags(),
            primitives: vec![target.primitive.clone()],
        };
        match daemon.generate(&request).await.map_err(|e| e.to_string())? {
            GenerateOutcome::AlreadyActive => {
                self.client
                    .show_message(MessageType::INFO, ALREADY_ACTIVE)
                    .await;
                return Ok(json!({ "status": "alreadyActive" }));
            }
            GenerateOutcome::Generated => {
                info!(primitive = %target.primitive, "Generated sources");
            }
        }

        let build_dir = build_dir(&project.specs.root, &project, &settings);
        let steps = build_steps(
            &project.specs.profile,
            &build_dir,
            &target.extension,
            &target.primitive,
        );
        let log = run_build(&steps, &build_dir)
            .await
            .map_err(|e| e.to_string())?;
        self.client
            .show_message(
                MessageType::INFO,
                format!("Tests of {} on {} passed.", target.primitive, target.extension),
            )
            .await;
        Ok(json!({ "status": "passed", "log": log }))
    }
}

fn completion_item(index: usize, suggestion: Suggestion, content: &str) -> CompletionItem {
    let text_edit = suggestion.delete_range.map(|span| {
        let line_index = LineIndex::new(content);
        CompletionTextEdit::Edit(TextEdit {
            range: Range {
                start: to_lsp_position(line_index.position(span.start)),
                end: to_lsp_position(line_index.position(span.end)),
            },
            new_text: format!("{}{}", suggestion.replaced_prefix, suggestion.snippet),
        })
    });
    CompletionItem {
        label: suggestion.label,
        kind: Some(match suggestion.kind {
            SuggestionKind::Document | SuggestionKind::Element => CompletionItemKind::SNIPPET,
            SuggestionKind::Field => CompletionItemKind::FIELD,
        }),
        documentation: suggestion.documentation.map(|value| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            })
        }),
        sort_text: Some(format!("{index:04}")),
        insert_text: text_edit.is_none().then_some(suggestion.snippet),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        insert_text_mode: Some(InsertTextMode::ADJUST_INDENTATION),
        text_edit,
        ..Default::default()
    }
}

/// `[uri, position]` arguments of the editor commands.
fn location_arguments(arguments: Vec<Json>) -> Result<(Url, Position)> {
    let mut arguments = arguments.into_iter();
    let (Some(uri), Some(position)) = (arguments.next(), arguments.next()) else {
        return Err(Error::invalid_params("expected [uri, position]"));
    };
    let uri = serde_json::from_value(uri).map_err(|e| Error::invalid_params(e.to_string()))?;
    let position =
        serde_json::from_value(position).map_err(|e| Error::invalid_params(e.to_string()))?;
    Ok((uri, position))
}

#[tower_lsp::async_trait]
impl LanguageServer for TslgenLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(options) = &params.initialization_options {
            let mut settings = self.workspace.settings.write().await;
            match settings.merged_with(options) {
                Ok(merged) => *settings = merged,
                Err(e) => warn!(error = %e, "Ignoring initialization options"),
            }
        }

        let mut trigger_characters: Vec<String> = ('a'..='z')
            .chain('A'..='Z')
            .map(String::from)
            .collect();
        trigger_characters.extend(["-".to_string(), " ".to_string()]);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                // Full document sync - we get the whole document on each change
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(trigger_characters),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                // Document symbols (outline)
                document_symbol_provider: Some(OneOf::Left(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        PREVIEW_COMMAND.to_string(),
                        BUILD_COMMAND.to_string(),
                        KILL_DAEMON_COMMAND.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "tslgen-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "tslgen language server initialized")
            .await;

        let client = self.client.clone();
        tokio::spawn(async move {
            let options = DidChangeWatchedFilesRegistrationOptions {
                watchers: vec![FileSystemWatcher {
                    glob_pattern: GlobPattern::String(SCHEMA_WATCH_PATTERN.to_string()),
                    kind: None,
                }],
            };
            let registration = Registration {
                id: "tslgen-schema-watcher".to_string(),
                method: "workspace/didChangeWatchedFiles".to_string(),
                register_options: serde_json::to_value(options).ok(),
            };
            if let Err(e) = client.register_capability(vec![registration]).await {
                debug!(error = %e, "Client did not accept the schema watcher");
            }
        });
    }

    async fn shutdown(&self) -> Result<()> {
        self.workspace.shutdown_daemons().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.store(document.uri, document.text, document.version)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // With FULL sync, we get the entire document content
        if let Some(change) = params.content_changes.into_iter().next() {
            self.store(uri, change.text, version).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;

        {
            let mut docs = self.workspace.documents.write().await;
            docs.remove(&uri);
        }

        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut reloaded = false;
        for project in self.workspace.registry.projects().await {
            let changed = params.changes.iter().any(|change| {
                change
                    .uri
                    .to_file_path()
                    .is_ok_and(|path| path == project.specs.schema_file)
            });
            if !changed {
                continue;
            }
            match project.reload_schema().await {
                Ok(()) => reloaded = true,
                Err(e) => {
                    warn!(error = %e, "Keeping previous schema");
                    self.client
                        .show_message(
                            MessageType::WARNING,
                            format!("Could not reload schema, keeping the previous one: {e}"),
                        )
                        .await;
                }
            }
        }
        if reloaded {
            self.refresh_diagnostics().await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(content) = self.workspace.content(&uri).await else {
            return Ok(None);
        };
        let Some(project) = self.workspace.project(&uri).await else {
            return Ok(None);
        };
        let schema = project.schema().await;
        let kind = file_kind(&uri, &parse_stream(&content));
        let Some(shape) = completion_schema(&schema.schemata, kind) else {
            return Ok(None);
        };
        let indent = self.workspace.settings().await.indent();

        let suggestions = complete(&content, from_lsp_position(position), shape, kind, &indent);
        debug!(%uri, line = position.line, count = suggestions.len(), "Completion");
        if suggestions.is_empty() {
            return Ok(None);
        }
        let items = suggestions
            .into_iter()
            .enumerate()
            .map(|(index, suggestion)| completion_item(index, suggestion, &content))
            .collect();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;

        let Some(content) = self.workspace.content(&uri).await else {
            return Ok(None);
        };
        let stream = parse_stream(&content);
        let index = LineIndex::new(&content);
        let symbols: Vec<DocumentSymbol> = outline(&stream, file_kind(&uri, &stream))
            .iter()
            .map(|symbol| symbol.to_document_symbol(&index))
            .collect();

        if symbols.is_empty() {
            Ok(None)
        } else {
            Ok(Some(DocumentSymbolResponse::Nested(symbols)))
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Json>> {
        debug!(command = %params.command, "Execute command");
        match params.command.as_str() {
            PREVIEW_COMMAND => {
                let (uri, position) = location_arguments(params.arguments)?;
                let data = self.preview(uri, position).await;
                let value =
                    serde_json::to_value(data).map_err(|e| Error::invalid_params(e.to_string()))?;
                Ok(Some(value))
            }
            BUILD_COMMAND => {
                let (uri, position) = location_arguments(params.arguments)?;
                Ok(Some(self.build(uri, position).await))
            }
            KILL_DAEMON_COMMAND => {
                self.workspace.shutdown_daemons().await;
                Ok(None)
            }
            other => Err(Error::invalid_params(format!("unknown command `{other}`"))),
        }
    }
}

/// Run the LSP server on stdin/stdout
pub async fn run() -> eyre::Result<()> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(TslgenLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_convert_both_ways() {
        let position = LinePosition::new(3, 7);
        assert_eq!(to_lsp_position(position), Position::new(3, 7));
        assert_eq!(from_lsp_position(Position::new(3, 7)), position);
    }

    #[test]
    fn test_document_suggestion_replaces_line() {
        let content = "---";
        let suggestion = Suggestion {
            label: "New primitive:".into(),
            kind: SuggestionKind::Document,
            snippet: "\nprimitive_name: ''\n...".into(),
            replaced_prefix: "---".into(),
            documentation: None,
            delete_range: Some(tslgen_yaml::Span::new(0, 3)),
        };
        let item = completion_item(0, suggestion, content);
        assert_eq!(item.insert_text, None);
        assert_eq!(item.insert_text_mode, Some(InsertTextMode::ADJUST_INDENTATION));
        let Some(CompletionTextEdit::Edit(edit)) = item.text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(edit.range.end, Position::new(0, 3));
        assert_eq!(edit.new_text, "---\nprimitive_name: ''\n...");
    }

    #[test]
    fn test_field_suggestion_inserts_snippet() {
        let suggestion = Suggestion {
            label: "ctype:".into(),
            kind: SuggestionKind::Field,
            snippet: "ctype: ".into(),
            replaced_prefix: String::new(),
            documentation: Some("C types.".into()),
            delete_range: None,
        };
        let item = completion_item(2, suggestion, "");
        assert_eq!(item.kind, Some(CompletionItemKind::FIELD));
        assert_eq!(item.insert_text.as_deref(), Some("ctype: "));
        assert_eq!(item.sort_text.as_deref(), Some("0002"));
        assert!(item.text_edit.is_none());
    }

    #[test]
    fn test_command_arguments() {
        let (uri, position) = location_arguments(vec![
            json!("file:///p/primitive_data/primitives/add.yaml"),
            json!({"line": 2, "character": 4}),
        ])
        .unwrap();
        assert_eq!(uri.path(), "/p/primitive_data/primitives/add.yaml");
        assert_eq!(position, Position::new(2, 4));
        assert!(location_arguments(vec![json!("file:///x.yaml")]).is_err());
    }
}
