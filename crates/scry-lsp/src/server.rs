//! Request and notification handlers.
//!
//! Handlers are thin translations between LSP payloads and the core:
//! navigation reads the query database through a shared lock, editor
//! lifecycle events feed the working-files store, the pipeline and the
//! completion cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{json, Value};

use scry_completion::{CodeCompleteCache, CompletionManager, TranslationUnitHost};
use scry_config::{GroupMatch, ScryConfig};
use scry_core::{AbsPath, AnyId, Position, Role, SymbolKind};
use scry_fuzzy::FuzzyMatcher;
use scry_pipeline::{ImportStatus, IndexProvider, Pipeline};
use scry_query::{QueryDatabase, QueryRef, SemanticHighlightCache};
use scry_vfs::{ContentChange, WorkingFiles};

use crate::out::{DiagnosticsRateLimiter, StdoutWriter};
use crate::rpc::{self, error_code, RequestId};
use crate::uri::{uri_to_path, UriSpellingCache};
use crate::{semantic, to_lsp_range};

/// Publish-side settings consumed by worker callbacks; swapped wholesale on
/// configuration reloads.
pub struct PublishSettings {
    pub emit_inactive_regions: bool,
    pub highlight_enabled: bool,
    pub highlight_match: GroupMatch,
    pub diagnostics_match: GroupMatch,
}

impl PublishSettings {
    fn from_config(config: &ScryConfig) -> PublishSettings {
        PublishSettings {
            emit_inactive_regions: config.emit_inactive_regions,
            highlight_enabled: config.highlight.enabled,
            highlight_match: GroupMatch::new(
                &config.highlight.whitelist,
                &config.highlight.blacklist,
            ),
            diagnostics_match: GroupMatch::new(
                &config.diagnostics.whitelist,
                &config.diagnostics.blacklist,
            ),
        }
    }
}

pub struct ServerState {
    pub config: RwLock<ScryConfig>,
    pub working_files: Arc<WorkingFiles>,
    pub pipeline: Arc<Pipeline>,
    pub completion: Arc<CompletionManager>,
    pub out: Arc<StdoutWriter>,
    pub uris: Arc<UriSpellingCache>,
    pub highlight_cache: Arc<Mutex<SemanticHighlightCache>>,
    pub global_complete_cache: Arc<CodeCompleteCache>,
    pub non_global_complete_cache: Arc<CodeCompleteCache>,
    pub diagnostics_limiter: Arc<DiagnosticsRateLimiter>,
    pub publish_settings: Arc<RwLock<PublishSettings>>,
    pub shutdown_requested: AtomicBool,
}

impl ServerState {
    pub fn new(
        config: ScryConfig,
        provider: Arc<dyn IndexProvider>,
        host: Arc<dyn TranslationUnitHost>,
        out: Arc<StdoutWriter>,
    ) -> Arc<ServerState> {
        let working_files = Arc::new(WorkingFiles::new());
        let uris = Arc::new(UriSpellingCache::new());
        let highlight_cache = Arc::new(Mutex::new(SemanticHighlightCache::new()));
        let diagnostics_limiter =
            Arc::new(DiagnosticsRateLimiter::new(config.diagnostics.frequency_ms));
        let db = Arc::new(RwLock::new(QueryDatabase::new()));
        let cache = Arc::new(scry_cache::IndexCache::new(
            &config.cache_directory,
            config.cache_format,
        ));

        let publish_settings = Arc::new(RwLock::new(PublishSettings::from_config(&config)));

        // Publishes driven by index applies run on the query-database
        // thread.
        let apply_out = Arc::clone(&out);
        let apply_uris = Arc::clone(&uris);
        let apply_db = Arc::clone(&db);
        let apply_highlight = Arc::clone(&highlight_cache);
        let apply_working_files = Arc::clone(&working_files);
        let apply_settings = Arc::clone(&publish_settings);
        let on_applied = Box::new(move |paths: &[AbsPath]| {
            let settings = apply_settings.read().unwrap_or_else(|e| e.into_inner());
            let db = apply_db.read().unwrap_or_else(|e| e.into_inner());
            for path in paths {
                apply_working_files.do_action_on_file(path, |file| {
                    if let Some(file) = file {
                        file.index_snapshot = Some(file.text_arc());
                    }
                });

                let uri = apply_uris.uri_for(path);
                if settings.emit_inactive_regions {
                    if let Some(def) = db.file_for_path(path).and_then(|f| f.def.as_ref()) {
                        let regions: Vec<Value> =
                            def.inactive_regions.iter().map(|&r| to_lsp_range(r)).collect();
                        apply_out.send(&rpc::notification(
                            "$scry/publishInactiveRegions",
                            json!({ "uri": uri, "inactiveRegions": regions }),
                        ));
                    }
                }
                if settings.highlight_enabled {
                    let mut cache = apply_highlight.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(payload) = semantic::build_highlight_payload(
                        &db,
                        &mut cache,
                        &settings.highlight_match,
                        &uri,
                        path,
                    ) {
                        apply_out.send(&rpc::notification(
                            "$scry/publishSemanticHighlighting",
                            payload,
                        ));
                    }
                }
            }
        });

        let pipeline = Arc::new(Pipeline::new(provider, cache, db, on_applied));

        // Diagnostics computed by the completion machinery flow straight to
        // the client, rate limited per path.
        let diag_out = Arc::clone(&out);
        let diag_uris = Arc::clone(&uris);
        let diag_limiter = Arc::clone(&diagnostics_limiter);
        let diag_working_files = Arc::clone(&working_files);
        let diag_settings = Arc::clone(&publish_settings);
        let on_diagnostic = Box::new(move |path: AbsPath, diagnostics: Vec<lsp_types::Diagnostic>| {
            {
                let settings = diag_settings.read().unwrap_or_else(|e| e.into_inner());
                if !settings.diagnostics_match.matches(path.as_str()) {
                    return;
                }
            }
            if !diag_limiter.should_publish(&path, diagnostics.is_empty()) {
                return;
            }
            diag_working_files.do_action_on_file(&path, |file| {
                if let Some(file) = file {
                    file.published_diagnostics = diagnostics.clone();
                }
            });
            diag_out.send(&rpc::notification(
                "textDocument/publishDiagnostics",
                json!({
                    "uri": diag_uris.uri_for(&path),
                    "diagnostics": diagnostics,
                }),
            ));
        });

        let dropped_out = Arc::clone(&out);
        let on_dropped = Box::new(move |request_id: scry_completion::RequestId| {
            // The superseded request never produced results; answer it so
            // the client does not wait forever.
            if let Ok(id) = request_id.parse::<i64>() {
                dropped_out.send(&rpc::response(
                    &RequestId::Int(id),
                    json!({ "isIncomplete": false, "items": [] }),
                ));
            }
        });

        let completion = Arc::new(CompletionManager::new(host, on_diagnostic, on_dropped));

        Arc::new(ServerState {
            config: RwLock::new(config),
            working_files,
            pipeline,
            completion,
            out,
            uris,
            highlight_cache,
            global_complete_cache: Arc::new(CodeCompleteCache::new()),
            non_global_complete_cache: Arc::new(CodeCompleteCache::new()),
            diagnostics_limiter,
            publish_settings,
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Installs a new configuration (initialize / didChangeConfiguration).
    pub fn apply_config(&self, config: ScryConfig) {
        self.diagnostics_limiter
            .set_frequency_ms(config.diagnostics.frequency_ms);
        *self
            .publish_settings
            .write()
            .unwrap_or_else(|e| e.into_inner()) = PublishSettings::from_config(&config);
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    fn config(&self) -> ScryConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// What the main loop should do after a notification.
#[derive(Debug, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Exit,
}

// ---- shared helpers ----

fn parse_position(value: &Value) -> Position {
    Position::new(
        value["line"].as_u64().unwrap_or(0) as u32,
        value["character"].as_u64().unwrap_or(0) as u32,
    )
}

fn text_document_path(state: &ServerState, params: &Value) -> Option<AbsPath> {
    let uri = params["textDocument"]["uri"].as_str()?;
    let path = uri_to_path(uri)?;
    record_spelling(state, uri);
    Some(path)
}

/// Remembers how the client spelled a path, so replies echo its casing.
fn record_spelling(state: &ServerState, uri: &str) {
    if let Some(encoded) = uri.strip_prefix("file://") {
        if let Ok(decoded) = percent_encoding::percent_decode_str(encoded).decode_utf8() {
            state.uris.record(&decoded);
        }
    }
}

fn location_json(state: &ServerState, r: &QueryRef, db: &QueryDatabase) -> Value {
    let path = &db.file(r.file).path;
    json!({
        "uri": state.uris.uri_for(path),
        "range": to_lsp_range(r.range),
    })
}

/// First symbol under the cursor that resolves to a live entity.
fn symbol_at(
    db: &QueryDatabase,
    path: &AbsPath,
    position: Position,
) -> Option<scry_query::SymbolRef> {
    db.symbols_at(path, position).into_iter().next()
}

/// Error reply for a file the database does not know: distinguishes "still
/// indexing" from "never heard of it".
fn unknown_file_error(state: &ServerState, id: &RequestId, path: &AbsPath) -> Value {
    match state.pipeline.import_manager().status(path) {
        ImportStatus::ProcessingInitialImport | ImportStatus::ProcessingUpdate => {
            rpc::error_response(
                id,
                error_code::SERVER_NOT_INITIALIZED,
                format!("{path} is being indexed."),
            )
        }
        _ => rpc::error_response(
            id,
            error_code::INTERNAL_ERROR,
            format!("Unable to find file {path}"),
        ),
    }
}

fn entity_name(db: &QueryDatabase, kind: SymbolKind, id: AnyId) -> String {
    match kind {
        SymbolKind::Type => db.types[id.index()]
            .any_def()
            .map(|d| d.detailed_name.clone()),
        SymbolKind::Func => db.funcs[id.index()]
            .any_def()
            .map(|d| d.detailed_name.clone()),
        SymbolKind::Var => db.vars[id.index()]
            .any_def()
            .map(|d| d.detailed_name.clone()),
        SymbolKind::File => Some(db.files[id.index()].path.as_str().to_string()),
        SymbolKind::Invalid => None,
    }
    .unwrap_or_default()
}

fn lsp_symbol_kind(kind: SymbolKind) -> u32 {
    // LSP SymbolKind numbers: File=1, Class=5, Function=12, Variable=13.
    match kind {
        SymbolKind::File => 1,
        SymbolKind::Type => 5,
        SymbolKind::Func => 12,
        SymbolKind::Var => 13,
        SymbolKind::Invalid => 0,
    }
}

// ---- notifications ----

pub fn handle_notification(state: &Arc<ServerState>, method: &str, params: &Value) -> LoopAction {
    match method {
        "exit" => return LoopAction::Exit,
        "initialized" => {}
        "textDocument/didOpen" => did_open(state, params),
        "textDocument/didChange" => did_change(state, params),
        "textDocument/didSave" => did_save(state, params),
        "textDocument/didClose" => did_close(state, params),
        "workspace/didChangeConfiguration" => did_change_configuration(state, params),
        "workspace/didChangeWatchedFiles" => did_change_watched_files(state, params),
        "$cancelRequest" | "$/cancelRequest" => {}
        other => {
            tracing::debug!(target: "scry.lsp", method = other, "ignoring notification");
        }
    }
    LoopAction::Continue
}

fn did_open(state: &Arc<ServerState>, params: &Value) {
    let Some(uri) = params["textDocument"]["uri"].as_str() else {
        return;
    };
    let Some(path) = uri_to_path(uri) else { return };
    record_spelling(state, uri);

    let text = params["textDocument"]["text"].as_str().unwrap_or_default();
    let version = params["textDocument"]["version"].as_i64().unwrap_or(0) as i32;
    state.working_files.open(path.clone(), text.to_string(), version);

    state
        .pipeline
        .request_index(path.clone(), Vec::new(), true, Some(text.to_string()));
    state.completion.notify_view(&path);
}

fn did_change(state: &Arc<ServerState>, params: &Value) {
    let Some(path) = text_document_path(state, params) else {
        return;
    };
    let version = params["textDocument"]["version"].as_i64().unwrap_or(0) as i32;

    let changes: Vec<ContentChange> = params["contentChanges"]
        .as_array()
        .map(|changes| {
            changes
                .iter()
                .map(|change| ContentChange {
                    range: change.get("range").map(from_lsp_range),
                    text: change["text"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    if let Err(err) = state.working_files.on_change(&path, version, &changes) {
        tracing::warn!(target: "scry.lsp", path = %path, error = %err, "didChange failed");
        return;
    }

    state.completion.notify_edit(&path);
    if state.config().enable_index_on_did_change {
        if let Some(text) = state.working_files.snapshot(&path) {
            state
                .pipeline
                .request_index(path.clone(), Vec::new(), true, Some(text.as_str().to_string()));
        }
    }
    state.completion.diagnostics_update(&path);
}

fn did_save(state: &Arc<ServerState>, params: &Value) {
    let Some(path) = text_document_path(state, params) else {
        return;
    };
    if !state.config().enable_index_on_did_change {
        let contents = state
            .working_files
            .snapshot(&path)
            .map(|text| text.as_str().to_string());
        state
            .pipeline
            .request_index(path.clone(), Vec::new(), true, contents);
    }
    state.completion.notify_save(&path);
}

fn did_close(state: &Arc<ServerState>, params: &Value) {
    let Some(path) = text_document_path(state, params) else {
        return;
    };
    // Clear any published diagnostics for the closed buffer.
    state.out.send(&rpc::notification(
        "textDocument/publishDiagnostics",
        json!({ "uri": state.uris.uri_for(&path), "diagnostics": [] }),
    ));
    state.working_files.close(&path);
    state.completion.notify_close(&path);
}

fn did_change_configuration(state: &Arc<ServerState>, params: &Value) {
    let new_config = ScryConfig::from_initialization_options(params.get("settings").cloned());
    state.apply_config(new_config);

    state.completion.flush_all_sessions();
    state.global_complete_cache.with_lock(|view| view.clear());
    state.non_global_complete_cache.with_lock(|view| view.clear());
    state.pipeline.freshen_index();
}

fn did_change_watched_files(state: &Arc<ServerState>, params: &Value) {
    const CREATED: u64 = 1;
    const CHANGED: u64 = 2;
    const DELETED: u64 = 3;

    let Some(events) = params["changes"].as_array() else {
        return;
    };
    for event in events {
        let Some(path) = event["uri"].as_str().and_then(uri_to_path) else {
            continue;
        };
        match event["type"].as_u64().unwrap_or(0) {
            CREATED | CHANGED => {
                state.pipeline.request_index(path, Vec::new(), false, None);
            }
            DELETED => {
                state
                    .pipeline
                    .request_index(path, Vec::new(), false, Some(String::new()));
            }
            other => {
                tracing::debug!(target: "scry.lsp", kind = other, "unknown watched-file event");
            }
        }
    }
}

fn from_lsp_range(value: &Value) -> scry_core::Range {
    scry_core::Range::new(parse_position(&value["start"]), parse_position(&value["end"]))
}

// ---- requests ----

/// Handles one request and returns the response to write. `None` means the
/// handler already arranged for a (possibly asynchronous) reply.
pub fn handle_request(
    state: &Arc<ServerState>,
    id: RequestId,
    method: &str,
    params: &Value,
) -> Option<Value> {
    match method {
        "initialize" => Some(initialize(state, &id, params)),
        "shutdown" => {
            state.shutdown_requested.store(true, Ordering::SeqCst);
            Some(rpc::response(&id, Value::Null))
        }
        "textDocument/completion" => completion(state, id, params, false),
        "textDocument/signatureHelp" => completion(state, id, params, true),
        "textDocument/definition" => Some(definition(state, &id, params)),
        "textDocument/typeDefinition" => Some(type_definition(state, &id, params)),
        "textDocument/implementation" => Some(implementation(state, &id, params)),
        "textDocument/references" => Some(references(state, &id, params)),
        "textDocument/documentHighlight" => Some(document_highlight(state, &id, params)),
        "textDocument/documentSymbol" => Some(document_symbol(state, &id, params)),
        "textDocument/documentLink" => Some(document_link(state, &id, params)),
        "textDocument/hover" => Some(hover(state, &id, params)),
        "textDocument/rename" => Some(rename(state, &id, params)),
        "textDocument/formatting" | "textDocument/rangeFormatting" => {
            // Formatter integration is out of tree; an empty edit set keeps
            // clients happy.
            Some(rpc::response(&id, json!([])))
        }
        "workspace/symbol" => Some(workspace_symbol(state, &id, params)),
        "workspace/executeCommand" => Some(rpc::response(&id, Value::Null)),
        "$scry/callHierarchy" => Some(call_hierarchy(state, &id, params)),
        "$scry/inheritanceHierarchy" => Some(inheritance_hierarchy(state, &id, params)),
        "$scry/vars" => Some(vars(state, &id, params)),
        "$scry/freshenIndex" => {
            state.pipeline.freshen_index();
            Some(rpc::response(&id, Value::Null))
        }
        other => Some(rpc::error_response(
            &id,
            error_code::METHOD_NOT_FOUND,
            format!("unknown method {other}"),
        )),
    }
}

fn initialize(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let mut config = ScryConfig::from_initialization_options(params.get("initializationOptions").cloned());
    if config.project_root.is_none() {
        config.project_root = params["rootUri"]
            .as_str()
            .and_then(uri_to_path)
            .map(|p| p.as_str().to_string());
    }
    state.apply_config(config);
    state.out.log_message(
        crate::out::MessageKind::Info,
        concat!("scry ", env!("CARGO_PKG_VERSION"), " initialized"),
    );

    rpc::response(
        id,
        json!({
            "capabilities": {
                "textDocumentSync": {
                    "openClose": true,
                    "change": 2,
                    "save": { "includeText": false },
                },
                "completionProvider": {
                    "resolveProvider": false,
                    "triggerCharacters": [".", ":", ">", "#", "<", "\"", "/"],
                },
                "signatureHelpProvider": { "triggerCharacters": ["(", ","] },
                "definitionProvider": true,
                "typeDefinitionProvider": true,
                "implementationProvider": true,
                "referencesProvider": true,
                "documentHighlightProvider": true,
                "documentSymbolProvider": true,
                "documentLinkProvider": { "resolveProvider": false },
                "hoverProvider": true,
                "renameProvider": true,
                "workspaceSymbolProvider": true,
                "executeCommandProvider": { "commands": [] },
            }
        }),
    )
}

/// `textDocument/completion` and `textDocument/signatureHelp`.
///
/// Cache policy: a hit in the global (per-file) cache replies immediately
/// and refreshes in the background; a hit in the position-keyed cache
/// replies immediately with no refresh; a miss dispatches and caches.
fn completion(
    state: &Arc<ServerState>,
    id: RequestId,
    params: &Value,
    is_signature_help: bool,
) -> Option<Value> {
    let Some(path) = text_document_path(state, params) else {
        return Some(rpc::error_response(
            &id,
            error_code::INVALID_PARAMS,
            "missing textDocument.uri",
        ));
    };
    let position = parse_position(&params["position"]);

    let source = state.working_files.do_action_on_file(&path, |file| {
        file.map(|f| f.find_stable_completion_source(position))
    });
    let Some(source) = source else {
        return Some(rpc::error_response(
            &id,
            error_code::INTERNAL_ERROR,
            format!("Unable to find file {path}"),
        ));
    };

    let stable_position = source.stable_position;
    let filter_text = source.existing_text.clone();
    let config = state.config();

    // Signature help is always position-keyed; completion uses the global
    // cache except after a member/scope access token.
    let use_global_cache = !is_signature_help && !is_member_access(state, &path, stable_position);

    let cache = if use_global_cache {
        Arc::clone(&state.global_complete_cache)
    } else {
        Arc::clone(&state.non_global_complete_cache)
    };

    let cached = cache.with_lock(|view| {
        view.is_valid_for(&path, stable_position)
            .then(|| view.results().to_vec())
    });

    if let Some(results) = cached {
        let reply = build_completion_reply(
            &id,
            results,
            &filter_text,
            config.completion.filter_and_sort,
            is_signature_help,
            true,
        );
        state.out.send(&reply);

        if use_global_cache {
            // Refresh the cache in the background; the response never goes
            // to the client.
            let refresh_cache = cache;
            let refresh_path = path.clone();
            state.completion.code_complete(
                None,
                path,
                stable_position,
                Box::new(move |results, _is_cached| {
                    refresh_cache
                        .with_lock(|view| view.store_global(refresh_path, results));
                }),
            );
        }
        return None;
    }

    let out = Arc::clone(&state.out);
    let reply_id = id.clone();
    let reply_path = path.clone();
    let filter_and_sort = config.completion.filter_and_sort;
    state.completion.code_complete(
        Some(id.as_key()),
        path,
        stable_position,
        Box::new(move |results, _is_cached| {
            cache.with_lock(|view| {
                if use_global_cache {
                    view.store_global(reply_path.clone(), results.clone());
                } else {
                    view.store_at(reply_path.clone(), stable_position, results.clone());
                }
            });
            out.send(&build_completion_reply(
                &reply_id,
                results,
                &filter_text,
                filter_and_sort,
                is_signature_help,
                false,
            ));
        }),
    );
    None
}

/// Whether the token at `position` is preceded by `.`, `->` or `::`.
fn is_member_access(state: &ServerState, path: &AbsPath, position: Position) -> bool {
    state.working_files.do_action_on_file(path, |file| {
        let Some(file) = file else { return false };
        let offset = file.position_to_offset(position);
        let bytes = file.text().as_bytes();
        if offset == 0 {
            return false;
        }
        match bytes[offset - 1] {
            b'.' => true,
            b'>' => offset >= 2 && bytes[offset - 2] == b'-',
            b':' => offset >= 2 && bytes[offset - 2] == b':',
            _ => false,
        }
    })
}

fn build_completion_reply(
    id: &RequestId,
    mut items: Vec<lsp_types::CompletionItem>,
    filter_text: &str,
    filter_and_sort: bool,
    is_signature_help: bool,
    _is_cached: bool,
) -> Value {
    if filter_and_sort && !filter_text.is_empty() {
        let mut matcher = FuzzyMatcher::new(filter_text);
        let mut scored: Vec<(i32, lsp_types::CompletionItem)> = items
            .into_iter()
            .filter_map(|item| {
                let score = matcher.match_score(&item.label);
                (score > FuzzyMatcher::MIN_SCORE).then_some((score, item))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.label.cmp(&b.1.label)));
        items = scored.into_iter().map(|(_, item)| item).collect();
    }

    if is_signature_help {
        let signatures: Vec<Value> = items
            .iter()
            .map(|item| json!({ "label": item.label }))
            .collect();
        rpc::response(
            id,
            json!({ "signatures": signatures, "activeSignature": 0, "activeParameter": null }),
        )
    } else {
        rpc::response(
            id,
            json!({
                "isIncomplete": false,
                "items": serde_json::to_value(&items).unwrap_or_else(|_| json!([])),
            }),
        )
    }
}

fn definition(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    if db.file_for_path(&path).and_then(|f| f.def.as_ref()).is_none() {
        return unknown_file_error(state, id, &path);
    }

    let mut locations = Vec::new();
    for sym in db.symbols_at(&path, position) {
        if sym.kind == SymbolKind::File {
            locations.push(json!({
                "uri": state.uris.uri_for(&db.files[sym.id.index()].path),
                "range": to_lsp_range(scry_core::Range::default()),
            }));
            break;
        }
        let spells = db.definition_spells(sym.kind, sym.id);
        if !spells.is_empty() {
            locations.extend(spells.iter().map(|r| location_json(state, r, &db)));
            break;
        }
        // No definition: fall back to declarations.
        let declarations: Vec<QueryRef> = match sym.kind {
            SymbolKind::Type => db.types[sym.id.index()].declarations.clone(),
            SymbolKind::Func => db.funcs[sym.id.index()].declarations.clone(),
            SymbolKind::Var => db.vars[sym.id.index()].declarations.clone(),
            _ => Vec::new(),
        };
        if !declarations.is_empty() {
            locations.extend(declarations.iter().map(|r| location_json(state, r, &db)));
            break;
        }
    }
    rpc::response(id, json!(locations))
}

fn type_definition(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let mut locations = Vec::new();
    if let Some(sym) = symbol_at(&db, &path, position) {
        let type_id = match sym.kind {
            SymbolKind::Var => db.vars[sym.id.index()].any_def().and_then(|d| d.var_type),
            SymbolKind::Type => Some(scry_core::TypeId::new(sym.id.0)),
            _ => None,
        };
        if let Some(type_id) = type_id {
            for def in &db.ty(type_id).def {
                if let Some(spell) = def.spell {
                    locations.push(location_json(state, &spell, &db));
                }
            }
        }
    }
    rpc::response(id, json!(locations))
}

fn implementation(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let mut locations = Vec::new();
    if let Some(sym) = symbol_at(&db, &path, position) {
        match sym.kind {
            SymbolKind::Type => {
                for &derived in &db.types[sym.id.index()].derived {
                    for def in &db.ty(derived).def {
                        if let Some(spell) = def.spell {
                            locations.push(location_json(state, &spell, &db));
                        }
                    }
                }
            }
            SymbolKind::Func => {
                for &derived in &db.funcs[sym.id.index()].derived {
                    for def in &db.func(derived).def {
                        if let Some(spell) = def.spell {
                            locations.push(location_json(state, &spell, &db));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    rpc::response(id, json!(locations))
}

fn references(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);
    let include_declaration = params["context"]["includeDeclaration"]
        .as_bool()
        .unwrap_or(false);
    let max_num = state.config().xref.max_num;

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    if db.file_for_path(&path).and_then(|f| f.def.as_ref()).is_none() {
        return unknown_file_error(state, id, &path);
    }

    let mut locations = Vec::new();
    if let Some(sym) = symbol_at(&db, &path, position) {
        let mut refs = db.uses_of(sym.kind, sym.id);
        if include_declaration {
            refs.extend(db.definition_spells(sym.kind, sym.id));
        }
        refs.truncate(max_num);
        locations.extend(refs.iter().map(|r| location_json(state, r, &db)));
    }
    rpc::response(id, json!(locations))
}

fn document_highlight(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let mut highlights = Vec::new();
    if let Some(sym) = symbol_at(&db, &path, position) {
        let file_id = db.usr_to_file.get(&path).copied();
        for r in db.uses_of(sym.kind, sym.id) {
            if Some(r.file) != file_id {
                continue;
            }
            // DocumentHighlightKind: Text=1, Read=2, Write=3.
            let kind = if r.role.intersects(Role::WRITE) {
                3
            } else if r.role.intersects(Role::READ) {
                2
            } else {
                1
            };
            highlights.push(json!({ "range": to_lsp_range(r.range), "kind": kind }));
        }
    }
    rpc::response(id, json!(highlights))
}

fn document_symbol(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let Some(def) = db.file_for_path(&path).and_then(|f| f.def.as_ref()) else {
        return unknown_file_error(state, id, &path);
    };

    let uri = state.uris.uri_for(&path);
    let symbols: Vec<Value> = def
        .outline
        .iter()
        .filter_map(|sym| {
            let name = entity_name(&db, sym.kind, sym.id);
            if name.is_empty() {
                return None;
            }
            Some(json!({
                "name": name,
                "kind": lsp_symbol_kind(sym.kind),
                "location": { "uri": uri.as_str(), "range": to_lsp_range(sym.range) },
            }))
        })
        .collect();
    rpc::response(id, json!(symbols))
}

fn document_link(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    if !state.config().show_document_links_on_includes {
        return rpc::response(id, json!([]));
    }

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let Some(def) = db.file_for_path(&path).and_then(|f| f.def.as_ref()) else {
        return unknown_file_error(state, id, &path);
    };

    let links: Vec<Value> = def
        .includes
        .iter()
        .map(|include| {
            let line = include.line;
            let line_len = state.working_files.do_action_on_file(&path, |file| {
                file.map(|f| {
                    f.text()
                        .lines()
                        .nth(line as usize)
                        .map(|l| l.len() as u32)
                        .unwrap_or(0)
                })
                .unwrap_or(0)
            });
            json!({
                "range": to_lsp_range(scry_core::Range::new(
                    Position::new(line, 0),
                    Position::new(line, line_len),
                )),
                "target": state.uris.uri_for(&include.resolved_path),
            })
        })
        .collect();
    rpc::response(id, json!(links))
}

fn hover(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    for sym in db.symbols_at(&path, position) {
        let hover_text = match sym.kind {
            SymbolKind::Type => db.types[sym.id.index()].any_def().map(|d| {
                if d.hover.is_empty() {
                    d.detailed_name.clone()
                } else {
                    d.hover.clone()
                }
            }),
            SymbolKind::Func => db.funcs[sym.id.index()].any_def().map(|d| {
                if d.hover.is_empty() {
                    d.detailed_name.clone()
                } else {
                    d.hover.clone()
                }
            }),
            SymbolKind::Var => db.vars[sym.id.index()].any_def().map(|d| {
                if d.hover.is_empty() {
                    d.detailed_name.clone()
                } else {
                    d.hover.clone()
                }
            }),
            _ => None,
        };
        if let Some(text) = hover_text {
            return rpc::response(
                id,
                json!({
                    "contents": { "language": "cpp", "value": text },
                    "range": to_lsp_range(sym.range),
                }),
            );
        }
    }
    rpc::response(id, Value::Null)
}

fn rename(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);
    let Some(new_name) = params["newName"].as_str() else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing newName");
    };

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let Some(sym) = symbol_at(&db, &path, position) else {
        return rpc::response(id, Value::Null);
    };

    let mut sites = db.uses_of(sym.kind, sym.id);
    sites.extend(db.definition_spells(sym.kind, sym.id));
    match sym.kind {
        SymbolKind::Type => sites.extend(db.types[sym.id.index()].declarations.iter().copied()),
        SymbolKind::Func => sites.extend(db.funcs[sym.id.index()].declarations.iter().copied()),
        SymbolKind::Var => sites.extend(db.vars[sym.id.index()].declarations.iter().copied()),
        _ => {}
    }
    sites.sort();
    sites.dedup();

    let mut changes: std::collections::HashMap<String, Vec<Value>> = std::collections::HashMap::new();
    for site in sites {
        let uri = state.uris.uri_for(&db.file(site.file).path);
        changes.entry(uri).or_default().push(json!({
            "range": to_lsp_range(site.range),
            "newText": new_name,
        }));
    }
    rpc::response(id, json!({ "changes": changes }))
}

fn workspace_symbol(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let query = params["query"].as_str().unwrap_or_default();
    let config = state.config();

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let mut matcher = FuzzyMatcher::new(query);

    let mut scored: Vec<(i32, usize)> = Vec::new();
    for (idx, symbol) in db.symbols.iter().enumerate() {
        if symbol.kind == SymbolKind::Invalid || symbol.kind == SymbolKind::File {
            continue;
        }
        let name = db.symbol_detailed_name(idx);
        if name.is_empty() {
            continue;
        }
        let score = matcher.match_score(name);
        if score <= FuzzyMatcher::MIN_SCORE {
            continue;
        }
        scored.push((score, idx));
        if !config.workspace_symbol.sort && scored.len() >= config.workspace_symbol.max_num {
            break;
        }
    }

    if config.workspace_symbol.sort {
        scored.sort_by(|a, b| b.0.cmp(&a.0));
    }
    scored.truncate(config.workspace_symbol.max_num);

    let results: Vec<Value> = scored
        .into_iter()
        .filter_map(|(_, idx)| {
            let symbol = db.symbols[idx];
            let location = db
                .definition_spells(symbol.kind, symbol.id)
                .into_iter()
                .next()?;
            Some(json!({
                "name": db.symbol_detailed_name(idx),
                "kind": lsp_symbol_kind(symbol.kind),
                "location": location_json(state, &location, &db),
            }))
        })
        .collect();
    rpc::response(id, json!(results))
}

fn call_hierarchy(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);
    let callee = params["callee"].as_bool().unwrap_or(false);
    let levels = params["levels"].as_u64().unwrap_or(1).min(5) as usize;

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let Some(sym) = db
        .symbols_at(&path, position)
        .into_iter()
        .find(|s| s.kind == SymbolKind::Func)
    else {
        return rpc::response(id, Value::Null);
    };

    let func_id = scry_core::FuncId::new(sym.id.0);
    rpc::response(
        id,
        call_hierarchy_node(state, &db, func_id, callee, levels),
    )
}

fn call_hierarchy_node(
    state: &ServerState,
    db: &QueryDatabase,
    func_id: scry_core::FuncId,
    callee: bool,
    levels: usize,
) -> Value {
    let func = db.func(func_id);
    let name = func
        .any_def()
        .map(|d| d.detailed_name.clone())
        .unwrap_or_default();
    let location = func
        .any_def()
        .and_then(|d| d.spell)
        .map(|spell| location_json(state, &spell, db));

    let mut children = Vec::new();
    if levels > 0 {
        if callee {
            // Outgoing calls from this function's primary def.
            if let Some(def) = func.any_def() {
                for call in &def.callees {
                    if call.kind == SymbolKind::Func {
                        children.push(call_hierarchy_node(
                            state,
                            db,
                            scry_core::FuncId::new(call.id.0),
                            callee,
                            levels - 1,
                        ));
                    }
                }
            }
        } else {
            // Incoming calls: every use site that lives inside some caller.
            for use_ref in &func.uses {
                if use_ref.kind == SymbolKind::Func && use_ref.role.intersects(Role::CALL) {
                    children.push(call_hierarchy_node(
                        state,
                        db,
                        scry_core::FuncId::new(use_ref.id.0),
                        callee,
                        levels - 1,
                    ));
                }
            }
        }
    }

    json!({
        "name": name,
        "location": location,
        "children": children,
    })
}

fn inheritance_hierarchy(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);
    let derived = params["derived"].as_bool().unwrap_or(true);
    let levels = params["levels"].as_u64().unwrap_or(1).min(5) as usize;

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let Some(sym) = db
        .symbols_at(&path, position)
        .into_iter()
        .find(|s| s.kind == SymbolKind::Type)
    else {
        return rpc::response(id, Value::Null);
    };

    let type_id = scry_core::TypeId::new(sym.id.0);
    rpc::response(
        id,
        inheritance_node(state, &db, type_id, derived, levels),
    )
}

fn inheritance_node(
    state: &ServerState,
    db: &QueryDatabase,
    type_id: scry_core::TypeId,
    derived: bool,
    levels: usize,
) -> Value {
    let ty = db.ty(type_id);
    let name = ty
        .any_def()
        .map(|d| d.detailed_name.clone())
        .unwrap_or_default();
    let location = ty
        .any_def()
        .and_then(|d| d.spell)
        .map(|spell| location_json(state, &spell, db));

    let related: Vec<scry_core::TypeId> = if derived {
        ty.derived.clone()
    } else {
        ty.any_def().map(|d| d.bases.clone()).unwrap_or_default()
    };

    let children: Vec<Value> = if levels > 0 {
        related
            .into_iter()
            .map(|child| inheritance_node(state, db, child, derived, levels - 1))
            .collect()
    } else {
        Vec::new()
    };

    json!({
        "name": name,
        "location": location,
        "children": children,
    })
}

fn vars(state: &Arc<ServerState>, id: &RequestId, params: &Value) -> Value {
    let Some(path) = text_document_path(state, params) else {
        return rpc::error_response(id, error_code::INVALID_PARAMS, "missing textDocument.uri");
    };
    let position = parse_position(&params["position"]);

    let db = state.pipeline.db().read().unwrap_or_else(|e| e.into_inner());
    let mut locations = Vec::new();
    if let Some(sym) = db
        .symbols_at(&path, position)
        .into_iter()
        .find(|s| s.kind == SymbolKind::Type)
    {
        for &var_id in &db.types[sym.id.index()].instances {
            for def in &db.var(var_id).def {
                if let Some(spell) = def.spell {
                    locations.push(location_json(state, &spell, &db));
                }
            }
        }
    }
    rpc::response(id, json!(locations))
}
