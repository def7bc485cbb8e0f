//! Completion sessions and their workers.
//!
//! A session owns two translation units (completion and diagnostics), each
//! behind its own lock. Sessions live in two LRU caches: `preloaded` for
//! files the user has merely viewed, `completion` for files completion
//! actually ran in; the latter is rarer and longer-lived. Workers consume
//! requests from the manager's queues; completion callbacks may run on any
//! thread.

mod cache;
mod session;

pub use cache::{CodeCompleteCache, CodeCompleteCacheView};
pub use session::{CompletionSession, TuSlot};

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use scry_core::{AbsPath, Position};
use scry_sync::{LruCache, ThreadedQueue};

pub type Result<T> = std::result::Result<T, CompletionError>;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("translation unit unavailable")]
    NoTranslationUnit,
}

/// A parsed translation unit owned by one session slot.
pub trait TranslationUnit: Send {
    /// Re-parse against the current buffer contents.
    fn reparse(&mut self) -> Result<()>;
    fn complete(&mut self, position: Position) -> Result<Vec<lsp_types::CompletionItem>>;
    fn diagnostics(&mut self) -> Result<Vec<lsp_types::Diagnostic>>;
}

/// The external parser, as the completion cache sees it.
pub trait TranslationUnitHost: Send + Sync {
    fn parse(&self, path: &AbsPath) -> Result<Box<dyn TranslationUnit>>;
}

/// Client request id; the transport layer normalizes integers to their
/// decimal spelling.
pub type RequestId = String;

/// Invoked with the completion results and whether they came from a result
/// cache. May run on any thread; must not assume any lock is held.
pub type OnComplete = Box<dyn FnOnce(Vec<lsp_types::CompletionItem>, bool) + Send>;
/// Invoked when fresh diagnostics for a path are available.
pub type OnDiagnostic = Box<dyn Fn(AbsPath, Vec<lsp_types::Diagnostic>) + Send + Sync>;
/// Invoked when a queued completion request was superseded before running.
pub type OnDropped = Box<dyn Fn(RequestId) + Send + Sync>;

pub struct CompletionRequest {
    pub id: Option<RequestId>,
    pub path: AbsPath,
    pub position: Position,
    pub on_complete: OnComplete,
}

enum CompletionMessage {
    /// Serve the named session's pending request, if it still has one.
    Dispatch(Arc<CompletionSession>),
    Shutdown,
}

enum DiagnosticsMessage {
    Update(AbsPath),
    Shutdown,
}

enum PreloadMessage {
    Reparse(AbsPath),
    Shutdown,
}

const MAX_PRELOADED_SESSIONS: usize = 10;
const MAX_COMPLETION_SESSIONS: usize = 5;

struct SessionCaches {
    preloaded: LruCache<AbsPath, Arc<CompletionSession>>,
    completion: LruCache<AbsPath, Arc<CompletionSession>>,
}

pub struct CompletionManager {
    host: Arc<dyn TranslationUnitHost>,
    on_diagnostic: OnDiagnostic,
    on_dropped: OnDropped,

    sessions: Mutex<SessionCaches>,

    /// FIFO of sessions with a pending completion. The request itself sits
    /// in the session's own slot, where a newer same-file request can
    /// supersede it without touching other files' requests.
    completion_requests: ThreadedQueue<CompletionMessage>,
    diagnostics_requests: ThreadedQueue<DiagnosticsMessage>,
    preload_requests: ThreadedQueue<PreloadMessage>,
}

impl CompletionManager {
    pub fn new(
        host: Arc<dyn TranslationUnitHost>,
        on_diagnostic: OnDiagnostic,
        on_dropped: OnDropped,
    ) -> CompletionManager {
        CompletionManager {
            host,
            on_diagnostic,
            on_dropped,
            sessions: Mutex::new(SessionCaches {
                preloaded: LruCache::new(MAX_PRELOADED_SESSIONS),
                completion: LruCache::new(MAX_COMPLETION_SESSIONS),
            }),
            completion_requests: ThreadedQueue::new(),
            diagnostics_requests: ThreadedQueue::new(),
            preload_requests: ThreadedQueue::new(),
        }
    }

    // ---- notifications from the editor ----

    /// The file is visible; begin preloading completion data for it.
    pub fn notify_view(&self, path: &AbsPath) {
        if self.ensure_session(path) {
            self.preload_requests
                .enqueue(PreloadMessage::Reparse(path.clone()), false);
        }
    }

    /// The file was edited; keep its session warm in the LRU.
    pub fn notify_edit(&self, path: &AbsPath) {
        let _ = self.try_get_session(path, false, false);
    }

    /// The file was saved; reparse both translation units.
    pub fn notify_save(&self, path: &AbsPath) {
        self.ensure_session(path);
        self.preload_requests
            .enqueue(PreloadMessage::Reparse(path.clone()), false);
        self.diagnostics_requests
            .enqueue(DiagnosticsMessage::Update(path.clone()), false);
    }

    /// The file was closed; drop its session.
    pub fn notify_close(&self, path: &AbsPath) {
        self.flush_session(path);
    }

    pub fn flush_session(&self, path: &AbsPath) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.preloaded.take(path);
        sessions.completion.take(path);
    }

    pub fn flush_all_sessions(&self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.preloaded.clear();
        sessions.completion.clear();
    }

    // ---- requests ----

    /// Queues a completion at `position`. If an earlier request for the
    /// same file is still waiting for the worker it is dropped and its
    /// owner notified via `on_dropped`; pending requests for other files
    /// are untouched.
    pub fn code_complete(
        &self,
        id: Option<RequestId>,
        path: AbsPath,
        position: Position,
        on_complete: OnComplete,
    ) {
        let Some(session) = self.try_get_session(&path, true, true) else {
            return;
        };
        let request = CompletionRequest {
            id,
            path,
            position,
            on_complete,
        };
        let mut dropped = None;
        session.pending_completion.with_lock(|slot| {
            if let Some(old) = slot.take() {
                dropped = old.id;
            }
            *slot = Some(request);
        });
        if let Some(id) = dropped {
            (self.on_dropped)(id);
        }
        self.completion_requests
            .enqueue(CompletionMessage::Dispatch(session), false);
    }

    /// Schedules a diagnostics reparse for `path`.
    pub fn diagnostics_update(&self, path: &AbsPath) {
        self.diagnostics_requests
            .enqueue(DiagnosticsMessage::Update(path.clone()), false);
    }

    // ---- sessions ----

    /// Makes sure a session exists somewhere; returns true when a new
    /// preload session was created.
    fn ensure_session(&self, path: &AbsPath) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.completion.try_get(path).is_some() || sessions.preloaded.try_get(path).is_some()
        {
            return false;
        }
        sessions.preloaded.insert(
            path.clone(),
            Arc::new(CompletionSession::new(path.clone())),
        );
        true
    }

    /// Finds the session for `path`. `mark_as_completion` migrates a
    /// preloaded session into the completion cache (the user actually
    /// completed there).
    pub fn try_get_session(
        &self,
        path: &AbsPath,
        mark_as_completion: bool,
        create_if_needed: bool,
    ) -> Option<Arc<CompletionSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(session) = sessions.completion.get(path) {
            return Some(Arc::clone(session));
        }

        if let Some(session) = sessions.preloaded.get(path).map(Arc::clone) {
            if mark_as_completion {
                sessions.preloaded.take(path);
                sessions.completion.insert(path.clone(), Arc::clone(&session));
            }
            return Some(session);
        }

        if !create_if_needed {
            return None;
        }
        let session = Arc::new(CompletionSession::new(path.clone()));
        if mark_as_completion {
            sessions.completion.insert(path.clone(), Arc::clone(&session));
        } else {
            sessions.preloaded.insert(path.clone(), Arc::clone(&session));
        }
        Some(session)
    }

    #[cfg(test)]
    fn session_counts(&self) -> (usize, usize) {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        (sessions.preloaded.len(), sessions.completion.len())
    }

    // ---- workers ----

    /// Starts the completion, diagnostics and preload workers.
    pub fn start(self: Arc<Self>) -> CompletionThreads {
        let spawn = |name: &str, f: Box<dyn FnOnce() + Send>| {
            std::thread::Builder::new()
                .name(name.to_string())
                .spawn(f)
                .expect("failed to spawn completion worker")
        };

        let manager = Arc::clone(&self);
        let completion = spawn("scry-complete", Box::new(move || manager.completion_loop()));
        let manager = Arc::clone(&self);
        let diagnostics = spawn(
            "scry-diagnostics",
            Box::new(move || manager.diagnostics_loop()),
        );
        let preload = spawn("scry-preload", Box::new(move || self.preload_loop()));

        CompletionThreads {
            handles: vec![completion, diagnostics, preload],
        }
    }

    pub fn stop(&self) {
        self.completion_requests
            .enqueue(CompletionMessage::Shutdown, true);
        self.diagnostics_requests
            .enqueue(DiagnosticsMessage::Shutdown, true);
        self.preload_requests.enqueue(PreloadMessage::Shutdown, true);
    }

    fn completion_loop(&self) {
        while self.completion_round() {}
    }

    /// Serves one dispatched session; returns false on shutdown.
    ///
    /// The session handle rides the queue, so a session evicted from the
    /// LRU between enqueue and dispatch still gets its reply.
    fn completion_round(&self) -> bool {
        let session = match self.completion_requests.dequeue() {
            CompletionMessage::Dispatch(session) => session,
            CompletionMessage::Shutdown => return false,
        };

        let mut pending = None;
        session.pending_completion.with_lock(|slot| {
            pending = slot.take();
        });
        let Some(request) = pending else {
            // An earlier dispatch for this session already served the
            // (coalesced) request.
            return true;
        };

        let results = match session.complete_at(self.host.as_ref(), request.position) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(
                    target: "scry.complete",
                    path = %request.path,
                    error = %err,
                    "code completion failed"
                );
                Vec::new()
            }
        };
        (request.on_complete)(results, false);
        true
    }

    fn diagnostics_loop(&self) {
        loop {
            let path = match self.diagnostics_requests.dequeue() {
                DiagnosticsMessage::Update(path) => path,
                DiagnosticsMessage::Shutdown => break,
            };
            self.diagnostics_round(&path);
        }
    }

    fn diagnostics_round(&self, path: &AbsPath) {
        let Some(session) = self.try_get_session(path, false, true) else {
            return;
        };
        let diagnostics = session.diagnostics.with_tu(self.host.as_ref(), path, |tu| {
            tu.reparse()?;
            tu.diagnostics()
        });
        match diagnostics {
            Ok(diagnostics) => (self.on_diagnostic)(path.clone(), diagnostics),
            Err(err) => {
                // Keep the client's previous diagnostics rather than
                // flashing them away on a transient parse failure.
                tracing::warn!(
                    target: "scry.complete",
                    path = %path,
                    error = %err,
                    "diagnostics update failed"
                );
            }
        }
    }

    fn preload_loop(&self) {
        loop {
            let path = match self.preload_requests.dequeue() {
                PreloadMessage::Reparse(path) => path,
                PreloadMessage::Shutdown => break,
            };
            self.preload_round(&path);
        }
    }

    fn preload_round(&self, path: &AbsPath) {
        let Some(session) = self.try_get_session(path, false, true) else {
            return;
        };
        if let Err(err) = session.completion.reparse(self.host.as_ref(), path) {
            tracing::warn!(
                target: "scry.complete",
                path = %path,
                error = %err,
                "preload parse failed"
            );
        }
    }
}

pub struct CompletionThreads {
    handles: Vec<JoinHandle<()>>,
}

impl CompletionThreads {
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTu {
        path: AbsPath,
        reparses: usize,
    }

    impl TranslationUnit for FakeTu {
        fn reparse(&mut self) -> Result<()> {
            self.reparses += 1;
            Ok(())
        }

        fn complete(&mut self, position: Position) -> Result<Vec<lsp_types::CompletionItem>> {
            Ok(vec![lsp_types::CompletionItem {
                label: format!("{}:{}:{}", self.path, position.line, position.column),
                ..lsp_types::CompletionItem::default()
            }])
        }

        fn diagnostics(&mut self) -> Result<Vec<lsp_types::Diagnostic>> {
            Ok(vec![lsp_types::Diagnostic {
                message: format!("diag for {}", self.path),
                ..lsp_types::Diagnostic::default()
            }])
        }
    }

    struct FakeHost {
        parses: AtomicUsize,
    }

    impl FakeHost {
        fn new() -> FakeHost {
            FakeHost {
                parses: AtomicUsize::new(0),
            }
        }
    }

    impl TranslationUnitHost for FakeHost {
        fn parse(&self, path: &AbsPath) -> Result<Box<dyn TranslationUnit>> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeTu {
                path: path.clone(),
                reparses: 0,
            }))
        }
    }

    fn manager() -> (Arc<CompletionManager>, Arc<Mutex<Vec<RequestId>>>) {
        let dropped = Arc::new(Mutex::new(Vec::new()));
        let dropped_sink = Arc::clone(&dropped);
        let manager = Arc::new(CompletionManager::new(
            Arc::new(FakeHost::new()),
            Box::new(|_path, _diags| {}),
            Box::new(move |id| dropped_sink.lock().unwrap().push(id)),
        ));
        (manager, dropped)
    }

    #[test]
    fn view_creates_a_preload_session_once() {
        let (manager, _) = manager();
        let path = AbsPath::new("/a.cc");
        manager.notify_view(&path);
        manager.notify_view(&path);
        assert_eq!(manager.session_counts(), (1, 0));
        // Only the first view queued a preload.
        assert_eq!(manager.preload_requests.len(), 1);
    }

    #[test]
    fn preload_cache_is_bounded() {
        let (manager, _) = manager();
        for i in 0..(MAX_PRELOADED_SESSIONS + 4) {
            manager.notify_view(&AbsPath::new(&format!("/f{i}.cc")));
        }
        let (preloaded, completion) = manager.session_counts();
        assert_eq!(preloaded, MAX_PRELOADED_SESSIONS);
        assert_eq!(completion, 0);
    }

    #[test]
    fn completing_promotes_a_session_out_of_preload() {
        let (manager, _) = manager();
        let path = AbsPath::new("/a.cc");
        manager.notify_view(&path);

        let session = manager.try_get_session(&path, true, false).unwrap();
        assert_eq!(session.path, path);
        assert_eq!(manager.session_counts(), (0, 1));
    }

    #[test]
    fn newer_request_supersedes_pending_one() {
        let (manager, dropped) = manager();
        let path = AbsPath::new("/a.cc");

        manager.code_complete(
            Some("1".to_string()),
            path.clone(),
            Position::new(0, 0),
            Box::new(|_, _| panic!("superseded request must not complete")),
        );
        let (results_tx, results_rx) = std::sync::mpsc::channel();
        manager.code_complete(
            Some("2".to_string()),
            path.clone(),
            Position::new(1, 2),
            Box::new(move |results, is_cached| {
                results_tx.send((results, is_cached)).unwrap();
            }),
        );

        assert_eq!(dropped.lock().unwrap().as_slice(), &["1".to_string()]);

        // Serve the surviving request.
        assert!(manager.completion_round());
        let (results, is_cached) = results_rx.recv().unwrap();
        assert!(!is_cached);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "/a.cc:1:2");

        // The second dispatch marker finds the slot already drained.
        assert!(manager.completion_round());
    }

    #[test]
    fn requests_for_different_files_do_not_supersede() {
        let (manager, dropped) = manager();

        let (a_tx, a_rx) = std::sync::mpsc::channel();
        manager.code_complete(
            Some("1".to_string()),
            AbsPath::new("/a.cc"),
            Position::new(0, 0),
            Box::new(move |results, _| a_tx.send(results).unwrap()),
        );
        let (b_tx, b_rx) = std::sync::mpsc::channel();
        manager.code_complete(
            Some("2".to_string()),
            AbsPath::new("/b.cc"),
            Position::new(0, 0),
            Box::new(move |results, _| b_tx.send(results).unwrap()),
        );

        // A request in one file never drops a pending request in another.
        assert!(dropped.lock().unwrap().is_empty());

        assert!(manager.completion_round());
        assert!(manager.completion_round());
        assert_eq!(a_rx.recv().unwrap()[0].label, "/a.cc:0:0");
        assert_eq!(b_rx.recv().unwrap()[0].label, "/b.cc:0:0");
        assert!(dropped.lock().unwrap().is_empty());
    }

    #[test]
    fn diagnostics_round_reports_through_callback() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let manager = CompletionManager::new(
            Arc::new(FakeHost::new()),
            Box::new(move |path, diags| {
                sink.lock().unwrap().push((path, diags.len()));
            }),
            Box::new(|_| {}),
        );

        let path = AbsPath::new("/a.cc");
        manager.diagnostics_round(&path);
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, path);
        assert_eq!(reported[0].1, 1);
    }

    #[test]
    fn shutdown_stops_the_completion_worker() {
        let (manager, _) = manager();
        manager.stop();
        assert!(!manager.completion_round());
    }
}
