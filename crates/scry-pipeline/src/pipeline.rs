//! Worker loops that move a file from "edit/save" to "indexed".
//!
//! Indexer threads parse and diff; the query-database thread mints ids and
//! applies updates. The two roles only meet through queues, so the database
//! lock is held for short, bounded sections.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::UNIX_EPOCH;

use scry_cache::IndexCache;
use scry_core::AbsPath;
use scry_index::{FileConsumerSharedState, IndexFile};
use scry_query::{IdMap, IndexUpdate, QueryDatabase};
use scry_sync::QueueState;

use crate::import_manager::{begin_import, finish_import, ImportManager, ImportStatus};
use crate::queues::{
    DoIdMapRequest, IdMappedResponse, IndexRequest, IndexedUpdate, LoadPreviousIndexRequest,
    QueueSet,
};
use crate::TimestampManager;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("parse failed: {0}")]
    Parse(String),
}

/// The external C/C++ parser, as the pipeline sees it.
///
/// Given a path (and optionally the dirty buffer contents), produce the
/// primary `IndexFile` plus one per included header this parse owns. The
/// implementation drives the real parser through a
/// [`FileConsumerSharedState`] so each header has exactly one owner across
/// concurrent translation units.
pub trait IndexProvider: Send + Sync {
    fn index(
        &self,
        path: &AbsPath,
        args: &[String],
        contents: Option<&str>,
    ) -> Result<Vec<IndexFile>>;
}

/// Invoked on the query-database thread after each apply with the paths the
/// update covered.
pub type ApplyCallback = Box<dyn Fn(&[AbsPath]) + Send + Sync>;

pub struct Pipeline {
    queues: Arc<QueueSet>,
    import_manager: Arc<ImportManager>,
    timestamps: Arc<TimestampManager>,
    cache: Arc<IndexCache>,
    provider: Arc<dyn IndexProvider>,
    consumer_shared: Arc<FileConsumerSharedState>,
    db: Arc<RwLock<QueryDatabase>>,
    on_applied: ApplyCallback,
    shutting_down: AtomicBool,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn IndexProvider>,
        cache: Arc<IndexCache>,
        db: Arc<RwLock<QueryDatabase>>,
        on_applied: ApplyCallback,
    ) -> Pipeline {
        Pipeline {
            queues: Arc::new(QueueSet::new()),
            import_manager: Arc::new(ImportManager::new()),
            timestamps: Arc::new(TimestampManager::new()),
            cache,
            provider,
            consumer_shared: Arc::new(FileConsumerSharedState::new()),
            db,
            on_applied,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn import_manager(&self) -> &ImportManager {
        &self.import_manager
    }

    pub fn consumer_shared(&self) -> &Arc<FileConsumerSharedState> {
        &self.consumer_shared
    }

    pub fn db(&self) -> &Arc<RwLock<QueryDatabase>> {
        &self.db
    }

    /// Enqueues an index request. Interactive requests ride the priority
    /// lane.
    pub fn request_index(
        &self,
        path: AbsPath,
        args: Vec<String>,
        is_interactive: bool,
        contents: Option<String>,
    ) {
        self.import_manager.set_status_atomic(&path, begin_import);
        self.queues.index_request.enqueue(
            IndexRequest {
                path,
                args,
                is_interactive,
                contents,
            },
            is_interactive,
        );
    }

    /// Rescans every indexed file by timestamp and re-enqueues the changed
    /// ones plus their reverse-dependency closure.
    pub fn freshen_index(&self) {
        let (paths, reverse_deps) = {
            let db = self.db.read().unwrap_or_else(|e| e.into_inner());
            let mut paths = Vec::new();
            let mut reverse_deps: HashMap<AbsPath, Vec<AbsPath>> = HashMap::new();
            for file in &db.files {
                let Some(def) = &file.def else { continue };
                paths.push(def.path.clone());
                for dep in &def.dependencies {
                    reverse_deps
                        .entry(dep.clone())
                        .or_default()
                        .push(def.path.clone());
                }
            }
            (paths, reverse_deps)
        };

        let mut stale: Vec<AbsPath> = Vec::new();
        for path in &paths {
            let disk = file_modification_time(path);
            let cached = self
                .timestamps
                .last_cached_modification_time(&self.cache, path);
            if disk != cached {
                stale.push(path.clone());
            }
        }

        // Changed files invalidate everything that includes them,
        // transitively.
        let mut to_index: HashSet<AbsPath> = HashSet::new();
        let mut work = stale;
        while let Some(path) = work.pop() {
            if !to_index.insert(path.clone()) {
                continue;
            }
            if let Some(dependents) = reverse_deps.get(&path) {
                work.extend(dependents.iter().cloned());
            }
        }

        tracing::info!(
            target: "scry.index",
            count = to_index.len(),
            "freshen re-enqueueing stale files"
        );
        for path in to_index {
            self.request_index(path, Vec::new(), false, None);
        }
    }

    /// Starts `indexer_threads` indexer workers plus the query-database
    /// thread.
    pub fn start(self: Arc<Self>, indexer_threads: usize) -> PipelineThreads {
        let mut handles = Vec::new();

        for i in 0..indexer_threads.max(1) {
            let pipeline = Arc::clone(&self);
            let handle = std::thread::Builder::new()
                .name(format!("scry-indexer-{i}"))
                .spawn(move || pipeline.indexer_loop())
                .expect("failed to spawn indexer thread");
            handles.push(handle);
        }

        let handle = std::thread::Builder::new()
            .name("scry-querydb".to_string())
            .spawn(move || self.querydb_loop())
            .expect("failed to spawn querydb thread");
        handles.push(handle);

        PipelineThreads { handles }
    }

    /// Asks every worker to exit once its current message is done.
    pub fn stop(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.queues.indexer_waiter().wake_all();
        self.queues.querydb_waiter().wake_all();
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // ---- indexer threads ----

    pub fn indexer_loop(&self) {
        let queues = &self.queues;
        loop {
            if self.is_shutting_down() {
                break;
            }
            let did_work = self.indexer_round();
            if !did_work {
                queues.indexer_waiter().wait_until(
                    &[
                        &queues.index_request as &dyn QueueState,
                        &queues.load_previous_index,
                        &queues.on_id_mapped,
                        &queues.on_indexed_for_merge,
                    ],
                    || self.is_shutting_down(),
                );
            }
        }
    }

    /// Handles at most one message per stage; returns whether anything was
    /// done.
    pub fn indexer_round(&self) -> bool {
        let mut did_work = false;
        if let Some(request) = self.queues.index_request.try_dequeue(true) {
            self.handle_index_request(request);
            did_work = true;
        }
        if let Some(request) = self.queues.load_previous_index.try_dequeue(true) {
            self.handle_load_previous_index(request);
            did_work = true;
        }
        if let Some(response) = self.queues.on_id_mapped.try_dequeue(true) {
            self.handle_id_mapped(response);
            did_work = true;
        }
        if let Some(first) = self.queues.on_indexed_for_merge.try_dequeue(true) {
            self.handle_merge(first);
            did_work = true;
        }
        did_work
    }

    fn handle_index_request(&self, request: IndexRequest) {
        let IndexRequest {
            path,
            args,
            is_interactive,
            contents,
        } = request;

        // Cheap short-circuit: an unchanged on-disk file whose cached
        // timestamp still matches needs no reparse.
        if contents.is_none() {
            let disk = file_modification_time(&path);
            let cached = self
                .timestamps
                .last_cached_modification_time(&self.cache, &path);
            if disk.is_some() && disk == cached {
                tracing::debug!(target: "scry.index", path = %path, "timestamp match; skipping parse");
                self.import_manager.set_status_atomic(&path, finish_import);
                return;
            }
        }

        // Let this parse re-own the primary file.
        self.consumer_shared.reset(&path);

        let produced = match self.provider.index(&path, &args, contents.as_deref()) {
            Ok(produced) => produced,
            Err(err) => {
                tracing::warn!(
                    target: "scry.index",
                    path = %path,
                    error = %err,
                    "parse failed; keeping previous index state"
                );
                return;
            }
        };

        let produced_paths: Vec<AbsPath> = produced.iter().map(|f| f.path.clone()).collect();
        self.import_manager
            .set_status_atomic_batch(&produced_paths, begin_import);

        for index in produced {
            self.timestamps
                .update(&index.path, index.last_modification_time);
            self.queues.do_id_map.enqueue(
                DoIdMapRequest {
                    previous: None,
                    current: index,
                    is_interactive,
                    write_to_disk: true,
                    previous_loaded: false,
                },
                is_interactive,
            );
        }
    }

    fn handle_load_previous_index(&self, request: LoadPreviousIndexRequest) {
        let mut inner = request.request;
        inner.previous = self.cache.load(&inner.current.path);
        inner.previous_loaded = true;
        let priority = inner.is_interactive;
        self.queues.do_id_map.enqueue(inner, priority);
    }

    fn handle_id_mapped(&self, response: IdMappedResponse) {
        let IdMappedResponse {
            previous,
            current,
            current_id_map,
            is_interactive,
            write_to_disk,
        } = response;

        if write_to_disk {
            if let Err(err) = self.cache.store(&current) {
                tracing::warn!(
                    target: "scry.index",
                    path = %current.path,
                    error = %err,
                    "failed to persist index cache entry"
                );
            }
        }

        let update = match &previous {
            Some((prev_file, prev_map)) => IndexUpdate::create_delta(
                Some(prev_map),
                &current_id_map,
                Some(prev_file),
                &current,
            ),
            None => IndexUpdate::create_delta(None, &current_id_map, None, &current),
        };

        self.queues
            .on_indexed_for_merge
            .enqueue(
                IndexedUpdate {
                    update,
                    is_interactive,
                },
                is_interactive,
            );
    }

    /// Coalesces adjacent updates before they reach the query-database
    /// thread.
    fn handle_merge(&self, first: IndexedUpdate) {
        let mut merged = first;
        while let Some(next) = self.queues.on_indexed_for_merge.try_dequeue(true) {
            merged.update.merge(next.update);
            merged.is_interactive |= next.is_interactive;
        }
        let priority = merged.is_interactive;
        self.queues.on_indexed_for_querydb.enqueue(merged, priority);
    }

    // ---- query-database thread ----

    pub fn querydb_loop(&self) {
        let queues = &self.queues;
        loop {
            if self.is_shutting_down() {
                break;
            }
            let did_work = self.querydb_round();
            if !did_work {
                queues.querydb_waiter().wait_until(
                    &[
                        &queues.do_id_map as &dyn QueueState,
                        &queues.on_indexed_for_querydb,
                    ],
                    || self.is_shutting_down(),
                );
            }
        }
    }

    /// Drains both querydb-side queues; returns whether anything was done.
    pub fn querydb_round(&self) -> bool {
        let mut did_work = false;

        while let Some(request) = self.queues.do_id_map.try_dequeue(true) {
            did_work = true;
            self.handle_do_id_map(request);
        }

        while let Some(indexed) = self.queues.on_indexed_for_querydb.try_dequeue(true) {
            did_work = true;
            self.handle_apply(indexed.update);
        }

        did_work
    }

    fn handle_do_id_map(&self, request: DoIdMapRequest) {
        // An already-imported file needs its previous index to diff against;
        // loading it from the disk cache is I/O and belongs on an indexer
        // thread.
        if !request.previous_loaded
            && request.previous.is_none()
            && self.import_manager.status(&request.current.path) == ImportStatus::ProcessingUpdate
        {
            let priority = request.is_interactive;
            self.queues
                .load_previous_index
                .enqueue(LoadPreviousIndexRequest { request }, priority);
            return;
        }

        let DoIdMapRequest {
            previous,
            current,
            is_interactive,
            write_to_disk,
            previous_loaded: _,
        } = request;

        let (previous, current_id_map) = {
            let mut db = self.db.write().unwrap_or_else(|e| e.into_inner());
            let previous = previous.map(|file| {
                let id_map = IdMap::new(&mut db, &file);
                (file, id_map)
            });
            let current_id_map = IdMap::new(&mut db, &current);
            (previous, current_id_map)
        };

        self.queues.on_id_mapped.enqueue(
            IdMappedResponse {
                previous,
                current,
                current_id_map,
                is_interactive,
                write_to_disk,
            },
            is_interactive,
        );
    }

    fn handle_apply(&self, update: IndexUpdate) {
        let applied_paths: Vec<AbsPath> = update
            .files_def_update
            .iter()
            .map(|(_, def)| def.path.clone())
            .collect();

        {
            let mut db = self.db.write().unwrap_or_else(|e| e.into_inner());
            db.apply_update(update);
        }

        self.import_manager
            .set_status_atomic_batch(&applied_paths, finish_import);
        (self.on_applied)(&applied_paths);
    }
}

/// Join handles for the running pipeline threads.
pub struct PipelineThreads {
    handles: Vec<JoinHandle<()>>,
}

impl PipelineThreads {
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// The parser's global initialization (target registries) is not
/// thread-safe. Providers serialize the first construction of an index per
/// process through this lock.
static PARSER_GLOBAL_INIT: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub fn parser_init_guard() -> std::sync::MutexGuard<'static, ()> {
    PARSER_GLOBAL_INIT
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// Seconds-precision mtime of `path`, if it exists.
pub fn file_modification_time(path: &AbsPath) -> Option<i64> {
    let metadata = std::fs::metadata(path.as_path()).ok()?;
    let modified = metadata.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}
