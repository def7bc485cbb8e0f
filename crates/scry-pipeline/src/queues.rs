//! The pipeline's queues and the messages that flow through them.

use std::sync::Arc;

use scry_core::AbsPath;
use scry_index::IndexFile;
use scry_query::{IdMap, IndexUpdate};
use scry_sync::{MultiQueueWaiter, ThreadedQueue};

/// A file the editor (or the freshen walk) wants indexed.
#[derive(Debug)]
pub struct IndexRequest {
    pub path: AbsPath,
    pub args: Vec<String>,
    /// Interactive requests ride the priority lane through every stage.
    pub is_interactive: bool,
    /// Dirty buffer contents, or `Some("")` for a deleted file. `None`
    /// parses from disk.
    pub contents: Option<String>,
}

/// Ask the query-database thread to mint query ids for one produced file.
pub struct DoIdMapRequest {
    pub previous: Option<IndexFile>,
    pub current: IndexFile,
    pub is_interactive: bool,
    pub write_to_disk: bool,
    /// Set once the load-previous-index round trip has run, so a file whose
    /// cache entry is missing is not bounced forever.
    pub previous_loaded: bool,
}

/// Load the previous index from the disk cache, then resubmit.
pub struct LoadPreviousIndexRequest {
    pub request: DoIdMapRequest,
}

/// Ids are minted; an indexer thread can now build the delta.
pub struct IdMappedResponse {
    pub previous: Option<(IndexFile, IdMap)>,
    pub current: IndexFile,
    pub current_id_map: IdMap,
    pub is_interactive: bool,
    pub write_to_disk: bool,
}

/// A finished update on its way to (or through) the merge stage.
pub struct IndexedUpdate {
    pub update: IndexUpdate,
    pub is_interactive: bool,
}

/// All pipeline queues, with one waiter per consuming thread role so a
/// consumer can block on everything it drains.
pub struct QueueSet {
    pub index_request: ThreadedQueue<IndexRequest>,
    pub load_previous_index: ThreadedQueue<LoadPreviousIndexRequest>,
    pub do_id_map: ThreadedQueue<DoIdMapRequest>,
    pub on_id_mapped: ThreadedQueue<IdMappedResponse>,
    pub on_indexed_for_merge: ThreadedQueue<IndexedUpdate>,
    pub on_indexed_for_querydb: ThreadedQueue<IndexedUpdate>,

    indexer_waiter: Arc<MultiQueueWaiter>,
    querydb_waiter: Arc<MultiQueueWaiter>,
}

impl QueueSet {
    pub fn new() -> QueueSet {
        let indexer_waiter = MultiQueueWaiter::new();
        let querydb_waiter = MultiQueueWaiter::new();
        QueueSet {
            index_request: ThreadedQueue::with_waiter(Arc::clone(&indexer_waiter)),
            load_previous_index: ThreadedQueue::with_waiter(Arc::clone(&indexer_waiter)),
            do_id_map: ThreadedQueue::with_waiter(Arc::clone(&querydb_waiter)),
            on_id_mapped: ThreadedQueue::with_waiter(Arc::clone(&indexer_waiter)),
            on_indexed_for_merge: ThreadedQueue::with_waiter(Arc::clone(&indexer_waiter)),
            on_indexed_for_querydb: ThreadedQueue::with_waiter(Arc::clone(&querydb_waiter)),
            indexer_waiter,
            querydb_waiter,
        }
    }

    pub fn indexer_waiter(&self) -> &MultiQueueWaiter {
        &self.indexer_waiter
    }

    pub fn querydb_waiter(&self) -> &MultiQueueWaiter {
        &self.querydb_waiter
    }

    /// True while any stage still has queued work.
    pub fn has_work(&self) -> bool {
        !self.index_request.is_empty()
            || !self.load_previous_index.is_empty()
            || !self.do_id_map.is_empty()
            || !self.on_id_mapped.is_empty()
            || !self.on_indexed_for_merge.is_empty()
            || !self.on_indexed_for_querydb.is_empty()
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        QueueSet::new()
    }
}
