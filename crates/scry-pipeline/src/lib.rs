//! The indexing pipeline.
//!
//! Editor events become [`IndexRequest`]s; indexer workers parse them into
//! per-file facts, round-trip through the query-database thread for id
//! minting, diff against the previous indexed version and hand the resulting
//! update back for a single-threaded apply. The [`ImportManager`] keeps a
//! file from being imported twice concurrently, and the
//! [`TimestampManager`] short-circuits requests for unchanged files.

mod import_manager;
mod pipeline;
mod queues;
mod timestamp;

pub use import_manager::{begin_import, finish_import, ImportManager, ImportStatus};
pub use pipeline::{
    file_modification_time, parser_init_guard, ApplyCallback, IndexError, IndexProvider, Pipeline,
    PipelineThreads, Result,
};
pub use queues::{
    DoIdMapRequest, IdMappedResponse, IndexRequest, IndexedUpdate, LoadPreviousIndexRequest,
    QueueSet,
};
pub use timestamp::TimestampManager;
