//! Concurrency building blocks for the indexing pipeline.
//!
//! Nothing here knows about indexes or symbols; these are the queues, caches
//! and blocking cells the pipeline and the completion manager are built out
//! of.

mod atomic;
mod lru;
mod queue;

pub use atomic::AtomicObject;
pub use lru::LruCache;
pub use queue::{MultiQueueWaiter, QueueState, ThreadedQueue};
