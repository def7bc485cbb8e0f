//! Raw per-translation-unit index facts.
//!
//! An [`IndexFile`] is the denormalized output of parsing one translation
//! unit (or one header owned by that parse): every type, function and
//! variable the parser saw, with declarations, uses and graph edges expressed
//! in *local* ids that are only meaningful within this file. The query layer
//! translates these to global ids and diffs them against the previous
//! version.

mod consumer;
mod index_file;

pub use consumer::{FileConsumer, FileConsumerSharedState};
pub use index_file::{
    FuncDef, IndexFile, IndexFunc, IndexInclude, IndexType, IndexVar, LocalRef, TypeDef, VarDef,
};
