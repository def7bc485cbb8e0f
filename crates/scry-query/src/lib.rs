//! The global cross-file symbol database.
//!
//! `QueryDatabase` is a columnar store of files, types, functions and
//! variables built up by merging per-file index facts from many translation
//! units. It is owned by a single thread; indexer threads talk to it in two
//! narrow windows: minting query ids (building an [`IdMap`]) and applying a
//! finished [`IndexUpdate`].
//!
//! Ids are minted on first sight of a USR and never reused. Removal
//! tombstones the symbol-index entry (`kind = Invalid`) instead of
//! compacting vectors, which lets every edge hold plain ids with no
//! lifetime concerns.

mod db;
mod highlight;
mod id_map;
mod types;
mod update;

pub use db::QueryDatabase;
pub use highlight::SemanticHighlightCache;
pub use id_map::IdMap;
pub use types::{
    MergeableUpdate, QueryFile, QueryFileDef, QueryFunc, QueryFuncDef, QueryRef, QueryType,
    QueryTypeDef, QueryVar, QueryVarDef, SymbolIdx, SymbolRef, WithFile,
};
pub use update::IndexUpdate;
