//! Query-space entities and update payloads.

use serde::{Deserialize, Serialize};

use scry_core::{
    AbsPath, AnyId, FileId, FuncId, Language, Range, Role, StorageClass, SymbolKind, TypeId, Usr,
    VarId,
};
use scry_index::IndexInclude;

/// A symbol occurrence within a known file: `(file, range, id, kind, role)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryRef {
    pub file: FileId,
    pub range: Range,
    pub id: AnyId,
    pub kind: SymbolKind,
    pub role: Role,
}

/// A symbol occurrence inside one file's own tables (`outline`,
/// `all_symbols`); the file is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub range: Range,
    pub id: AnyId,
    pub kind: SymbolKind,
    pub role: Role,
}

/// Entry in the flat symbol index. Tombstoned (`kind = Invalid`) when the
/// entity it points at loses its last def.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolIdx {
    pub id: AnyId,
    pub kind: SymbolKind,
}

/// `(file, entity)` pair identifying "remove every def this file contributed
/// to this entity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithFile<I> {
    pub file: FileId,
    pub id: I,
}

/// Edge add/remove payload for one entity, coalescible by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeableUpdate<I, V> {
    pub id: I,
    pub to_add: Vec<V>,
    pub to_remove: Vec<V>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFileDef {
    pub path: AbsPath,
    pub language: Language,
    pub includes: Vec<IndexInclude>,
    pub dependencies: Vec<AbsPath>,
    pub inactive_regions: Vec<Range>,
    /// Document outline, sorted by range start.
    pub outline: Vec<SymbolRef>,
    /// Every symbol occurrence in the file, sorted by range start. This is
    /// the table `(file, position)` lookups scan.
    pub all_symbols: Vec<SymbolRef>,
}

#[derive(Debug)]
pub struct QueryFile {
    pub path: AbsPath,
    pub def: Option<QueryFileDef>,
    pub symbol_idx: Option<usize>,
}

impl QueryFile {
    pub fn new(path: AbsPath) -> QueryFile {
        QueryFile {
            path,
            def: None,
            symbol_idx: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTypeDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub file: FileId,
    pub spell: Option<QueryRef>,
    pub extent: Option<QueryRef>,
    pub bases: Vec<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFuncDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub storage: StorageClass,
    pub file: FileId,
    pub spell: Option<QueryRef>,
    pub extent: Option<QueryRef>,
    pub bases: Vec<FuncId>,
    /// Call sites inside this function's body.
    pub callees: Vec<QueryRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryVarDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub storage: StorageClass,
    pub parent_kind: SymbolKind,
    pub var_type: Option<TypeId>,
    pub file: FileId,
    pub spell: Option<QueryRef>,
    pub extent: Option<QueryRef>,
}

impl QueryVarDef {
    pub fn is_local(&self) -> bool {
        match self.storage {
            StorageClass::Auto | StorageClass::Register => true,
            StorageClass::None | StorageClass::Invalid => self.parent_kind == SymbolKind::Func,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct QueryType {
    pub usr: Usr,
    /// One def per defining file; the front def is primary.
    pub def: Vec<QueryTypeDef>,
    pub declarations: Vec<QueryRef>,
    pub derived: Vec<TypeId>,
    pub instances: Vec<VarId>,
    pub uses: Vec<QueryRef>,
    pub symbol_idx: Option<usize>,
}

impl QueryType {
    pub fn new(usr: Usr) -> QueryType {
        QueryType {
            usr,
            def: Vec::new(),
            declarations: Vec::new(),
            derived: Vec::new(),
            instances: Vec::new(),
            uses: Vec::new(),
            symbol_idx: None,
        }
    }

    pub fn any_def(&self) -> Option<&QueryTypeDef> {
        self.def.first()
    }
}

#[derive(Debug)]
pub struct QueryFunc {
    pub usr: Usr,
    pub def: Vec<QueryFuncDef>,
    pub declarations: Vec<QueryRef>,
    pub derived: Vec<FuncId>,
    pub uses: Vec<QueryRef>,
    pub symbol_idx: Option<usize>,
}

impl QueryFunc {
    pub fn new(usr: Usr) -> QueryFunc {
        QueryFunc {
            usr,
            def: Vec::new(),
            declarations: Vec::new(),
            derived: Vec::new(),
            uses: Vec::new(),
            symbol_idx: None,
        }
    }

    pub fn any_def(&self) -> Option<&QueryFuncDef> {
        self.def.first()
    }
}

#[derive(Debug)]
pub struct QueryVar {
    pub usr: Usr,
    pub def: Vec<QueryVarDef>,
    pub declarations: Vec<QueryRef>,
    pub uses: Vec<QueryRef>,
    pub symbol_idx: Option<usize>,
}

impl QueryVar {
    pub fn new(usr: Usr) -> QueryVar {
        QueryVar {
            usr,
            def: Vec::new(),
            declarations: Vec::new(),
            uses: Vec::new(),
            symbol_idx: None,
        }
    }

    pub fn any_def(&self) -> Option<&QueryVarDef> {
        self.def.first()
    }
}

/// Slices `detailed_name` down to the symbol's short name.
pub(crate) fn short_name(detailed_name: &str, offset: usize, size: usize) -> &str {
    detailed_name.get(offset..offset + size).unwrap_or("")
}

impl QueryTypeDef {
    pub fn short_name(&self) -> &str {
        short_name(&self.detailed_name, self.short_name_offset, self.short_name_size)
    }
}

impl QueryFuncDef {
    pub fn short_name(&self) -> &str {
        short_name(&self.detailed_name, self.short_name_offset, self.short_name_size)
    }
}

impl QueryVarDef {
    pub fn short_name(&self) -> &str {
        short_name(&self.detailed_name, self.short_name_offset, self.short_name_size)
    }
}
