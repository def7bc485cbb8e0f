//! The denormalized symbol snapshot for one parsed file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use scry_core::{
    AbsPath, Language, LocalFuncId, LocalTypeId, LocalVarId, Range, Role, StorageClass, SymbolKind,
    Usr,
};

/// A symbol occurrence inside the indexed file.
///
/// `kind`/`id` form a tagged reference into this file's local id space;
/// `kind == Invalid` means the occurrence has no interesting target (e.g. a
/// free-standing declaration site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalRef {
    pub range: Range,
    pub id: u32,
    pub kind: SymbolKind,
    pub role: Role,
}

impl LocalRef {
    pub fn new(range: Range, id: u32, kind: SymbolKind, role: Role) -> LocalRef {
        LocalRef {
            range,
            id,
            kind,
            role,
        }
    }

    /// A reference with no target symbol.
    pub fn plain(range: Range, role: Role) -> LocalRef {
        LocalRef {
            range,
            id: 0,
            kind: SymbolKind::Invalid,
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub spell: Option<LocalRef>,
    pub extent: Option<LocalRef>,
    pub bases: Vec<LocalTypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FuncDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub storage: StorageClass,
    pub spell: Option<LocalRef>,
    pub extent: Option<LocalRef>,
    pub bases: Vec<LocalFuncId>,
    /// Call sites inside this function's body.
    pub callees: Vec<LocalRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VarDef {
    pub detailed_name: String,
    pub short_name_offset: usize,
    pub short_name_size: usize,
    pub hover: String,
    pub comments: String,
    pub storage: StorageClass,
    /// Kind of the lexical parent; function-scoped variables with plain
    /// storage are locals.
    pub parent_kind: SymbolKind,
    /// The variable's type, when the parser resolved one.
    pub var_type: Option<LocalTypeId>,
    pub spell: Option<LocalRef>,
    pub extent: Option<LocalRef>,
}

impl VarDef {
    /// Local variables are kept out of the symbol index: they are never
    /// interesting for workspace-wide queries.
    pub fn is_local(&self) -> bool {
        match self.storage {
            StorageClass::Auto | StorageClass::Register => true,
            StorageClass::None | StorageClass::Invalid => self.parent_kind == SymbolKind::Func,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexType {
    pub id: LocalTypeId,
    pub usr: Usr,
    pub def: TypeDef,
    pub declarations: Vec<LocalRef>,
    pub derived: Vec<LocalTypeId>,
    pub instances: Vec<LocalVarId>,
    pub uses: Vec<LocalRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFunc {
    pub id: LocalFuncId,
    pub usr: Usr,
    pub def: FuncDef,
    pub declarations: Vec<LocalRef>,
    pub derived: Vec<LocalFuncId>,
    pub uses: Vec<LocalRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexVar {
    pub id: LocalVarId,
    pub usr: Usr,
    pub def: VarDef,
    pub declarations: Vec<LocalRef>,
    pub uses: Vec<LocalRef>,
}

/// A resolved `#include` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInclude {
    pub line: u32,
    pub resolved_path: AbsPath,
}

/// Everything the parser learned about one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    pub path: AbsPath,
    pub language: Language,
    /// Arguments the translation unit was parsed with.
    pub args: Vec<String>,
    pub includes: Vec<IndexInclude>,
    /// Files this one depends on (transitive includes), used by the freshen
    /// walk to re-enqueue reverse dependencies.
    pub dependencies: Vec<AbsPath>,
    /// Regions disabled by the preprocessor.
    pub skipped_by_preprocessor: Vec<Range>,
    pub last_modification_time: i64,

    pub types: Vec<IndexType>,
    pub funcs: Vec<IndexFunc>,
    pub vars: Vec<IndexVar>,

    #[serde(skip)]
    usr_to_type: HashMap<Usr, LocalTypeId>,
    #[serde(skip)]
    usr_to_func: HashMap<Usr, LocalFuncId>,
    #[serde(skip)]
    usr_to_var: HashMap<Usr, LocalVarId>,
}

impl IndexFile {
    pub fn new(path: AbsPath) -> IndexFile {
        IndexFile {
            path,
            language: Language::Unknown,
            args: Vec::new(),
            includes: Vec::new(),
            dependencies: Vec::new(),
            skipped_by_preprocessor: Vec::new(),
            last_modification_time: 0,
            types: Vec::new(),
            funcs: Vec::new(),
            vars: Vec::new(),
            usr_to_type: HashMap::new(),
            usr_to_func: HashMap::new(),
            usr_to_var: HashMap::new(),
        }
    }

    /// Rebuilds the USR lookup tables after deserialization (they are not
    /// persisted; the vectors are the source of truth).
    pub fn restore_usr_tables(&mut self) {
        self.usr_to_type = self.types.iter().map(|t| (t.usr, t.id)).collect();
        self.usr_to_func = self.funcs.iter().map(|f| (f.usr, f.id)).collect();
        self.usr_to_var = self.vars.iter().map(|v| (v.usr, v.id)).collect();
    }

    /// Returns the local id for `usr`, minting a fresh record on first
    /// sight.
    pub fn type_id(&mut self, usr: Usr) -> LocalTypeId {
        if let Some(&id) = self.usr_to_type.get(&usr) {
            return id;
        }
        let id = LocalTypeId::new(self.types.len() as u32);
        self.usr_to_type.insert(usr, id);
        self.types.push(IndexType {
            id,
            usr,
            def: TypeDef::default(),
            declarations: Vec::new(),
            derived: Vec::new(),
            instances: Vec::new(),
            uses: Vec::new(),
        });
        id
    }

    pub fn func_id(&mut self, usr: Usr) -> LocalFuncId {
        if let Some(&id) = self.usr_to_func.get(&usr) {
            return id;
        }
        let id = LocalFuncId::new(self.funcs.len() as u32);
        self.usr_to_func.insert(usr, id);
        self.funcs.push(IndexFunc {
            id,
            usr,
            def: FuncDef::default(),
            declarations: Vec::new(),
            derived: Vec::new(),
            uses: Vec::new(),
        });
        id
    }

    pub fn var_id(&mut self, usr: Usr) -> LocalVarId {
        if let Some(&id) = self.usr_to_var.get(&usr) {
            return id;
        }
        let id = LocalVarId::new(self.vars.len() as u32);
        self.usr_to_var.insert(usr, id);
        self.vars.push(IndexVar {
            id,
            usr,
            def: VarDef::default(),
            declarations: Vec::new(),
            uses: Vec::new(),
        });
        id
    }

    pub fn resolve_type(&mut self, id: LocalTypeId) -> &mut IndexType {
        &mut self.types[id.index()]
    }

    pub fn resolve_func(&mut self, id: LocalFuncId) -> &mut IndexFunc {
        &mut self.funcs[id.index()]
    }

    pub fn resolve_var(&mut self, id: LocalVarId) -> &mut IndexVar {
        &mut self.vars[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_dense_local_ids() {
        let mut file = IndexFile::new(AbsPath::new("/foo.cc"));
        let a = file.type_id(Usr(1));
        let b = file.type_id(Usr(2));
        let a_again = file.type_id(Usr(1));
        assert_eq!(a, LocalTypeId::new(0));
        assert_eq!(b, LocalTypeId::new(1));
        assert_eq!(a, a_again);
        assert_eq!(file.types.len(), 2);
    }

    #[test]
    fn restores_usr_tables_from_vectors() {
        let mut file = IndexFile::new(AbsPath::new("/foo.cc"));
        file.func_id(Usr(7));
        let mut copy = file.clone();
        copy.usr_to_func.clear();
        copy.restore_usr_tables();
        assert_eq!(copy.func_id(Usr(7)), LocalFuncId::new(0));
        assert_eq!(copy.funcs.len(), 1);
    }

    #[test]
    fn local_variable_detection() {
        let auto = VarDef {
            storage: StorageClass::Auto,
            ..VarDef::default()
        };
        assert!(auto.is_local());

        let param = VarDef {
            storage: StorageClass::None,
            parent_kind: SymbolKind::Func,
            ..VarDef::default()
        };
        assert!(param.is_local());

        let global = VarDef {
            storage: StorageClass::None,
            parent_kind: SymbolKind::File,
            ..VarDef::default()
        };
        assert!(!global.is_local());

        let static_member = VarDef {
            storage: StorageClass::Static,
            parent_kind: SymbolKind::Type,
            ..VarDef::default()
        };
        assert!(!static_member.is_local());
    }
}
