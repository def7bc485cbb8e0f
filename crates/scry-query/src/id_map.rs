//! Translation from one file's local ids to global query ids.

use scry_core::{AnyId, FileId, FuncId, SymbolKind, TypeId, VarId};
use scry_index::{IndexFile, LocalRef};

use crate::{QueryDatabase, QueryRef, SymbolRef};

/// Local→query id lookup for one `(IndexFile, QueryDatabase)` pair.
///
/// Building the map mints query ids for any USR the database has not seen
/// yet, so construction must happen on the database-owning thread. After
/// that the map is immutable and safe to use from any indexer thread.
#[derive(Debug, Clone)]
pub struct IdMap {
    pub primary_file: FileId,
    cached_type_ids: Vec<TypeId>,
    cached_func_ids: Vec<FuncId>,
    cached_var_ids: Vec<VarId>,
}

impl IdMap {
    pub fn new(db: &mut QueryDatabase, file: &IndexFile) -> IdMap {
        let primary_file = db.file_id_from_path(&file.path);

        let cached_type_ids = file
            .types
            .iter()
            .map(|t| db.type_id_from_usr(t.usr))
            .collect();
        let cached_func_ids = file
            .funcs
            .iter()
            .map(|f| db.func_id_from_usr(f.usr))
            .collect();
        let cached_var_ids = file
            .vars
            .iter()
            .map(|v| db.var_id_from_usr(v.usr))
            .collect();

        IdMap {
            primary_file,
            cached_type_ids,
            cached_func_ids,
            cached_var_ids,
        }
    }

    #[inline]
    pub fn type_id(&self, local: scry_core::LocalTypeId) -> TypeId {
        self.cached_type_ids[local.index()]
    }

    #[inline]
    pub fn func_id(&self, local: scry_core::LocalFuncId) -> FuncId {
        self.cached_func_ids[local.index()]
    }

    #[inline]
    pub fn var_id(&self, local: scry_core::LocalVarId) -> VarId {
        self.cached_var_ids[local.index()]
    }

    /// Maps a tagged local id to the matching query id.
    pub fn any_id(&self, kind: SymbolKind, raw: u32) -> AnyId {
        match kind {
            SymbolKind::File => self.primary_file.into(),
            SymbolKind::Type => self.cached_type_ids[raw as usize].into(),
            SymbolKind::Func => self.cached_func_ids[raw as usize].into(),
            SymbolKind::Var => self.cached_var_ids[raw as usize].into(),
            SymbolKind::Invalid => AnyId(raw),
        }
    }

    /// Rebases a local occurrence into query space; the occurrence's file is
    /// this map's primary file.
    pub fn query_ref(&self, local: LocalRef) -> QueryRef {
        QueryRef {
            file: self.primary_file,
            range: local.range,
            id: self.any_id(local.kind, local.id),
            kind: local.kind,
            role: local.role,
        }
    }

    pub fn symbol_ref(&self, local: LocalRef) -> SymbolRef {
        SymbolRef {
            range: local.range,
            id: self.any_id(local.kind, local.id),
            kind: local.kind,
            role: local.role,
        }
    }

    pub fn query_refs(&self, locals: &[LocalRef]) -> Vec<QueryRef> {
        locals.iter().map(|&l| self.query_ref(l)).collect()
    }

    pub fn type_ids(&self, locals: &[scry_core::LocalTypeId]) -> Vec<TypeId> {
        locals.iter().map(|&l| self.type_id(l)).collect()
    }

    pub fn func_ids(&self, locals: &[scry_core::LocalFuncId]) -> Vec<FuncId> {
        locals.iter().map(|&l| self.func_id(l)).collect()
    }

    pub fn var_ids(&self, locals: &[scry_core::LocalVarId]) -> Vec<VarId> {
        locals.iter().map(|&l| self.var_id(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::{AbsPath, Usr};

    #[test]
    fn minting_is_idempotent_per_usr() {
        let mut db = QueryDatabase::new();
        let mut file_a = IndexFile::new(AbsPath::new("/a.cc"));
        let mut file_b = IndexFile::new(AbsPath::new("/b.cc"));

        file_a.type_id(Usr(1));
        file_b.type_id(Usr(2));
        file_b.type_id(Usr(1));

        let map_a = IdMap::new(&mut db, &file_a);
        let map_b = IdMap::new(&mut db, &file_b);

        // Same USR resolves to the same query id from both files.
        assert_eq!(
            map_a.type_id(scry_core::LocalTypeId::new(0)),
            map_b.type_id(scry_core::LocalTypeId::new(1)),
        );
        assert_eq!(db.types.len(), 2);
        assert_ne!(map_a.primary_file, map_b.primary_file);
    }
}
