//! The database proper: id minting, update application, lookups.

use std::collections::{HashMap, HashSet};

use scry_core::{AbsPath, AnyId, FileId, FuncId, Position, SymbolKind, TypeId, Usr, VarId};

use crate::types::{
    MergeableUpdate, QueryFile, QueryFileDef, QueryFunc, QueryFuncDef, QueryType, QueryTypeDef,
    QueryVar, QueryVarDef, SymbolIdx, SymbolRef, WithFile,
};
use crate::update::IndexUpdate;
use crate::QueryRef;

/// Four parallel entity vectors plus the flat symbol index.
///
/// Single-writer: only the query-database thread mutates this. Readers
/// (request handlers) get shared references and never mutate.
#[derive(Default)]
pub struct QueryDatabase {
    pub files: Vec<QueryFile>,
    pub types: Vec<QueryType>,
    pub funcs: Vec<QueryFunc>,
    pub vars: Vec<QueryVar>,
    pub symbols: Vec<SymbolIdx>,

    pub usr_to_file: HashMap<AbsPath, FileId>,
    pub usr_to_type: HashMap<Usr, TypeId>,
    pub usr_to_func: HashMap<Usr, FuncId>,
    pub usr_to_var: HashMap<Usr, VarId>,
}

impl QueryDatabase {
    pub fn new() -> QueryDatabase {
        QueryDatabase::default()
    }

    // ---- id minting (query-database thread only) ----

    pub fn file_id_from_path(&mut self, path: &AbsPath) -> FileId {
        if let Some(&id) = self.usr_to_file.get(path) {
            return id;
        }
        let id = FileId::new(self.files.len() as u32);
        self.usr_to_file.insert(path.clone(), id);
        self.files.push(QueryFile::new(path.clone()));
        id
    }

    pub fn type_id_from_usr(&mut self, usr: Usr) -> TypeId {
        if let Some(&id) = self.usr_to_type.get(&usr) {
            return id;
        }
        let id = TypeId::new(self.types.len() as u32);
        self.usr_to_type.insert(usr, id);
        self.types.push(QueryType::new(usr));
        id
    }

    pub fn func_id_from_usr(&mut self, usr: Usr) -> FuncId {
        if let Some(&id) = self.usr_to_func.get(&usr) {
            return id;
        }
        let id = FuncId::new(self.funcs.len() as u32);
        self.usr_to_func.insert(usr, id);
        self.funcs.push(QueryFunc::new(usr));
        id
    }

    pub fn var_id_from_usr(&mut self, usr: Usr) -> VarId {
        if let Some(&id) = self.usr_to_var.get(&usr) {
            return id;
        }
        let id = VarId::new(self.vars.len() as u32);
        self.usr_to_var.insert(usr, id);
        self.vars.push(QueryVar::new(usr));
        id
    }

    // ---- lookups ----

    pub fn file(&self, id: FileId) -> &QueryFile {
        &self.files[id.index()]
    }

    pub fn ty(&self, id: TypeId) -> &QueryType {
        &self.types[id.index()]
    }

    pub fn func(&self, id: FuncId) -> &QueryFunc {
        &self.funcs[id.index()]
    }

    pub fn var(&self, id: VarId) -> &QueryVar {
        &self.vars[id.index()]
    }

    pub fn file_for_symbol(&self, symbol: SymbolIdx) -> Option<&QueryFile> {
        (symbol.kind == SymbolKind::File).then(|| &self.files[symbol.id.index()])
    }

    pub fn type_for_symbol(&self, symbol: SymbolIdx) -> Option<&QueryType> {
        (symbol.kind == SymbolKind::Type).then(|| &self.types[symbol.id.index()])
    }

    pub fn func_for_symbol(&self, symbol: SymbolIdx) -> Option<&QueryFunc> {
        (symbol.kind == SymbolKind::Func).then(|| &self.funcs[symbol.id.index()])
    }

    pub fn var_for_symbol(&self, symbol: SymbolIdx) -> Option<&QueryVar> {
        (symbol.kind == SymbolKind::Var).then(|| &self.vars[symbol.id.index()])
    }

    pub fn file_for_path(&self, path: &AbsPath) -> Option<&QueryFile> {
        self.usr_to_file.get(path).map(|&id| self.file(id))
    }

    pub fn type_for_usr(&self, usr: Usr) -> Option<&QueryType> {
        self.usr_to_type.get(&usr).map(|&id| self.ty(id))
    }

    pub fn func_for_usr(&self, usr: Usr) -> Option<&QueryFunc> {
        self.usr_to_func.get(&usr).map(|&id| self.func(id))
    }

    pub fn var_for_usr(&self, usr: Usr) -> Option<&QueryVar> {
        self.usr_to_var.get(&usr).map(|&id| self.var(id))
    }

    /// For funcs the returned name includes the signature.
    pub fn symbol_detailed_name(&self, symbol_idx: usize) -> &str {
        let symbol = &self.symbols[symbol_idx];
        let idx = symbol.id.index();
        match symbol.kind {
            SymbolKind::File => self
                .files
                .get(idx)
                .and_then(|f| f.def.as_ref())
                .map(|d| d.path.as_str())
                .unwrap_or(""),
            SymbolKind::Type => self.types[idx]
                .any_def()
                .map(|d| d.detailed_name.as_str())
                .unwrap_or(""),
            SymbolKind::Func => self.funcs[idx]
                .any_def()
                .map(|d| d.detailed_name.as_str())
                .unwrap_or(""),
            SymbolKind::Var => self.vars[idx]
                .any_def()
                .map(|d| d.detailed_name.as_str())
                .unwrap_or(""),
            SymbolKind::Invalid => "",
        }
    }

    pub fn symbol_short_name(&self, symbol_idx: usize) -> &str {
        let symbol = &self.symbols[symbol_idx];
        let idx = symbol.id.index();
        match symbol.kind {
            SymbolKind::File => self
                .files
                .get(idx)
                .and_then(|f| f.def.as_ref())
                .map(|d| d.path.as_str())
                .unwrap_or(""),
            SymbolKind::Type => self.types[idx]
                .any_def()
                .map(|d| d.short_name())
                .unwrap_or(""),
            SymbolKind::Func => self.funcs[idx]
                .any_def()
                .map(|d| d.short_name())
                .unwrap_or(""),
            SymbolKind::Var => self.vars[idx].any_def().map(|d| d.short_name()).unwrap_or(""),
            SymbolKind::Invalid => "",
        }
    }

    /// Symbols under `position` in `path`, most specific (latest in the
    /// sorted `all_symbols` table) first.
    pub fn symbols_at(&self, path: &AbsPath, position: Position) -> Vec<SymbolRef> {
        let Some(def) = self.file_for_path(path).and_then(|f| f.def.as_ref()) else {
            return Vec::new();
        };
        let mut hits: Vec<SymbolRef> = def
            .all_symbols
            .iter()
            .filter(|sym| sym.range.contains(position))
            .copied()
            .collect();
        // Narrower ranges describe the position better; prefer them.
        hits.sort_by_key(|sym| {
            (
                sym.range.end.line.saturating_sub(sym.range.start.line),
                sym.range.end.column.saturating_sub(sym.range.start.column),
            )
        });
        hits
    }

    /// Every definition location of the entity behind `any`/`kind`.
    pub fn definition_spells(&self, kind: SymbolKind, any: AnyId) -> Vec<QueryRef> {
        match kind {
            SymbolKind::Type => self.types[any.index()]
                .def
                .iter()
                .filter_map(|d| d.spell)
                .collect(),
            SymbolKind::Func => self.funcs[any.index()]
                .def
                .iter()
                .filter_map(|d| d.spell)
                .collect(),
            SymbolKind::Var => self.vars[any.index()]
                .def
                .iter()
                .filter_map(|d| d.spell)
                .collect(),
            SymbolKind::File | SymbolKind::Invalid => Vec::new(),
        }
    }

    /// Reference sites (uses) of the entity behind `any`/`kind`.
    pub fn uses_of(&self, kind: SymbolKind, any: AnyId) -> Vec<QueryRef> {
        match kind {
            SymbolKind::Type => self.types[any.index()].uses.clone(),
            SymbolKind::Func => self.funcs[any.index()].uses.clone(),
            SymbolKind::Var => self.vars[any.index()].uses.clone(),
            SymbolKind::File | SymbolKind::Invalid => Vec::new(),
        }
    }

    // ---- applying updates (query-database thread only) ----

    pub fn apply_update(&mut self, update: IndexUpdate) {
        for path in &update.files_removed {
            if let Some(&id) = self.usr_to_file.get(path) {
                self.files[id.index()].def = None;
            }
        }
        for (id, def) in update.files_def_update {
            self.import_file_def(id, def);
        }

        self.remove_types(&update.types_removed);
        self.import_type_defs(update.types_def_update);
        for m in update.types_declarations {
            apply_mergeable(&mut self.types[m.id.index()].declarations, m);
        }
        for m in update.types_derived {
            apply_mergeable(&mut self.types[m.id.index()].derived, m);
        }
        for m in update.types_instances {
            apply_mergeable(&mut self.types[m.id.index()].instances, m);
        }
        for m in update.types_uses {
            apply_mergeable(&mut self.types[m.id.index()].uses, m);
        }

        self.remove_funcs(&update.funcs_removed);
        self.import_func_defs(update.funcs_def_update);
        for m in update.funcs_declarations {
            apply_mergeable(&mut self.funcs[m.id.index()].declarations, m);
        }
        for m in update.funcs_derived {
            apply_mergeable(&mut self.funcs[m.id.index()].derived, m);
        }
        for m in update.funcs_uses {
            apply_mergeable(&mut self.funcs[m.id.index()].uses, m);
        }

        self.remove_vars(&update.vars_removed);
        self.import_var_defs(update.vars_def_update);
        for m in update.vars_declarations {
            apply_mergeable(&mut self.vars[m.id.index()].declarations, m);
        }
        for m in update.vars_uses {
            apply_mergeable(&mut self.vars[m.id.index()].uses, m);
        }
    }

    fn remove_types(&mut self, to_remove: &[WithFile<TypeId>]) {
        for entry in to_remove {
            let entity = &mut self.types[entry.id.index()];
            entity.def.retain(|def| def.file != entry.file);
            if entity.def.is_empty() {
                if let Some(symbol_idx) = entity.symbol_idx {
                    self.symbols[symbol_idx].kind = SymbolKind::Invalid;
                }
            }
        }
    }

    fn remove_funcs(&mut self, to_remove: &[WithFile<FuncId>]) {
        for entry in to_remove {
            let entity = &mut self.funcs[entry.id.index()];
            entity.def.retain(|def| def.file != entry.file);
            if entity.def.is_empty() {
                if let Some(symbol_idx) = entity.symbol_idx {
                    self.symbols[symbol_idx].kind = SymbolKind::Invalid;
                }
            }
        }
    }

    fn remove_vars(&mut self, to_remove: &[WithFile<VarId>]) {
        for entry in to_remove {
            let entity = &mut self.vars[entry.id.index()];
            entity.def.retain(|def| def.file != entry.file);
            if entity.def.is_empty() {
                if let Some(symbol_idx) = entity.symbol_idx {
                    self.symbols[symbol_idx].kind = SymbolKind::Invalid;
                }
            }
        }
    }

    fn import_file_def(&mut self, id: FileId, def: QueryFileDef) {
        let file = &mut self.files[id.index()];
        file.def = Some(def);
        update_symbol_index(&mut self.symbols, &mut file.symbol_idx, SymbolKind::File, id.into());
    }

    fn import_type_defs(&mut self, updates: Vec<(TypeId, QueryTypeDef)>) {
        for (id, def) in updates {
            debug_assert!(!def.detailed_name.is_empty());
            let entity = &mut self.types[id.index()];
            if !try_replace_def(&mut entity.def, def, |d| d.file, |d| d.spell.is_some()) {
                continue;
            }
            update_symbol_index(
                &mut self.symbols,
                &mut entity.symbol_idx,
                SymbolKind::Type,
                id.into(),
            );
        }
    }

    fn import_func_defs(&mut self, updates: Vec<(FuncId, QueryFuncDef)>) {
        for (id, def) in updates {
            debug_assert!(!def.detailed_name.is_empty());
            let entity = &mut self.funcs[id.index()];
            if !try_replace_def(&mut entity.def, def, |d| d.file, |d| d.spell.is_some()) {
                continue;
            }
            update_symbol_index(
                &mut self.symbols,
                &mut entity.symbol_idx,
                SymbolKind::Func,
                id.into(),
            );
        }
    }

    fn import_var_defs(&mut self, updates: Vec<(VarId, QueryVarDef)>) {
        for (id, def) in updates {
            debug_assert!(!def.detailed_name.is_empty());
            let entity = &mut self.vars[id.index()];
            if !try_replace_def(&mut entity.def, def, |d| d.file, |d| d.spell.is_some()) {
                continue;
            }
            // Locals never enter the symbol index; they only matter for
            // in-file navigation.
            if entity.def.first().is_some_and(|d| d.is_local()) {
                continue;
            }
            update_symbol_index(
                &mut self.symbols,
                &mut entity.symbol_idx,
                SymbolKind::Var,
                id.into(),
            );
        }
    }
}

/// Installs `def` into `defs`. Returns true when the file had no record yet
/// and `def` was pushed to the front as the new primary def; false when a
/// same-file record existed and was replaced in place (or kept).
///
/// A same-file record keeps its old value when it has a spell and the
/// incoming one does not (a def seen through a dependent TU without the
/// defining source carries no spelling and must not clobber the real one).
fn try_replace_def<D>(
    defs: &mut Vec<D>,
    def: D,
    file_of: impl Fn(&D) -> FileId,
    has_spell: impl Fn(&D) -> bool,
) -> bool {
    let file = file_of(&def);
    for existing in defs.iter_mut() {
        if file_of(existing) == file {
            if !has_spell(existing) || has_spell(&def) {
                *existing = def;
            }
            return false;
        }
    }
    push_front(defs, def);
    true
}

/// Adds `value` to the front, demoting the current front to the back.
fn push_front<D>(defs: &mut Vec<D>, value: D) {
    if defs.is_empty() {
        defs.push(value);
        return;
    }
    let old_front = std::mem::replace(&mut defs[0], value);
    defs.push(old_front);
}

fn update_symbol_index(
    symbols: &mut Vec<SymbolIdx>,
    symbol_idx: &mut Option<usize>,
    kind: SymbolKind,
    id: AnyId,
) {
    if symbol_idx.is_none() {
        *symbol_idx = Some(symbols.len());
        symbols.push(SymbolIdx { id, kind });
    } else if let Some(idx) = *symbol_idx {
        // A tombstoned entry comes back to life when the entity regains a
        // def.
        symbols[idx] = SymbolIdx { id, kind };
    }
}

/// Adds `to_add` to `edges` and removes matches of `to_remove` with a
/// set-based filter, `O(|to_remove| + |edges|)`.
fn apply_mergeable<I, V: Eq + std::hash::Hash + Clone>(
    edges: &mut Vec<V>,
    update: MergeableUpdate<I, V>,
) {
    edges.extend(update.to_add);
    if update.to_remove.is_empty() {
        return;
    }
    let to_remove: HashSet<V> = update.to_remove.into_iter().collect();
    edges.retain(|edge| !to_remove.contains(edge));
}
