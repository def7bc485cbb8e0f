//! Delta computation between two indexed versions of a file.
//!
//! An [`IndexUpdate`] is the unit of work handed to the query-database
//! thread: def replacements plus add/remove edge lists, all in query ids.
//! Deltas are built on indexer threads; only the final apply touches the
//! database.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use scry_core::{AbsPath, FileId, FuncId, Role, SymbolKind, TypeId, Usr, VarId};
use scry_index::{FuncDef, IndexFile, TypeDef, VarDef};

use crate::types::{
    MergeableUpdate, QueryFileDef, QueryFuncDef, QueryTypeDef, QueryVarDef, SymbolRef, WithFile,
};
use crate::IdMap;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexUpdate {
    /// Files whose def should be cleared (deleted on disk).
    pub files_removed: Vec<AbsPath>,
    pub files_def_update: Vec<(FileId, QueryFileDef)>,

    pub types_removed: Vec<WithFile<TypeId>>,
    pub types_def_update: Vec<(TypeId, QueryTypeDef)>,
    pub types_declarations: Vec<MergeableUpdate<TypeId, crate::QueryRef>>,
    pub types_derived: Vec<MergeableUpdate<TypeId, TypeId>>,
    pub types_instances: Vec<MergeableUpdate<TypeId, VarId>>,
    pub types_uses: Vec<MergeableUpdate<TypeId, crate::QueryRef>>,

    pub funcs_removed: Vec<WithFile<FuncId>>,
    pub funcs_def_update: Vec<(FuncId, QueryFuncDef)>,
    pub funcs_declarations: Vec<MergeableUpdate<FuncId, crate::QueryRef>>,
    pub funcs_derived: Vec<MergeableUpdate<FuncId, FuncId>>,
    pub funcs_uses: Vec<MergeableUpdate<FuncId, crate::QueryRef>>,

    pub vars_removed: Vec<WithFile<VarId>>,
    pub vars_def_update: Vec<(VarId, QueryVarDef)>,
    pub vars_declarations: Vec<MergeableUpdate<VarId, crate::QueryRef>>,
    pub vars_uses: Vec<MergeableUpdate<VarId, crate::QueryRef>>,
}

/// One record's fate when diffing two versions of a file.
enum GroupChange<'a, T> {
    /// Present previously, gone now.
    Removed(&'a T),
    /// New in the current version.
    Added(&'a T),
    /// Present in both; contents may differ.
    Found(&'a T, &'a T),
}

impl IndexUpdate {
    /// Diffs `previous` against `current` and produces the update that moves
    /// the database from one to the other. With no previous version the
    /// whole current file is an addition.
    pub fn create_delta(
        previous_id_map: Option<&IdMap>,
        current_id_map: &IdMap,
        previous: Option<&IndexFile>,
        current: &IndexFile,
    ) -> IndexUpdate {
        match (previous_id_map, previous) {
            (Some(prev_map), Some(prev)) => {
                IndexUpdate::build(prev_map, current_id_map, prev, current)
            }
            _ => {
                let empty = IndexFile::new(current.path.clone());
                IndexUpdate::build(current_id_map, current_id_map, &empty, current)
            }
        }
    }

    fn build(
        previous_id_map: &IdMap,
        current_id_map: &IdMap,
        previous: &IndexFile,
        current: &IndexFile,
    ) -> IndexUpdate {
        let mut update = IndexUpdate {
            files_def_update: vec![(
                current_id_map.primary_file,
                build_file_def(current_id_map, current),
            )],
            ..IndexUpdate::default()
        };

        // Entries are only removed when the previous index *defined* them. A
        // type pulled in from another file exists merely to attribute
        // references; when the references go away the entity must survive.

        for change in compare_groups(&previous.types, &current.types, |t| t.usr) {
            match change {
                GroupChange::Removed(removed) => {
                    let id = previous_id_map.type_id(removed.id);
                    if removed.def.spell.is_some() {
                        update.types_removed.push(WithFile {
                            file: previous_id_map.primary_file,
                            id,
                        });
                    }
                    push_removal(
                        &mut update.types_declarations,
                        id,
                        previous_id_map.query_refs(&removed.declarations),
                    );
                    push_removal(
                        &mut update.types_derived,
                        id,
                        previous_id_map.type_ids(&removed.derived),
                    );
                    push_removal(
                        &mut update.types_instances,
                        id,
                        previous_id_map.var_ids(&removed.instances),
                    );
                    push_removal(
                        &mut update.types_uses,
                        id,
                        previous_id_map.query_refs(&removed.uses),
                    );
                }
                GroupChange::Added(added) => {
                    let id = current_id_map.type_id(added.id);
                    if let Some(def) = type_def_to_query(current_id_map, &added.def) {
                        update.types_def_update.push((id, def));
                    }
                    push_addition(
                        &mut update.types_declarations,
                        id,
                        current_id_map.query_refs(&added.declarations),
                    );
                    push_addition(
                        &mut update.types_derived,
                        id,
                        current_id_map.type_ids(&added.derived),
                    );
                    push_addition(
                        &mut update.types_instances,
                        id,
                        current_id_map.var_ids(&added.instances),
                    );
                    push_addition(
                        &mut update.types_uses,
                        id,
                        current_id_map.query_refs(&added.uses),
                    );
                }
                GroupChange::Found(prev, cur) => {
                    let id = current_id_map.type_id(cur.id);
                    let prev_def = type_def_to_query(previous_id_map, &prev.def);
                    let cur_def = type_def_to_query(current_id_map, &cur.def);
                    if let Some(cur_def) = cur_def {
                        if prev_def.as_ref() != Some(&cur_def) {
                            update.types_def_update.push((id, cur_def));
                        }
                    }

                    diff_edges(
                        &mut update.types_declarations,
                        id,
                        previous_id_map.query_refs(&prev.declarations),
                        current_id_map.query_refs(&cur.declarations),
                    );
                    diff_edges(
                        &mut update.types_derived,
                        id,
                        previous_id_map.type_ids(&prev.derived),
                        current_id_map.type_ids(&cur.derived),
                    );
                    diff_edges(
                        &mut update.types_instances,
                        id,
                        previous_id_map.var_ids(&prev.instances),
                        current_id_map.var_ids(&cur.instances),
                    );
                    diff_edges(
                        &mut update.types_uses,
                        id,
                        previous_id_map.query_refs(&prev.uses),
                        current_id_map.query_refs(&cur.uses),
                    );
                }
            }
        }

        for change in compare_groups(&previous.funcs, &current.funcs, |f| f.usr) {
            match change {
                GroupChange::Removed(removed) => {
                    let id = previous_id_map.func_id(removed.id);
                    if removed.def.spell.is_some() {
                        update.funcs_removed.push(WithFile {
                            file: previous_id_map.primary_file,
                            id,
                        });
                    }
                    push_removal(
                        &mut update.funcs_declarations,
                        id,
                        previous_id_map.query_refs(&removed.declarations),
                    );
                    push_removal(
                        &mut update.funcs_derived,
                        id,
                        previous_id_map.func_ids(&removed.derived),
                    );
                    push_removal(
                        &mut update.funcs_uses,
                        id,
                        previous_id_map.query_refs(&removed.uses),
                    );
                }
                GroupChange::Added(added) => {
                    let id = current_id_map.func_id(added.id);
                    if let Some(def) = func_def_to_query(current_id_map, &added.def) {
                        update.funcs_def_update.push((id, def));
                    }
                    push_addition(
                        &mut update.funcs_declarations,
                        id,
                        current_id_map.query_refs(&added.declarations),
                    );
                    push_addition(
                        &mut update.funcs_derived,
                        id,
                        current_id_map.func_ids(&added.derived),
                    );
                    push_addition(
                        &mut update.funcs_uses,
                        id,
                        current_id_map.query_refs(&added.uses),
                    );
                }
                GroupChange::Found(prev, cur) => {
                    let id = current_id_map.func_id(cur.id);
                    let prev_def = func_def_to_query(previous_id_map, &prev.def);
                    let cur_def = func_def_to_query(current_id_map, &cur.def);
                    if let Some(cur_def) = cur_def {
                        if prev_def.as_ref() != Some(&cur_def) {
                            update.funcs_def_update.push((id, cur_def));
                        }
                    }

                    diff_edges(
                        &mut update.funcs_declarations,
                        id,
                        previous_id_map.query_refs(&prev.declarations),
                        current_id_map.query_refs(&cur.declarations),
                    );
                    diff_edges(
                        &mut update.funcs_derived,
                        id,
                        previous_id_map.func_ids(&prev.derived),
                        current_id_map.func_ids(&cur.derived),
                    );
                    diff_edges(
                        &mut update.funcs_uses,
                        id,
                        previous_id_map.query_refs(&prev.uses),
                        current_id_map.query_refs(&cur.uses),
                    );
                }
            }
        }

        for change in compare_groups(&previous.vars, &current.vars, |v| v.usr) {
            match change {
                GroupChange::Removed(removed) => {
                    let id = previous_id_map.var_id(removed.id);
                    if removed.def.spell.is_some() {
                        update.vars_removed.push(WithFile {
                            file: previous_id_map.primary_file,
                            id,
                        });
                    }
                    push_removal(
                        &mut update.vars_declarations,
                        id,
                        previous_id_map.query_refs(&removed.declarations),
                    );
                    push_removal(
                        &mut update.vars_uses,
                        id,
                        previous_id_map.query_refs(&removed.uses),
                    );
                }
                GroupChange::Added(added) => {
                    let id = current_id_map.var_id(added.id);
                    if let Some(def) = var_def_to_query(current_id_map, &added.def) {
                        update.vars_def_update.push((id, def));
                    }
                    push_addition(
                        &mut update.vars_declarations,
                        id,
                        current_id_map.query_refs(&added.declarations),
                    );
                    push_addition(
                        &mut update.vars_uses,
                        id,
                        current_id_map.query_refs(&added.uses),
                    );
                }
                GroupChange::Found(prev, cur) => {
                    let id = current_id_map.var_id(cur.id);
                    let prev_def = var_def_to_query(previous_id_map, &prev.def);
                    let cur_def = var_def_to_query(current_id_map, &cur.def);
                    if let Some(cur_def) = cur_def {
                        if prev_def.as_ref() != Some(&cur_def) {
                            update.vars_def_update.push((id, cur_def));
                        }
                    }

                    diff_edges(
                        &mut update.vars_declarations,
                        id,
                        previous_id_map.query_refs(&prev.declarations),
                        current_id_map.query_refs(&cur.declarations),
                    );
                    diff_edges(
                        &mut update.vars_uses,
                        id,
                        previous_id_map.query_refs(&prev.uses),
                        current_id_map.query_refs(&cur.uses),
                    );
                }
            }
        }

        update
    }

    /// Combines `other` into `self`. Simple vectors are appended; mergeable
    /// edge lists are coalesced by entity id so a single apply touches each
    /// entity once.
    pub fn merge(&mut self, other: IndexUpdate) {
        self.files_removed.extend(other.files_removed);
        self.files_def_update.extend(other.files_def_update);

        self.types_removed.extend(other.types_removed);
        self.types_def_update.extend(other.types_def_update);
        merge_mergeable(&mut self.types_declarations, other.types_declarations);
        merge_mergeable(&mut self.types_derived, other.types_derived);
        merge_mergeable(&mut self.types_instances, other.types_instances);
        merge_mergeable(&mut self.types_uses, other.types_uses);

        self.funcs_removed.extend(other.funcs_removed);
        self.funcs_def_update.extend(other.funcs_def_update);
        merge_mergeable(&mut self.funcs_declarations, other.funcs_declarations);
        merge_mergeable(&mut self.funcs_derived, other.funcs_derived);
        merge_mergeable(&mut self.funcs_uses, other.funcs_uses);

        self.vars_removed.extend(other.vars_removed);
        self.vars_def_update.extend(other.vars_def_update);
        merge_mergeable(&mut self.vars_declarations, other.vars_declarations);
        merge_mergeable(&mut self.vars_uses, other.vars_uses);
    }

    /// True when this update carries no entity changes. The unconditional
    /// per-file def refresh is ignored; every delta carries one.
    pub fn is_no_op(&self) -> bool {
        self.files_removed.is_empty()
            && self.types_removed.is_empty()
            && self.types_def_update.is_empty()
            && self.types_declarations.is_empty()
            && self.types_derived.is_empty()
            && self.types_instances.is_empty()
            && self.types_uses.is_empty()
            && self.funcs_removed.is_empty()
            && self.funcs_def_update.is_empty()
            && self.funcs_declarations.is_empty()
            && self.funcs_derived.is_empty()
            && self.funcs_uses.is_empty()
            && self.vars_removed.is_empty()
            && self.vars_def_update.is_empty()
            && self.vars_declarations.is_empty()
            && self.vars_uses.is_empty()
    }
}

fn push_removal<I, V>(out: &mut Vec<MergeableUpdate<I, V>>, id: I, to_remove: Vec<V>) {
    if !to_remove.is_empty() {
        out.push(MergeableUpdate {
            id,
            to_add: Vec::new(),
            to_remove,
        });
    }
}

fn push_addition<I, V>(out: &mut Vec<MergeableUpdate<I, V>>, id: I, to_add: Vec<V>) {
    if !to_add.is_empty() {
        out.push(MergeableUpdate {
            id,
            to_add,
            to_remove: Vec::new(),
        });
    }
}

fn type_def_to_query(id_map: &IdMap, def: &TypeDef) -> Option<QueryTypeDef> {
    if def.detailed_name.is_empty() {
        return None;
    }
    Some(QueryTypeDef {
        detailed_name: def.detailed_name.clone(),
        short_name_offset: def.short_name_offset,
        short_name_size: def.short_name_size,
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        file: id_map.primary_file,
        spell: def.spell.map(|s| id_map.query_ref(s)),
        extent: def.extent.map(|e| id_map.query_ref(e)),
        bases: id_map.type_ids(&def.bases),
    })
}

fn func_def_to_query(id_map: &IdMap, def: &FuncDef) -> Option<QueryFuncDef> {
    if def.detailed_name.is_empty() {
        return None;
    }
    Some(QueryFuncDef {
        detailed_name: def.detailed_name.clone(),
        short_name_offset: def.short_name_offset,
        short_name_size: def.short_name_size,
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        storage: def.storage,
        file: id_map.primary_file,
        spell: def.spell.map(|s| id_map.query_ref(s)),
        extent: def.extent.map(|e| id_map.query_ref(e)),
        bases: id_map.func_ids(&def.bases),
        callees: id_map.query_refs(&def.callees),
    })
}

fn var_def_to_query(id_map: &IdMap, def: &VarDef) -> Option<QueryVarDef> {
    if def.detailed_name.is_empty() {
        return None;
    }
    Some(QueryVarDef {
        detailed_name: def.detailed_name.clone(),
        short_name_offset: def.short_name_offset,
        short_name_size: def.short_name_size,
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        storage: def.storage,
        parent_kind: def.parent_kind,
        var_type: def.var_type.map(|t| id_map.type_id(t)),
        file: id_map.primary_file,
        spell: def.spell.map(|s| id_map.query_ref(s)),
        extent: def.extent.map(|e| id_map.query_ref(e)),
    })
}

/// Builds the per-file def (outline + all-symbols tables) for `indexed`.
pub fn build_file_def(id_map: &IdMap, indexed: &IndexFile) -> QueryFileDef {
    let mut def = QueryFileDef {
        path: indexed.path.clone(),
        language: indexed.language,
        includes: indexed.includes.clone(),
        dependencies: indexed.dependencies.clone(),
        inactive_regions: indexed.skipped_by_preprocessor.clone(),
        outline: Vec::new(),
        all_symbols: Vec::new(),
    };

    for t in &indexed.types {
        let id = id_map.type_id(t.id).into();
        if let Some(spell) = t.def.spell {
            def.all_symbols.push(symbol(spell, id, SymbolKind::Type));
        }
        if let Some(extent) = t.def.extent {
            def.outline.push(symbol(extent, id, SymbolKind::Type));
        }
        for &decl in &t.declarations {
            def.all_symbols.push(symbol(decl, id, SymbolKind::Type));
            // Constructor sites reference the class; keep those out of the
            // document outline.
            if !decl.role.intersects(Role::REFERENCE) {
                def.outline.push(symbol(decl, id, SymbolKind::Type));
            }
        }
        for &useref in &t.uses {
            def.all_symbols.push(symbol(useref, id, SymbolKind::Type));
        }
    }

    for f in &indexed.funcs {
        let id = id_map.func_id(f.id).into();
        if let Some(spell) = f.def.spell {
            def.all_symbols.push(symbol(spell, id, SymbolKind::Func));
        }
        if let Some(extent) = f.def.extent {
            def.outline.push(symbol(extent, id, SymbolKind::Func));
        }
        for &decl in &f.declarations {
            def.all_symbols.push(symbol(decl, id, SymbolKind::Func));
            def.outline.push(symbol(decl, id, SymbolKind::Func));
        }
        for &useref in &f.uses {
            // Widen implicit call ranges by one column on each side, so "go
            // to definition" on the space or semicolon in `A a;` resolves to
            // the constructor.
            let mut useref = useref;
            if useref.role.intersects(Role::IMPLICIT) {
                if useref.range.start.column > 0 {
                    useref.range.start.column -= 1;
                }
                useref.range.end.column += 1;
            }
            def.all_symbols.push(symbol(useref, id, SymbolKind::Func));
        }
    }

    for v in &indexed.vars {
        let id = id_map.var_id(v.id).into();
        if let Some(spell) = v.def.spell {
            def.all_symbols.push(symbol(spell, id, SymbolKind::Var));
        }
        if let Some(extent) = v.def.extent {
            def.outline.push(symbol(extent, id, SymbolKind::Var));
        }
        for &decl in &v.declarations {
            def.all_symbols.push(symbol(decl, id, SymbolKind::Var));
            def.outline.push(symbol(decl, id, SymbolKind::Var));
        }
        for &useref in &v.uses {
            def.all_symbols.push(symbol(useref, id, SymbolKind::Var));
        }
    }

    def.outline.sort_by_key(|s| s.range.start);
    def.all_symbols.sort_by_key(|s| s.range.start);
    def
}

fn symbol(local: scry_index::LocalRef, id: scry_core::AnyId, kind: SymbolKind) -> SymbolRef {
    SymbolRef {
        range: local.range,
        id,
        kind,
        role: local.role,
    }
}

/// Pairs up `previous` and `current` records by USR.
fn compare_groups<'a, T>(
    previous: &'a [T],
    current: &'a [T],
    usr_of: impl Fn(&T) -> Usr,
) -> Vec<GroupChange<'a, T>> {
    let mut prev_sorted: Vec<&T> = previous.iter().collect();
    let mut cur_sorted: Vec<&T> = current.iter().collect();
    prev_sorted.sort_by_key(|t| usr_of(t));
    cur_sorted.sort_by_key(|t| usr_of(t));

    let mut changes = Vec::with_capacity(prev_sorted.len().max(cur_sorted.len()));
    let mut prev_it = prev_sorted.into_iter().peekable();
    let mut cur_it = cur_sorted.into_iter().peekable();

    loop {
        match (prev_it.peek(), cur_it.peek()) {
            (Some(prev), Some(cur)) => {
                let prev_usr = usr_of(prev);
                let cur_usr = usr_of(cur);
                if prev_usr == cur_usr {
                    changes.push(GroupChange::Found(
                        prev_it.next().unwrap(),
                        cur_it.next().unwrap(),
                    ));
                } else if prev_usr < cur_usr {
                    changes.push(GroupChange::Removed(prev_it.next().unwrap()));
                } else {
                    changes.push(GroupChange::Added(cur_it.next().unwrap()));
                }
            }
            (Some(_), None) => changes.push(GroupChange::Removed(prev_it.next().unwrap())),
            (None, Some(_)) => changes.push(GroupChange::Added(cur_it.next().unwrap())),
            (None, None) => break,
        }
    }
    changes
}

/// Sorted set difference: `removed = previous \ current`,
/// `added = current \ previous`. Pushes a mergeable entry when either side
/// is non-empty.
fn diff_edges<I, V: Ord>(
    out: &mut Vec<MergeableUpdate<I, V>>,
    id: I,
    mut previous: Vec<V>,
    mut current: Vec<V>,
) {
    previous.sort();
    current.sort();

    let mut removed = Vec::new();
    let mut added = Vec::new();

    let mut prev_it = previous.into_iter().peekable();
    let mut cur_it = current.into_iter().peekable();
    loop {
        match (prev_it.peek(), cur_it.peek()) {
            (Some(p), Some(c)) => {
                if p < c {
                    removed.push(prev_it.next().unwrap());
                } else if c < p {
                    added.push(cur_it.next().unwrap());
                } else {
                    prev_it.next();
                    cur_it.next();
                }
            }
            (Some(_), None) => removed.push(prev_it.next().unwrap()),
            (None, Some(_)) => added.push(cur_it.next().unwrap()),
            (None, None) => break,
        }
    }

    if !removed.is_empty() || !added.is_empty() {
        out.push(MergeableUpdate {
            id,
            to_add: added,
            to_remove: removed,
        });
    }
}

/// Adds the mergeable updates in `source` to `dest`, combining entries that
/// target the same entity. Merging costs a little here and saves time on the
/// query-database thread.
fn merge_mergeable<I: Copy + Eq + Hash, V>(
    dest: &mut Vec<MergeableUpdate<I, V>>,
    source: Vec<MergeableUpdate<I, V>>,
) {
    let mut id_to_index: HashMap<I, usize> =
        dest.iter().enumerate().map(|(i, m)| (m.id, i)).collect();

    for entry in source {
        match id_to_index.get(&entry.id) {
            Some(&i) => {
                dest[i].to_add.extend(entry.to_add);
                dest[i].to_remove.extend(entry.to_remove);
            }
            None => {
                id_to_index.insert(entry.id, dest.len());
                dest.push(entry);
            }
        }
    }
}
