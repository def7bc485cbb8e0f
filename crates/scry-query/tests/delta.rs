//! End-to-end delta scenarios: index two versions of a file, apply the
//! diff, check the database state.

use scry_core::{AbsPath, Position, Range, Role, StorageClass, SymbolKind, Usr};
use scry_index::{IndexFile, LocalRef, VarDef};
use scry_query::{IdMap, IndexUpdate, QueryDatabase};

fn line_ref(line: u32) -> LocalRef {
    LocalRef::plain(
        Range::new(Position::new(line, 0), Position::new(line, 1)),
        Role::REFERENCE,
    )
}

fn import(db: &mut QueryDatabase, file: &IndexFile) -> IdMap {
    let id_map = IdMap::new(db, file);
    let update = IndexUpdate::create_delta(None, &id_map, None, file);
    db.apply_update(update);
    id_map
}

fn delta(db: &mut QueryDatabase, previous: &IndexFile, current: &IndexFile) -> IndexUpdate {
    let prev_map = IdMap::new(db, previous);
    let cur_map = IdMap::new(db, current);
    IndexUpdate::create_delta(Some(&prev_map), &cur_map, Some(previous), current)
}

#[test]
fn removed_defs_are_reported() {
    let mut previous = IndexFile::new(AbsPath::new("/foo.cc"));
    let current = IndexFile::new(AbsPath::new("/foo.cc"));

    let t = previous.type_id(Usr::from_string("usr1"));
    previous.resolve_type(t).def.spell = Some(line_ref(1));
    let f = previous.func_id(Usr::from_string("usr2"));
    previous.resolve_func(f).def.spell = Some(line_ref(2));
    let v = previous.var_id(Usr::from_string("usr3"));
    previous.resolve_var(v).def.spell = Some(line_ref(3));

    let mut db = QueryDatabase::new();
    let update = delta(&mut db, &previous, &current);

    assert_eq!(update.types_removed.len(), 1);
    assert_eq!(update.funcs_removed.len(), 1);
    assert_eq!(update.vars_removed.len(), 1);
}

#[test]
fn ref_only_entities_are_not_removed() {
    // Entities without a def.spell exist only to attribute references; when
    // the references go away the entity must not be removed.
    let mut previous = IndexFile::new(AbsPath::new("/foo.cc"));
    let current = IndexFile::new(AbsPath::new("/foo.cc"));

    let t = previous.type_id(Usr::from_string("usr1"));
    previous.resolve_type(t).uses.push(line_ref(1));
    let f = previous.func_id(Usr::from_string("usr2"));
    previous.resolve_func(f).uses.push(line_ref(2));
    let v = previous.var_id(Usr::from_string("usr3"));
    previous.resolve_var(v).uses.push(line_ref(3));

    let mut db = QueryDatabase::new();
    let update = delta(&mut db, &previous, &current);

    assert!(update.types_removed.is_empty());
    assert!(update.funcs_removed.is_empty());
    assert!(update.vars_removed.is_empty());
}

#[test]
fn func_use_moves_between_lines() {
    let mut previous = IndexFile::new(AbsPath::new("/foo.cc"));
    let mut current = IndexFile::new(AbsPath::new("/foo.cc"));

    let usr = Usr::from_string("usr");
    let pf = previous.func_id(usr);
    previous.resolve_func(pf).uses.push(line_ref(1));
    let cf = current.func_id(usr);
    current.resolve_func(cf).uses.push(line_ref(2));

    let mut db = QueryDatabase::new();
    let update = delta(&mut db, &previous, &current);

    assert!(update.funcs_removed.is_empty());
    assert_eq!(update.funcs_uses.len(), 1);
    let m = &update.funcs_uses[0];
    assert_eq!(m.to_remove.len(), 1);
    assert_eq!(m.to_remove[0].range.start.line, 1);
    assert_eq!(m.to_add.len(), 1);
    assert_eq!(m.to_add[0].range.start.line, 2);
}

#[test]
fn apply_delta_replaces_uses() {
    let mut previous = IndexFile::new(AbsPath::new("/foo.cc"));
    let mut current = IndexFile::new(AbsPath::new("/foo.cc"));

    let usr = Usr::from_string("usr");
    let pf = previous.func_id(usr);
    previous.resolve_func(pf).uses.push(line_ref(1));
    previous.resolve_func(pf).uses.push(line_ref(2));
    let cf = current.func_id(usr);
    current.resolve_func(cf).uses.push(line_ref(4));
    current.resolve_func(cf).uses.push(line_ref(5));

    let mut db = QueryDatabase::new();
    import(&mut db, &previous);
    assert_eq!(db.funcs.len(), 1);
    assert_eq!(db.funcs[0].uses.len(), 2);
    assert_eq!(db.funcs[0].uses[0].range.start.line, 1);

    let update = delta(&mut db, &previous, &current);
    db.apply_update(update);
    assert_eq!(db.funcs[0].uses.len(), 2);
    assert_eq!(db.funcs[0].uses[0].range.start.line, 4);
    assert_eq!(db.funcs[0].uses[1].range.start.line, 5);
}

#[test]
fn remove_variable_with_usage_tombstones_but_keeps_slot() {
    let mut previous = IndexFile::new(AbsPath::new("/foo.cc"));
    let current = IndexFile::new(AbsPath::new("/foo.cc"));

    let v = previous.var_id(Usr::from_string("a"));
    {
        let var = previous.resolve_var(v);
        var.def = VarDef {
            detailed_name: "int a".to_string(),
            short_name_offset: 4,
            short_name_size: 1,
            storage: StorageClass::None,
            parent_kind: SymbolKind::File,
            spell: Some(line_ref(2)),
            ..VarDef::default()
        };
        var.uses.push(line_ref(3));
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &previous);
    assert_eq!(db.vars.len(), 1);
    assert_eq!(db.vars[0].uses.len(), 1);
    assert_eq!(db.vars[0].def.len(), 1);
    let symbol_idx = db.vars[0].symbol_idx.expect("non-local var is indexed");
    assert_eq!(db.symbols[symbol_idx].kind, SymbolKind::Var);

    let update = delta(&mut db, &previous, &current);
    db.apply_update(update);

    // Id not reused, slot still present; def and uses cleared; symbol entry
    // tombstoned.
    assert_eq!(db.vars.len(), 1);
    assert!(db.vars[0].def.is_empty());
    assert!(db.vars[0].uses.is_empty());
    assert_eq!(db.symbols[symbol_idx].kind, SymbolKind::Invalid);
}

#[test]
fn self_delta_is_a_no_op() {
    let mut file = IndexFile::new(AbsPath::new("/foo.cc"));
    let t = file.type_id(Usr::from_string("T"));
    {
        let ty = file.resolve_type(t);
        ty.def.detailed_name = "struct T".to_string();
        ty.def.short_name_size = 1;
        ty.def.short_name_offset = 7;
        ty.def.spell = Some(line_ref(1));
        ty.uses.push(line_ref(5));
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &file);

    let update = delta(&mut db, &file, &file);
    assert!(update.is_no_op(), "create_delta(A, A) must be empty");
}

#[test]
fn forward_then_reverse_delta_restores_previous_state() {
    let path = AbsPath::new("/foo.cc");
    let mut version_a = IndexFile::new(path.clone());
    let mut version_b = IndexFile::new(path);

    let usr = Usr::from_string("f");
    let fa = version_a.func_id(usr);
    {
        let func = version_a.resolve_func(fa);
        func.def.detailed_name = "void f()".to_string();
        func.def.short_name_offset = 5;
        func.def.short_name_size = 1;
        func.def.spell = Some(line_ref(1));
        func.uses.push(line_ref(3));
    }
    let fb = version_b.func_id(usr);
    {
        let func = version_b.resolve_func(fb);
        func.def.detailed_name = "void f()".to_string();
        func.def.short_name_offset = 5;
        func.def.short_name_size = 1;
        func.def.spell = Some(line_ref(1));
        func.uses.push(line_ref(7));
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &version_a);
    let uses_after_a: Vec<_> = db.funcs[0].uses.clone();

    let forward = delta(&mut db, &version_a, &version_b);
    db.apply_update(forward);
    assert_eq!(db.funcs[0].uses[0].range.start.line, 7);

    let reverse = delta(&mut db, &version_b, &version_a);
    db.apply_update(reverse);
    assert_eq!(db.funcs[0].uses, uses_after_a);
}

#[test]
fn merge_coalesces_edges_by_entity() {
    let path = AbsPath::new("/foo.cc");
    let base = IndexFile::new(path.clone());

    let make_version = |line: u32| {
        let mut file = IndexFile::new(path.clone());
        let f = file.func_id(Usr::from_string("f"));
        file.resolve_func(f).uses.push(line_ref(line));
        file
    };

    let v1 = make_version(1);
    let v2 = make_version(2);

    let mut db = QueryDatabase::new();
    let base_map = IdMap::new(&mut db, &base);
    let v1_map = IdMap::new(&mut db, &v1);
    let v2_map = IdMap::new(&mut db, &v2);

    // Two deltas touching the same func's uses coalesce into one entry.
    let mut merged = IndexUpdate::create_delta(Some(&base_map), &v1_map, Some(&base), &v1);
    let second = IndexUpdate::create_delta(Some(&v1_map), &v2_map, Some(&v1), &v2);
    merged.merge(second);

    assert_eq!(merged.funcs_uses.len(), 1);
    let m = &merged.funcs_uses[0];
    assert_eq!(m.to_add.len(), 2);
    assert_eq!(m.to_remove.len(), 1);

    // Applying the merged update leaves the same state as applying the two
    // updates in sequence.
    db.apply_update(merged);
    assert_eq!(db.funcs[0].uses.len(), 1);
    assert_eq!(db.funcs[0].uses[0].range.start.line, 2);
}

#[test]
fn multi_def_entities_keep_sibling_defs_on_single_file_removal() {
    // A template defined in two headers: removing one header's def must
    // leave the other intact.
    let usr = Usr::from_string("T");

    let mut header_a = IndexFile::new(AbsPath::new("/a.h"));
    let ta = header_a.type_id(usr);
    {
        let ty = header_a.resolve_type(ta);
        ty.def.detailed_name = "struct T".to_string();
        ty.def.spell = Some(line_ref(1));
    }

    let mut header_b = IndexFile::new(AbsPath::new("/b.h"));
    let tb = header_b.type_id(usr);
    {
        let ty = header_b.resolve_type(tb);
        ty.def.detailed_name = "struct T".to_string();
        ty.def.spell = Some(line_ref(9));
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &header_a);
    import(&mut db, &header_b);
    assert_eq!(db.types.len(), 1);
    assert_eq!(db.types[0].def.len(), 2);

    // Reindex header_b as empty.
    let empty_b = IndexFile::new(AbsPath::new("/b.h"));
    let update = delta(&mut db, &header_b, &empty_b);
    db.apply_update(update);

    assert_eq!(db.types[0].def.len(), 1);
    let b_id = db.usr_to_file[&AbsPath::new("/b.h")];
    assert!(db.types[0].def.iter().all(|d| d.file != b_id));
    // Still alive in the symbol index.
    let symbol_idx = db.types[0].symbol_idx.unwrap();
    assert_eq!(db.symbols[symbol_idx].kind, SymbolKind::Type);
}

#[test]
fn usr_tables_agree_with_forward_vectors() {
    let mut file = IndexFile::new(AbsPath::new("/foo.cc"));
    for name in ["a", "b", "c"] {
        let t = file.type_id(Usr::from_string(name));
        let ty = file.resolve_type(t);
        ty.def.detailed_name = format!("struct {name}");
        ty.def.spell = Some(line_ref(1));
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &file);

    for (usr, id) in &db.usr_to_type {
        assert_eq!(db.types[id.index()].usr, *usr);
    }
    for (path, id) in &db.usr_to_file {
        assert_eq!(&db.files[id.index()].path, path);
    }
}

#[test]
fn local_variables_stay_out_of_the_symbol_index() {
    let mut file = IndexFile::new(AbsPath::new("/foo.cc"));
    let v = file.var_id(Usr::from_string("local"));
    {
        let var = file.resolve_var(v);
        var.def = VarDef {
            detailed_name: "int x".to_string(),
            storage: StorageClass::Auto,
            spell: Some(line_ref(2)),
            ..VarDef::default()
        };
    }

    let mut db = QueryDatabase::new();
    import(&mut db, &file);

    assert_eq!(db.vars.len(), 1);
    assert_eq!(db.vars[0].def.len(), 1);
    assert!(db.vars[0].symbol_idx.is_none());
    assert!(db.symbols.iter().all(|s| s.kind != SymbolKind::Var));
}
