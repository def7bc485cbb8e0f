//! Stable numeric ids for semantic-highlight publishes.
//!
//! Clients animate token color changes; if the id of `std::string` changed
//! on every publish the editor would flicker. Ids are stable per (kind,
//! detailed name): first within the file, then across the other cached
//! files, and only then freshly minted.

use std::collections::HashMap;

use scry_core::{AbsPath, SymbolKind};
use scry_sync::LruCache;

const CACHE_SIZE: usize = 10;

#[derive(Debug, Default)]
struct Entry {
    type_name_to_id: HashMap<String, u32>,
    func_name_to_id: HashMap<String, u32>,
    var_name_to_id: HashMap<String, u32>,
}

impl Entry {
    fn map(&self, kind: SymbolKind) -> Option<&HashMap<String, u32>> {
        match kind {
            SymbolKind::Type => Some(&self.type_name_to_id),
            SymbolKind::Func => Some(&self.func_name_to_id),
            SymbolKind::Var => Some(&self.var_name_to_id),
            SymbolKind::File | SymbolKind::Invalid => None,
        }
    }

    fn map_mut(&mut self, kind: SymbolKind) -> Option<&mut HashMap<String, u32>> {
        match kind {
            SymbolKind::Type => Some(&mut self.type_name_to_id),
            SymbolKind::Func => Some(&mut self.func_name_to_id),
            SymbolKind::Var => Some(&mut self.var_name_to_id),
            SymbolKind::File | SymbolKind::Invalid => None,
        }
    }
}

/// Per-file name→id tables behind a bounded LRU.
pub struct SemanticHighlightCache {
    entries: LruCache<AbsPath, Entry>,
    next_stable_id: u32,
}

impl SemanticHighlightCache {
    pub fn new() -> SemanticHighlightCache {
        SemanticHighlightCache {
            entries: LruCache::new(CACHE_SIZE),
            next_stable_id: 0,
        }
    }

    /// Returns the stable id for `(kind, detailed_name)` in `path`.
    ///
    /// Lookup order: this file's table, then every other cached file's table
    /// (the symbol moved or the file was re-opened), then a fresh id.
    pub fn stable_id(&mut self, path: &AbsPath, kind: SymbolKind, detailed_name: &str) -> u32 {
        let entry = self
            .entries
            .get_or_insert_with(path.clone(), Entry::default);
        if let Some(&id) = entry.map(kind).and_then(|map| map.get(detailed_name)) {
            return id;
        }

        let mut found = None;
        self.entries.iter_values(|other| {
            if let Some(&id) = other.map(kind).and_then(|map| map.get(detailed_name)) {
                found = Some(id);
                return false;
            }
            true
        });

        let id = found.unwrap_or_else(|| {
            let id = self.next_stable_id;
            self.next_stable_id += 1;
            id
        });

        if let Some(map) = self
            .entries
            .get_mut(path)
            .and_then(|entry| entry.map_mut(kind))
        {
            map.insert(detailed_name.to_string(), id);
        }
        id
    }
}

impl Default for SemanticHighlightCache {
    fn default() -> Self {
        SemanticHighlightCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_file() {
        let mut cache = SemanticHighlightCache::new();
        let path = AbsPath::new("/a.cc");
        let first = cache.stable_id(&path, SymbolKind::Type, "struct Foo");
        let second = cache.stable_id(&path, SymbolKind::Type, "struct Foo");
        assert_eq!(first, second);

        let other = cache.stable_id(&path, SymbolKind::Type, "struct Bar");
        assert_ne!(first, other);
    }

    #[test]
    fn ids_are_reused_across_files() {
        let mut cache = SemanticHighlightCache::new();
        let a = AbsPath::new("/a.cc");
        let b = AbsPath::new("/b.cc");
        let in_a = cache.stable_id(&a, SymbolKind::Func, "void f()");
        let in_b = cache.stable_id(&b, SymbolKind::Func, "void f()");
        assert_eq!(in_a, in_b);
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut cache = SemanticHighlightCache::new();
        let path = AbsPath::new("/a.cc");
        let as_type = cache.stable_id(&path, SymbolKind::Type, "Foo");
        let as_var = cache.stable_id(&path, SymbolKind::Var, "Foo");
        assert_ne!(as_type, as_var);
    }
}
