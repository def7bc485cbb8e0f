//! Memoized completion results.
//!
//! Two instances exist: a *global* cache keyed by path only (member lists at
//! a fresh line) and a *non-global* cache keyed by path + position
//! (signature help, dot/arrow completion). The caller picks which cache a
//! response lands in.

use std::sync::Mutex;

use scry_core::{AbsPath, Position};

#[derive(Default)]
struct CacheState {
    path: Option<AbsPath>,
    /// `None` for the global cache: any position in the file hits.
    position: Option<Position>,
    results: Vec<lsp_types::CompletionItem>,
}

/// Last-response cache so erasing a character replays instantly (the editor
/// re-requests completion on every keystroke).
#[derive(Default)]
pub struct CodeCompleteCache {
    state: Mutex<CacheState>,
}

impl CodeCompleteCache {
    pub fn new() -> CodeCompleteCache {
        CodeCompleteCache::default()
    }

    /// Runs `f` under the cache lock. All reads and writes go through here;
    /// the read-check-reply sequence must not interleave with a concurrent
    /// refresh.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut CodeCompleteCacheView<'_>) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut CodeCompleteCacheView { state: &mut state })
    }
}

/// Locked view over the cache contents.
pub struct CodeCompleteCacheView<'a> {
    state: &'a mut CacheState,
}

impl CodeCompleteCacheView<'_> {
    /// Whether the cached results cover `path` at `position`. A cache
    /// populated without a position (global) matches any position in the
    /// same file.
    pub fn is_valid_for(&self, path: &AbsPath, position: Position) -> bool {
        if self.state.path.as_ref() != Some(path) {
            return false;
        }
        match self.state.position {
            None => true,
            Some(cached) => cached == position,
        }
    }

    pub fn results(&self) -> &[lsp_types::CompletionItem] {
        &self.state.results
    }

    /// Stores a global (position-independent) response.
    pub fn store_global(&mut self, path: AbsPath, results: Vec<lsp_types::CompletionItem>) {
        self.state.path = Some(path);
        self.state.position = None;
        self.state.results = results;
    }

    /// Stores a position-keyed response.
    pub fn store_at(
        &mut self,
        path: AbsPath,
        position: Position,
        results: Vec<lsp_types::CompletionItem>,
    ) {
        self.state.path = Some(path);
        self.state.position = Some(position);
        self.state.results = results;
    }

    pub fn clear(&mut self) {
        self.state.path = None;
        self.state.position = None;
        self.state.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str) -> lsp_types::CompletionItem {
        lsp_types::CompletionItem {
            label: label.to_string(),
            ..lsp_types::CompletionItem::default()
        }
    }

    #[test]
    fn global_cache_matches_any_position_in_file() {
        let cache = CodeCompleteCache::new();
        let path = AbsPath::new("/a.cc");
        cache.with_lock(|view| view.store_global(path.clone(), vec![item("foo")]));

        cache.with_lock(|view| {
            assert!(view.is_valid_for(&path, Position::new(1, 1)));
            assert!(view.is_valid_for(&path, Position::new(9, 0)));
            assert!(!view.is_valid_for(&AbsPath::new("/b.cc"), Position::new(1, 1)));
            assert_eq!(view.results().len(), 1);
        });
    }

    #[test]
    fn position_cache_requires_exact_position() {
        let cache = CodeCompleteCache::new();
        let path = AbsPath::new("/a.cc");
        cache.with_lock(|view| {
            view.store_at(path.clone(), Position::new(3, 7), vec![item("sig")])
        });

        cache.with_lock(|view| {
            assert!(view.is_valid_for(&path, Position::new(3, 7)));
            assert!(!view.is_valid_for(&path, Position::new(3, 8)));
        });
    }

    #[test]
    fn clear_invalidates() {
        let cache = CodeCompleteCache::new();
        let path = AbsPath::new("/a.cc");
        cache.with_lock(|view| view.store_global(path.clone(), vec![item("foo")]));
        cache.with_lock(|view| view.clear());
        cache.with_lock(|view| {
            assert!(!view.is_valid_for(&path, Position::new(0, 0)));
        });
    }
}
