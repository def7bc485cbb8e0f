//! Current editor buffers.
//!
//! The store maps absolute paths to [`WorkingFile`]s: the live buffer text,
//! its version, a per-line byte-offset index, the last diagnostics published
//! for the file and the text snapshot the indexer last saw. Buffer text is
//! behind `Arc`, so readers get cheap point-in-time snapshots while edits are
//! applied serially under the store lock.

mod document;
mod lex;

pub use document::{ContentChange, DocumentError, WorkingFile};
pub use lex::CompletionSource;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use scry_core::AbsPath;

/// Store of open editor buffers, keyed by normalized absolute path.
#[derive(Default)]
pub struct WorkingFiles {
    files: Mutex<HashMap<AbsPath, WorkingFile>>,
}

impl WorkingFiles {
    pub fn new() -> WorkingFiles {
        WorkingFiles::default()
    }

    /// Creates (or replaces) the entry for `path`.
    pub fn open(&self, path: AbsPath, text: String, version: i32) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.clone(), WorkingFile::new(path, text, version));
    }

    /// Drops the entry for `path`.
    pub fn close(&self, path: &AbsPath) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.remove(path);
    }

    /// Applies a sequence of incremental edits, in order, against the current
    /// buffer.
    pub fn on_change(
        &self,
        path: &AbsPath,
        new_version: i32,
        changes: &[ContentChange],
    ) -> Result<(), DocumentError> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let file = files.get_mut(path).ok_or(DocumentError::NotOpen)?;
        file.apply_changes(new_version, changes)
    }

    /// Runs `f` under the store lock with the (possibly absent) entry.
    pub fn do_action_on_file<R>(
        &self,
        path: &AbsPath,
        f: impl FnOnce(Option<&mut WorkingFile>) -> R,
    ) -> R {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        f(files.get_mut(path))
    }

    /// Returns a point-in-time snapshot of the buffer text.
    pub fn snapshot(&self, path: &AbsPath) -> Option<Arc<String>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path).map(|file| file.text_arc())
    }

    /// Paths of every open buffer.
    pub fn open_paths(&self) -> Vec<AbsPath> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::{Position, Range};

    #[test]
    fn open_change_close() {
        let store = WorkingFiles::new();
        let path = AbsPath::new("/tmp/a.cc");
        store.open(path.clone(), "int x;\n".to_string(), 1);

        store
            .on_change(
                &path,
                2,
                &[ContentChange::replace(
                    Range::new(Position::new(0, 4), Position::new(0, 5)),
                    "y",
                )],
            )
            .unwrap();
        assert_eq!(store.snapshot(&path).unwrap().as_str(), "int y;\n");

        store.close(&path);
        assert!(store.snapshot(&path).is_none());
        assert!(store.on_change(&path, 3, &[]).is_err());
    }

    #[test]
    fn do_action_sees_missing_entry() {
        let store = WorkingFiles::new();
        let present = store.do_action_on_file(&AbsPath::new("/nope"), |file| file.is_some());
        assert!(!present);
    }
}
