//! Single-writer ownership of indexed files across translation units.
//!
//! Two translation units including the same header would both emit facts for
//! it; only the first parse to claim the header gets to own its
//! [`IndexFile`]. The process-wide used-files set is the truth.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use scry_core::AbsPath;

use crate::IndexFile;

/// Process-wide set of files some parse already owns.
#[derive(Default)]
pub struct FileConsumerSharedState {
    used_files: Mutex<HashSet<AbsPath>>,
}

impl FileConsumerSharedState {
    pub fn new() -> FileConsumerSharedState {
        FileConsumerSharedState::default()
    }

    /// Returns true iff the caller is the first to claim `path`.
    pub fn mark(&self, path: &AbsPath) -> bool {
        let mut used = self.used_files.lock().unwrap_or_else(|e| e.into_inner());
        used.insert(path.clone())
    }

    /// Releases `path` so a later parse can claim it again.
    pub fn reset(&self, path: &AbsPath) {
        let mut used = self.used_files.lock().unwrap_or_else(|e| e.into_inner());
        used.remove(path);
    }
}

/// Per-parse bookkeeping: which files this parse owns, and their in-progress
/// index facts.
pub struct FileConsumer<'a> {
    shared: &'a FileConsumerSharedState,
    parse_file: AbsPath,
    /// `None` marks a file some other parse owns, so repeat lookups skip the
    /// shared set.
    local: HashMap<AbsPath, Option<IndexFile>>,
}

impl<'a> FileConsumer<'a> {
    pub fn new(shared: &'a FileConsumerSharedState, parse_file: AbsPath) -> FileConsumer<'a> {
        FileConsumer {
            shared,
            parse_file,
            local: HashMap::new(),
        }
    }

    /// The translation unit this consumer is parsing for.
    pub fn parse_file(&self) -> &AbsPath {
        &self.parse_file
    }

    /// Attempts to claim `path` for this parse. Returns the file's index
    /// facts when this parse owns it, `None` when another parse got there
    /// first.
    pub fn try_consume(&mut self, path: &AbsPath) -> Option<&mut IndexFile> {
        if !self.local.contains_key(path) {
            let owned = self.shared.mark(path);
            let entry = owned.then(|| IndexFile::new(path.clone()));
            self.local.insert(path.clone(), entry);
        }
        self.local.get_mut(path).and_then(|entry| entry.as_mut())
    }

    /// Takes every owned index file out of the consumer.
    pub fn take_local_state(self) -> Vec<IndexFile> {
        self.local.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_wins() {
        let shared = FileConsumerSharedState::new();
        let header = AbsPath::new("/foo.h");

        let mut first = FileConsumer::new(&shared, AbsPath::new("/a.cc"));
        let mut second = FileConsumer::new(&shared, AbsPath::new("/b.cc"));

        assert!(first.try_consume(&header).is_some());
        assert!(second.try_consume(&header).is_none());
        // Repeat lookups stay consistent for both.
        assert!(first.try_consume(&header).is_some());
        assert!(second.try_consume(&header).is_none());
    }

    #[test]
    fn reset_releases_ownership() {
        let shared = FileConsumerSharedState::new();
        let header = AbsPath::new("/foo.h");

        {
            let mut consumer = FileConsumer::new(&shared, AbsPath::new("/a.cc"));
            assert!(consumer.try_consume(&header).is_some());
            let owned = consumer.take_local_state();
            assert_eq!(owned.len(), 1);
            assert_eq!(owned[0].path, header);
        }

        shared.reset(&header);
        let mut later = FileConsumer::new(&shared, AbsPath::new("/c.cc"));
        assert!(later.try_consume(&header).is_some());
    }
}
