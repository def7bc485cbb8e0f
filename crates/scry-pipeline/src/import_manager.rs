//! Per-path import status, preventing overlapping applies.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use scry_core::AbsPath;

/// Where a file stands in the indexing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStatus {
    /// Never touched by the pipeline.
    #[default]
    NotSeen,
    /// In the pipeline, not yet in the query database.
    ProcessingInitialImport,
    /// In the query database, not currently in the pipeline.
    Imported,
    /// In the query database and being refreshed.
    ProcessingUpdate,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStatus::NotSeen => "NotSeen",
            ImportStatus::ProcessingInitialImport => "ProcessingInitialImport",
            ImportStatus::Imported => "Imported",
            ImportStatus::ProcessingUpdate => "ProcessingUpdate",
        };
        f.write_str(name)
    }
}

/// Transition used when a file enters the pipeline.
pub fn begin_import(status: ImportStatus) -> ImportStatus {
    match status {
        ImportStatus::NotSeen => ImportStatus::ProcessingInitialImport,
        ImportStatus::Imported => ImportStatus::ProcessingUpdate,
        other => other,
    }
}

/// Transition used once a file's update has been applied (or skipped).
pub fn finish_import(status: ImportStatus) -> ImportStatus {
    match status {
        ImportStatus::ProcessingInitialImport | ImportStatus::ProcessingUpdate => {
            ImportStatus::Imported
        }
        other => other,
    }
}

/// Tracks import status per path so the same file is never imported twice
/// concurrently. Reads take the shared lock; every transition re-reads the
/// current status under the exclusive lock before writing (CAS semantics).
#[derive(Default)]
pub struct ImportManager {
    status: RwLock<HashMap<AbsPath, ImportStatus>>,
}

impl ImportManager {
    pub fn new() -> ImportManager {
        ImportManager::default()
    }

    pub fn status(&self, path: &AbsPath) -> ImportStatus {
        let status = self.status.read().unwrap_or_else(|e| e.into_inner());
        status.get(path).copied().unwrap_or_default()
    }

    /// Atomically maps the current status through `transition`. Returns true
    /// iff the status actually changed; a transition to self is a no-op and
    /// returns false.
    pub fn set_status_atomic(
        &self,
        path: &AbsPath,
        transition: impl Fn(ImportStatus) -> ImportStatus,
    ) -> bool {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        set_status_locked(&mut status, path, &transition)
    }

    /// Applies `transition` to every path under one exclusive lock.
    pub fn set_status_atomic_batch(
        &self,
        paths: &[AbsPath],
        transition: impl Fn(ImportStatus) -> ImportStatus,
    ) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        for path in paths {
            set_status_locked(&mut status, path, &transition);
        }
    }
}

fn set_status_locked(
    status: &mut HashMap<AbsPath, ImportStatus>,
    path: &AbsPath,
    transition: &impl Fn(ImportStatus) -> ImportStatus,
) -> bool {
    let current = status.get(path).copied().unwrap_or_default();
    let new_status = transition(current);
    if new_status == current {
        return false;
    }
    status.insert(path.clone(), new_status);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lifecycle_transitions() {
        let manager = ImportManager::new();
        let path = AbsPath::new("/a.cc");

        assert_eq!(manager.status(&path), ImportStatus::NotSeen);
        assert!(manager.set_status_atomic(&path, begin_import));
        assert_eq!(manager.status(&path), ImportStatus::ProcessingInitialImport);

        // Already processing: a repeat begin is a no-op.
        assert!(!manager.set_status_atomic(&path, begin_import));

        assert!(manager.set_status_atomic(&path, finish_import));
        assert_eq!(manager.status(&path), ImportStatus::Imported);

        assert!(manager.set_status_atomic(&path, begin_import));
        assert_eq!(manager.status(&path), ImportStatus::ProcessingUpdate);
        assert!(manager.set_status_atomic(&path, finish_import));
        assert_eq!(manager.status(&path), ImportStatus::Imported);
    }

    #[test]
    fn concurrent_cas_has_exactly_one_winner() {
        let manager = Arc::new(ImportManager::new());
        let path = AbsPath::new("/race.cc");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let path = path.clone();
            handles.push(thread::spawn(move || {
                manager.set_status_atomic(&path, begin_import)
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1, "exactly one CAS may win the initial import");
        assert_eq!(
            manager.status(&path),
            ImportStatus::ProcessingInitialImport
        );
    }

    #[test]
    fn batch_updates_under_one_lock() {
        let manager = ImportManager::new();
        let paths = vec![AbsPath::new("/a.cc"), AbsPath::new("/b.cc")];
        manager.set_status_atomic_batch(&paths, begin_import);
        assert_eq!(
            manager.status(&paths[0]),
            ImportStatus::ProcessingInitialImport
        );
        assert_eq!(
            manager.status(&paths[1]),
            ImportStatus::ProcessingInitialImport
        );
    }
}
