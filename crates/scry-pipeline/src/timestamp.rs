//! Last-known modification times, backed by the disk cache.

use std::collections::HashMap;
use std::sync::Mutex;

use scry_cache::IndexCache;
use scry_core::AbsPath;

/// Caches the modification time each path was last indexed at. On a miss
/// the disk cache is consulted before declaring the time unknown, so a
/// restarted server still skips files that have not changed since the last
/// run.
#[derive(Default)]
pub struct TimestampManager {
    timestamps: Mutex<HashMap<AbsPath, i64>>,
}

impl TimestampManager {
    pub fn new() -> TimestampManager {
        TimestampManager::default()
    }

    pub fn last_cached_modification_time(
        &self,
        cache: &IndexCache,
        path: &AbsPath,
    ) -> Option<i64> {
        {
            let timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(&time) = timestamps.get(path) {
                return Some(time);
            }
        }
        let index = cache.load(path)?;
        self.update(path, index.last_modification_time);
        Some(index.last_modification_time)
    }

    pub fn update(&self, path: &AbsPath, timestamp: i64) {
        let mut timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
        timestamps.insert(path.clone(), timestamp);
    }
}
