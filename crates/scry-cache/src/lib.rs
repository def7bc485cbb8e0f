//! Per-file on-disk index caches.
//!
//! Each indexed file's [`IndexFile`] is persisted under a configured cache
//! directory so a restart can diff against the last indexed state instead of
//! reindexing the world. Nothing is loaded up front; the pipeline consults
//! the cache lazily per request.
//!
//! A cache entry is an envelope (schema version + payload) serialized as
//! JSON or MessagePack. A missing or corrupt entry is never an error to the
//! pipeline: it degrades to "no previous index".

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use scry_core::AbsPath;
use scry_index::IndexFile;

/// Bump when the on-disk layout of [`IndexFile`] changes.
const SCHEMA_VERSION: u32 = 1;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("messagepack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("messagepack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("incompatible cache schema version: expected {expected}, found {found}")]
    IncompatibleSchemaVersion { expected: u32, found: u32 },
}

/// Serialization format for cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    #[default]
    Json,
    MessagePack,
}

impl CacheFormat {
    fn extension(self) -> &'static str {
        match self {
            CacheFormat::Json => "json",
            CacheFormat::MessagePack => "mpack",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    index: IndexFile,
}

/// Stores and loads one [`IndexFile`] per indexed path.
pub struct IndexCache {
    cache_dir: PathBuf,
    format: CacheFormat,
}

impl IndexCache {
    pub fn new(cache_dir: impl Into<PathBuf>, format: CacheFormat) -> IndexCache {
        IndexCache {
            cache_dir: cache_dir.into(),
            format,
        }
    }

    /// The on-disk location for `path`'s entry.
    pub fn entry_path(&self, path: &AbsPath) -> PathBuf {
        let escaped = escape_file_name(path.as_str());
        self.cache_dir
            .join(format!("{escaped}.{}", self.format.extension()))
    }

    /// Loads the cached index for `path`. Missing or unreadable entries
    /// yield `None`; the caller indexes from scratch.
    pub fn load(&self, path: &AbsPath) -> Option<IndexFile> {
        let entry = self.entry_path(path);
        match self.try_load(&entry) {
            Ok(index) => Some(index),
            Err(CacheError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(
                    target: "scry.cache",
                    path = %path,
                    entry = %entry.display(),
                    error = %err,
                    "discarding unreadable index cache entry"
                );
                None
            }
        }
    }

    fn try_load(&self, entry: &Path) -> Result<IndexFile> {
        let bytes = fs::read(entry)?;
        let envelope: Envelope = match self.format {
            CacheFormat::Json => serde_json::from_slice(&bytes)?,
            CacheFormat::MessagePack => rmp_serde::from_slice(&bytes)?,
        };
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(CacheError::IncompatibleSchemaVersion {
                expected: SCHEMA_VERSION,
                found: envelope.schema_version,
            });
        }
        let mut index = envelope.index;
        index.restore_usr_tables();
        Ok(index)
    }

    /// Persists `index`, replacing any previous entry for its path.
    pub fn store(&self, index: &IndexFile) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let bytes = match self.format {
            CacheFormat::Json => serde_json::to_vec(&Envelope {
                schema_version: SCHEMA_VERSION,
                index: index.clone(),
            })?,
            CacheFormat::MessagePack => rmp_serde::to_vec_named(&Envelope {
                schema_version: SCHEMA_VERSION,
                index: index.clone(),
            })?,
        };

        // Write-then-rename so a crash mid-write cannot leave a truncated
        // entry that later parses as corrupt.
        let entry = self.entry_path(&index.path);
        let tmp = entry.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &entry)?;
        Ok(())
    }
}

/// Flattens an absolute path into a single cache filename.
fn escape_file_name(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '@',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::Usr;

    fn sample_index(path: &str) -> IndexFile {
        let mut index = IndexFile::new(AbsPath::new(path));
        index.last_modification_time = 1234;
        let t = index.type_id(Usr::from_string("T"));
        index.resolve_type(t).def.detailed_name = "struct T".to_string();
        index
    }

    #[test]
    fn round_trips_json() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::Json);
        let index = sample_index("/src/foo.cc");

        cache.store(&index).unwrap();
        let loaded = cache.load(&index.path).expect("entry exists");
        assert_eq!(loaded.path, index.path);
        assert_eq!(loaded.last_modification_time, 1234);
        assert_eq!(loaded.types.len(), 1);
    }

    #[test]
    fn round_trips_messagepack() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::MessagePack);
        let index = sample_index("/src/foo.cc");

        cache.store(&index).unwrap();
        let loaded = cache.load(&index.path).expect("entry exists");
        assert_eq!(loaded, {
            let mut expected = index.clone();
            expected.restore_usr_tables();
            expected
        });
    }

    #[test]
    fn usr_tables_work_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::Json);
        let index = sample_index("/src/foo.cc");
        cache.store(&index).unwrap();

        let mut loaded = cache.load(&index.path).unwrap();
        // Resolving the same USR must find the persisted record, not mint a
        // duplicate.
        let id = loaded.type_id(Usr::from_string("T"));
        assert_eq!(id.index(), 0);
        assert_eq!(loaded.types.len(), 1);
    }

    #[test]
    fn missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::Json);
        assert!(cache.load(&AbsPath::new("/absent.cc")).is_none());
    }

    #[test]
    fn corrupt_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::Json);
        let index = sample_index("/src/foo.cc");
        fs::write(cache.entry_path(&index.path), b"{ not json").unwrap();
        assert!(cache.load(&index.path).is_none());
    }

    #[test]
    fn entries_are_flat_files_under_the_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), CacheFormat::Json);
        let a = cache.entry_path(&AbsPath::new("/a/b.cc"));
        assert_eq!(a.parent(), Some(dir.path()));
        assert_eq!(a.file_name().unwrap().to_str().unwrap(), "@a@b.cc.json");
        let c = cache.entry_path(&AbsPath::new("/a/c.cc"));
        assert_ne!(a, c);
    }
}
