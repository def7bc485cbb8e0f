//! Shared, dependency-minimized core types used across scry.

pub mod id;
pub mod symbol;

mod path;
mod text;

pub use id::{AnyId, FileId, FuncId, LocalFuncId, LocalTypeId, LocalVarId, TypeId, VarId};
pub use path::{normalize_path, AbsPath};
pub use symbol::{Language, Role, StorageClass, SymbolKind};
pub use text::{Position, Range};

/// The current scry version, used for on-disk cache compatibility checks.
pub const SCRY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A 64-bit hash of the parser's Unified Symbol Resolution string.
///
/// This is the cross-translation-unit identity of a type, function or
/// variable. The hash must be stable across processes because it is written
/// into the per-file index caches.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Usr(pub u64);

impl Usr {
    /// Hashes a raw USR string (FNV-1a, 64 bit).
    pub fn from_string(usr: &str) -> Usr {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for byte in usr.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        Usr(hash)
    }
}
