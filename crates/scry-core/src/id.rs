//! Strongly-typed IDs used across scry.
//!
//! Two id spaces exist and must never be mixed:
//!
//! - *Local* ids are dense indices into one [`IndexFile`]'s own symbol
//!   vectors. They are only meaningful paired with that file.
//! - *Query* ids are dense indices into the global `QueryDatabase` vectors,
//!   minted on first sight of a USR (or file path) and never reused for the
//!   lifetime of the process.
//!
//! All of these are `#[repr(transparent)]` newtypes around `u32` to keep them
//! cheap and type-safe.
//!
//! [`IndexFile`]: https://docs.rs/scry-index

macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Copy,
            Clone,
            Eq,
            PartialEq,
            Hash,
            Ord,
            PartialOrd,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn to_raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// Query-space ids (global, owned by the query database).
define_id!(FileId);
define_id!(TypeId);
define_id!(FuncId);
define_id!(VarId);

// Local ids (per translation-unit index).
define_id!(LocalTypeId);
define_id!(LocalFuncId);
define_id!(LocalVarId);

/// An untyped query-space id, interpreted through a `SymbolKind` discriminant.
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct AnyId(pub u32);

impl AnyId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for AnyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyId({})", self.0)
    }
}

impl From<FileId> for AnyId {
    fn from(id: FileId) -> Self {
        AnyId(id.to_raw())
    }
}
impl From<TypeId> for AnyId {
    fn from(id: TypeId) -> Self {
        AnyId(id.to_raw())
    }
}
impl From<FuncId> for AnyId {
    fn from(id: FuncId) -> Self {
        AnyId(id.to_raw())
    }
}
impl From<VarId> for AnyId {
    fn from(id: VarId) -> Self {
        AnyId(id.to_raw())
    }
}
