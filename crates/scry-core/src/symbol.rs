//! Symbol classification shared by the indexer and the query database.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// What a symbol reference points at.
///
/// `Invalid` tombstones a symbol-index slot whose entity lost every def; the
/// slot itself is never physically removed (ids are stable for the process
/// lifetime).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[repr(u8)]
pub enum SymbolKind {
    #[default]
    Invalid = 0,
    File = 1,
    Type = 2,
    Func = 3,
    Var = 4,
}

/// Bitmask describing how a symbol occurrence relates to its entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Role(pub u16);

impl Role {
    pub const NONE: Role = Role(0);
    pub const DECLARATION: Role = Role(1 << 0);
    pub const DEFINITION: Role = Role(1 << 1);
    pub const REFERENCE: Role = Role(1 << 2);
    pub const READ: Role = Role(1 << 3);
    pub const WRITE: Role = Role(1 << 4);
    pub const CALL: Role = Role(1 << 5);
    pub const DYNAMIC: Role = Role(1 << 6);
    pub const ADDRESS: Role = Role(1 << 7);
    pub const IMPLICIT: Role = Role(1 << 8);

    #[inline]
    pub fn contains(self, other: Role) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Role) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Role {
    type Output = Role;
    #[inline]
    fn bitor(self, rhs: Role) -> Role {
        Role(self.0 | rhs.0)
    }
}

impl BitOrAssign for Role {
    #[inline]
    fn bitor_assign(&mut self, rhs: Role) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Role {
    type Output = Role;
    #[inline]
    fn bitand(self, rhs: Role) -> Role {
        Role(self.0 & rhs.0)
    }
}

impl std::fmt::Debug for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(u16, &str); 9] = [
            (1 << 0, "Declaration"),
            (1 << 1, "Definition"),
            (1 << 2, "Reference"),
            (1 << 3, "Read"),
            (1 << 4, "Write"),
            (1 << 5, "Call"),
            (1 << 6, "Dynamic"),
            (1 << 7, "Address"),
            (1 << 8, "Implicit"),
        ];
        if self.0 == 0 {
            return write!(f, "Role(None)");
        }
        let mut first = true;
        write!(f, "Role(")?;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Storage class of a variable or function, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum StorageClass {
    #[default]
    Invalid = 0,
    None = 1,
    Extern = 2,
    Static = 3,
    PrivateExtern = 4,
    Auto = 5,
    Register = 6,
}

/// Source language of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    Unknown,
    C,
    Cpp,
    ObjC,
    ObjCpp,
}

impl Language {
    /// The LSP `languageId` spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Unknown => "",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::ObjC => "objective-c",
            Language::ObjCpp => "objective-cpp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_bit_ops() {
        let role = Role::DECLARATION | Role::DEFINITION;
        assert!(role.contains(Role::DECLARATION));
        assert!(role.contains(Role::DEFINITION));
        assert!(!role.contains(Role::CALL));
        assert!(role.intersects(Role::DEFINITION | Role::CALL));
        assert!(!role.intersects(Role::READ));
    }

    #[test]
    fn role_debug_names_set_bits() {
        let role = Role::REFERENCE | Role::IMPLICIT;
        assert_eq!(format!("{role:?}"), "Role(Reference|Implicit)");
    }
}
