//! Normalized absolute paths.
//!
//! Paths act as the identity of files everywhere in scry (the query database
//! keys files by path, the disk cache derives filenames from them), so every
//! path crossing a crate boundary is normalized once, up front.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An absolute, lexically-normalized path.
///
/// Normalization removes `.` segments and resolves `..` lexically, without
/// consulting the filesystem. Two `AbsPath`s compare equal iff they identify
/// the same file under that scheme.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbsPath(String);

impl AbsPath {
    /// Builds an `AbsPath` from something already known to be absolute.
    ///
    /// Relative input is normalized as-is; callers resolving editor URIs go
    /// through the URI layer which always yields absolute paths.
    pub fn new(path: impl AsRef<Path>) -> AbsPath {
        AbsPath(normalize_path(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// The file-name component, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.as_path().file_name().and_then(|name| name.to_str())
    }
}

impl fmt::Debug for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbsPath({:?})", self.0)
    }
}

impl fmt::Display for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for AbsPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl From<&str> for AbsPath {
    fn from(path: &str) -> AbsPath {
        AbsPath::new(path)
    }
}

/// Lexically normalizes `path`: collapses `.`, resolves `..` against the
/// preceding component, and joins with `/`.
pub fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut prefix = String::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => {
                prefix = p.as_os_str().to_string_lossy().into_owned();
            }
            Component::RootDir => {
                parts.clear();
            }
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(segment) => {
                parts.push(segment.to_string_lossy().into_owned());
            }
        }
    }

    let mut out = prefix;
    for part in &parts {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(AbsPath::new("/a/./b/../c").as_str(), "/a/c");
        assert_eq!(AbsPath::new("/a//b/").as_str(), "/a/b");
        assert_eq!(AbsPath::new("/").as_str(), "/");
    }

    #[test]
    fn equality_after_normalization() {
        assert_eq!(AbsPath::new("/x/y/../y/z"), AbsPath::new("/x/y/z"));
    }
}
