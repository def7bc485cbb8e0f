//! Token extraction around a completion point.

use scry_core::Position;

use crate::WorkingFile;

/// The token the user is completing, with the range completion items should
/// replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSource {
    /// Position at the start of the token; this is where completion is
    /// actually requested so results stay stable while the user keeps
    /// typing.
    pub stable_position: Position,
    /// The partial identifier already typed, used to fuzzy-filter results.
    pub existing_text: String,
    /// End of the token; replacing `[stable_position, end)` inserts an item.
    pub end: Position,
    /// Whether the token is qualified from the global namespace (`::tok`).
    pub is_global: bool,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl WorkingFile {
    /// Shifts `position` back over the identifier under it and extracts that
    /// token. Completion requests are issued at the token start, so a cached
    /// result stays valid while the user extends or erases the token tail.
    pub fn find_stable_completion_source(&self, position: Position) -> CompletionSource {
        let offset = self.position_to_offset(position);
        let bytes = self.text().as_bytes();

        let mut start = offset;
        while start > 0 && is_ident_byte(bytes[start - 1]) {
            start -= 1;
        }
        let mut end = offset;
        while end < bytes.len() && is_ident_byte(bytes[end]) {
            end += 1;
        }

        let is_global = start >= 2 && &bytes[start - 2..start] == b"::";

        CompletionSource {
            stable_position: self.offset_to_position(start),
            existing_text: self.text()[start..end].to_string(),
            end: self.offset_to_position(end),
            is_global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::AbsPath;

    fn file(text: &str) -> WorkingFile {
        WorkingFile::new(AbsPath::new("/test.cc"), text, 1)
    }

    #[test]
    fn extracts_token_around_cursor() {
        let doc = file("int foobar = 1;\n");
        let source = doc.find_stable_completion_source(Position::new(0, 7));
        assert_eq!(source.stable_position, Position::new(0, 4));
        assert_eq!(source.existing_text, "foobar");
        assert_eq!(source.end, Position::new(0, 10));
        assert!(!source.is_global);
    }

    #[test]
    fn detects_global_qualifier() {
        let doc = file("auto x = ::mak\n");
        let source = doc.find_stable_completion_source(Position::new(0, 14));
        assert_eq!(source.existing_text, "mak");
        assert!(source.is_global);
    }

    #[test]
    fn empty_token_at_whitespace() {
        let doc = file("a b\n");
        let source = doc.find_stable_completion_source(Position::new(0, 2));
        assert_eq!(source.existing_text, "b");
        assert_eq!(source.stable_position, Position::new(0, 2));
    }
}
