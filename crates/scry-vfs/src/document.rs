//! One open buffer: text, version, line index, per-file caches.

use std::fmt;
use std::sync::Arc;

use scry_core::{AbsPath, Position, Range};

/// An LSP-style content change.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    /// The range of text to replace. If `None`, the entire document is
    /// replaced.
    pub range: Option<Range>,
    /// Replacement text.
    pub text: String,
}

impl ContentChange {
    pub fn full(text: impl Into<String>) -> ContentChange {
        ContentChange {
            range: None,
            text: text.into(),
        }
    }

    pub fn replace(range: Range, text: impl Into<String>) -> ContentChange {
        ContentChange {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    NotOpen,
    InvalidRange,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::NotOpen => write!(f, "document not open"),
            DocumentError::InvalidRange => write!(f, "invalid range"),
        }
    }
}

impl std::error::Error for DocumentError {}

/// An open editor buffer with versioning and incremental edits.
pub struct WorkingFile {
    path: AbsPath,
    text: Arc<String>,
    version: i32,
    line_offsets: Vec<usize>,
    /// Diagnostics most recently published for this buffer, kept so
    /// `textDocument/codeAction` and re-publish checks can consult them
    /// without round-tripping through the pipeline.
    pub published_diagnostics: Vec<lsp_types::Diagnostic>,
    /// The buffer content the indexer last consumed, if any. Navigation on a
    /// dirty buffer maps positions against this snapshot.
    pub index_snapshot: Option<Arc<String>>,
}

impl WorkingFile {
    pub fn new(path: AbsPath, text: impl Into<String>, version: i32) -> WorkingFile {
        let text = Arc::new(text.into());
        let line_offsets = compute_line_offsets(&text);
        WorkingFile {
            path,
            text,
            version,
            line_offsets,
            published_diagnostics: Vec::new(),
            index_snapshot: None,
        }
    }

    pub fn path(&self) -> &AbsPath {
        &self.path
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn text_arc(&self) -> Arc<String> {
        Arc::clone(&self.text)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Applies incremental LSP changes in order.
    pub fn apply_changes(
        &mut self,
        new_version: i32,
        changes: &[ContentChange],
    ) -> Result<(), DocumentError> {
        for change in changes {
            self.apply_change(change)?;
        }
        self.version = new_version;
        Ok(())
    }

    fn apply_change(&mut self, change: &ContentChange) -> Result<(), DocumentError> {
        let range = match change.range {
            Some(range) => range,
            None => Range::new(Position::new(0, 0), self.end_position()),
        };

        let start = self.position_to_offset(range.start);
        let end = self.position_to_offset(range.end);
        if start > end || end > self.text.len() {
            return Err(DocumentError::InvalidRange);
        }

        let text = Arc::make_mut(&mut self.text);
        text.replace_range(start..end, &change.text);
        self.line_offsets = compute_line_offsets(text);
        Ok(())
    }

    pub fn end_position(&self) -> Position {
        let last_line = self.line_offsets.len().saturating_sub(1) as u32;
        let line_start = *self.line_offsets.last().unwrap_or(&0);
        let line_text = &self.text[line_start..];
        Position::new(last_line, utf16_len(line_text) as u32)
    }

    /// Maps an LSP position (UTF-16 column) to a byte offset. Out-of-range
    /// positions clamp to the nearest valid offset.
    pub fn position_to_offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_offsets.len() {
            return self.text.len();
        }

        let line_start = self.line_offsets[line];
        let line_end = self.line_content_end(line);
        let line_slice = &self.text[line_start..line_end];
        line_start + utf16_column_to_byte_offset_clamped(line_slice, position.column)
    }

    /// Maps a byte offset back to an LSP position.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(line) => line,
            Err(insert) => insert - 1,
        };
        let line_start = self.line_offsets[line];
        let column = utf16_len(&self.text[line_start..offset]);
        Position::new(line as u32, column as u32)
    }

    /// End offset of a line's text, excluding its terminator. LSP positions
    /// are defined over the line text, not including `\n` or `\r\n`.
    fn line_content_end(&self, line: usize) -> usize {
        let line_start = self.line_offsets[line];
        let mut line_end = if line + 1 < self.line_offsets.len() {
            self.line_offsets[line + 1]
        } else {
            self.text.len()
        };

        let bytes = self.text.as_bytes();
        if line_end > line_start {
            if bytes[line_end - 1] == b'\n' {
                line_end -= 1;
                if line_end > line_start && bytes[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
            } else if bytes[line_end - 1] == b'\r' {
                line_end -= 1;
            }
        }
        line_end
    }
}

fn compute_line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                offsets.push(i + 1);
                i += 1;
            }
            b'\r' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    offsets.push(i + 2);
                    i += 2;
                } else {
                    offsets.push(i + 1);
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    offsets
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(|c| c.len_utf16()).sum()
}

/// Converts a UTF-16 code unit column into a byte offset into `line`.
///
/// The conversion is clamped: columns past the end of the line map to the
/// line end, and columns splitting a surrogate pair map to the start of that
/// character.
fn utf16_column_to_byte_offset_clamped(line: &str, column_utf16: u32) -> usize {
    let mut col: u32 = 0;
    for (idx, ch) in line.char_indices() {
        let ch_len = ch.len_utf16() as u32;
        if col >= column_utf16 || col + ch_len > column_utf16 {
            return idx;
        }
        col = col.saturating_add(ch_len);
    }
    line.len()
}
