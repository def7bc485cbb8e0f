//! The scry language server.
//!
//! Transport (stdio JSON-RPC framing), URI handling, request dispatch and
//! the thin handler bodies live here; everything with real depth is in the
//! core crates (`scry-query`, `scry-pipeline`, `scry-completion`).

pub mod codec;
pub mod out;
pub mod provider;
pub mod rpc;
pub mod semantic;
pub mod server;
pub mod uri;

use serde_json::{json, Value};

/// Converts a core range to its LSP JSON shape.
pub fn to_lsp_range(range: scry_core::Range) -> Value {
    json!({
        "start": { "line": range.start.line, "character": range.start.column },
        "end": { "line": range.end.line, "character": range.end.column },
    })
}
