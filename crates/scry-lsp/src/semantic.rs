//! Building `$scry/publishSemanticHighlighting` payloads.

use std::collections::HashMap;

use serde_json::{json, Value};

use scry_config::GroupMatch;
use scry_core::{AbsPath, AnyId, SymbolKind};
use scry_query::{QueryDatabase, SemanticHighlightCache};

use crate::to_lsp_range;

/// Collects every highlightable symbol occurrence in `path`, grouped by
/// entity, with ids that stay stable across publishes.
pub fn build_highlight_payload(
    db: &QueryDatabase,
    cache: &mut SemanticHighlightCache,
    group_match: &GroupMatch,
    uri: &str,
    path: &AbsPath,
) -> Option<Value> {
    if !group_match.matches(path.as_str()) {
        return None;
    }
    let def = db.file_for_path(path)?.def.as_ref()?;

    let mut grouped: HashMap<(SymbolKind, AnyId), Vec<Value>> = HashMap::new();
    for sym in &def.all_symbols {
        let highlightable = match sym.kind {
            SymbolKind::Type | SymbolKind::Func => true,
            // Locals churn on every edit; their colors would flicker.
            SymbolKind::Var => db.vars[sym.id.index()]
                .any_def()
                .is_some_and(|d| !d.is_local()),
            SymbolKind::File | SymbolKind::Invalid => false,
        };
        if highlightable {
            grouped
                .entry((sym.kind, sym.id))
                .or_default()
                .push(to_lsp_range(sym.range));
        }
    }

    let mut symbols = Vec::new();
    for ((kind, id), ranges) in grouped {
        let detailed_name = match kind {
            SymbolKind::Type => db.types[id.index()]
                .any_def()
                .map(|d| d.detailed_name.clone()),
            SymbolKind::Func => db.funcs[id.index()]
                .any_def()
                .map(|d| d.detailed_name.clone()),
            SymbolKind::Var => db.vars[id.index()]
                .any_def()
                .map(|d| d.detailed_name.clone()),
            SymbolKind::File | SymbolKind::Invalid => None,
        };
        let Some(detailed_name) = detailed_name else {
            continue;
        };
        let stable_id = cache.stable_id(path, kind, &detailed_name);
        symbols.push(json!({
            "stableId": stable_id,
            "kind": kind_name(kind),
            "ranges": ranges,
        }));
    }

    Some(json!({ "uri": uri, "symbols": symbols }))
}

fn kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Type => "type",
        SymbolKind::Func => "function",
        SymbolKind::Var => "variable",
        SymbolKind::File | SymbolKind::Invalid => "",
    }
}
