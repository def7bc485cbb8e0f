//! Server configuration.
//!
//! Loaded from `initialize`'s `initializationOptions` and replaced wholesale
//! on `workspace/didChangeConfiguration`. Unknown fields are ignored so old
//! clients keep working.

mod group_match;

pub use group_match::GroupMatch;

use serde::{Deserialize, Serialize};

use scry_cache::CacheFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScryConfig {
    /// Project root; defaults to the `rootUri` sent by the client.
    pub project_root: Option<String>,

    /// Directory index caches are written to.
    pub cache_directory: String,
    /// Serialization format of index caches.
    pub cache_format: CacheFormat,

    /// Number of indexer worker threads. Zero means one per CPU.
    pub index_thread_count: usize,

    /// Reindex on every `didChange` instead of only on save.
    pub enable_index_on_did_change: bool,

    pub show_document_links_on_includes: bool,
    pub emit_inactive_regions: bool,

    pub diagnostics: DiagnosticsConfig,
    pub highlight: HighlightConfig,
    pub completion: CompletionConfig,
    pub xref: XrefConfig,
    pub workspace_symbol: WorkspaceSymbolConfig,
}

impl Default for ScryConfig {
    fn default() -> ScryConfig {
        ScryConfig {
            project_root: None,
            cache_directory: ".scry-cache".to_string(),
            cache_format: CacheFormat::default(),
            index_thread_count: 0,
            enable_index_on_did_change: false,
            show_document_links_on_includes: true,
            emit_inactive_regions: true,
            diagnostics: DiagnosticsConfig::default(),
            highlight: HighlightConfig::default(),
            completion: CompletionConfig::default(),
            xref: XrefConfig::default(),
            workspace_symbol: WorkspaceSymbolConfig::default(),
        }
    }
}

impl ScryConfig {
    /// Parses `initializationOptions`; `None`/`null` yields the defaults.
    pub fn from_initialization_options(options: Option<serde_json::Value>) -> ScryConfig {
        match options {
            None | Some(serde_json::Value::Null) => ScryConfig::default(),
            Some(value) => match serde_json::from_value(value) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(
                        target: "scry.config",
                        error = %err,
                        "malformed initializationOptions; using defaults"
                    );
                    ScryConfig::default()
                }
            },
        }
    }

    pub fn effective_index_threads(&self) -> usize {
        if self.index_thread_count > 0 {
            return self.index_thread_count;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// Regexes of paths diagnostics are reported for. Empty means all.
    pub whitelist: Vec<String>,
    /// Regexes of paths diagnostics are suppressed for.
    pub blacklist: Vec<String>,
    /// Minimum interval between publishes per path. Clearing diagnostics is
    /// never throttled.
    pub frequency_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> DiagnosticsConfig {
        DiagnosticsConfig {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            frequency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightConfig {
    pub enabled: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for HighlightConfig {
    fn default() -> HighlightConfig {
        HighlightConfig {
            enabled: false,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Fuzzy-filter and rank completion results server-side.
    pub filter_and_sort: bool,
}

impl Default for CompletionConfig {
    fn default() -> CompletionConfig {
        CompletionConfig {
            filter_and_sort: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XrefConfig {
    /// Maximum results for references/derived/callers queries.
    pub max_num: usize,
}

impl Default for XrefConfig {
    fn default() -> XrefConfig {
        XrefConfig { max_num: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceSymbolConfig {
    pub max_num: usize,
    /// Rank results with the fuzzy matcher; otherwise return in discovery
    /// order.
    pub sort: bool,
}

impl Default for WorkspaceSymbolConfig {
    fn default() -> WorkspaceSymbolConfig {
        WorkspaceSymbolConfig {
            max_num: 1000,
            sort: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_from_null_options() {
        let config = ScryConfig::from_initialization_options(None);
        assert_eq!(config.cache_directory, ".scry-cache");
        assert!(config.completion.filter_and_sort);
        assert_eq!(config.workspace_symbol.max_num, 1000);
    }

    #[test]
    fn camel_case_fields_parse() {
        let config = ScryConfig::from_initialization_options(Some(json!({
            "cacheDirectory": "/tmp/scry",
            "cacheFormat": "messagepack",
            "enableIndexOnDidChange": true,
            "diagnostics": { "frequencyMs": 250, "blacklist": ["third_party/.*"] },
            "workspaceSymbol": { "maxNum": 50, "sort": false },
        })));
        assert_eq!(config.cache_directory, "/tmp/scry");
        assert_eq!(config.cache_format, CacheFormat::MessagePack);
        assert!(config.enable_index_on_did_change);
        assert_eq!(config.diagnostics.frequency_ms, 250);
        assert_eq!(config.diagnostics.blacklist, vec!["third_party/.*"]);
        assert_eq!(config.workspace_symbol.max_num, 50);
        assert!(!config.workspace_symbol.sort);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = ScryConfig::from_initialization_options(Some(json!({
            "someFutureOption": 42,
        })));
        assert_eq!(config.xref.max_num, 2000);
    }
}
