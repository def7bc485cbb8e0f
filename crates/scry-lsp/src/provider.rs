//! Stub parser integrations for the shipped binary.
//!
//! The real clang driver links in out of tree and implements the same two
//! traits. These stand-ins keep the whole pipeline, cache and protocol
//! stack exercisable end to end: indexing replays whatever the disk cache
//! already holds, and completion parses to an empty translation unit.

use std::sync::Arc;

use scry_cache::IndexCache;
use scry_completion::{
    CompletionError, TranslationUnit, TranslationUnitHost,
};
use scry_core::{AbsPath, Position};
use scry_index::IndexFile;
use scry_pipeline::{file_modification_time, IndexProvider};

/// Serves index facts from the on-disk cache; files without a cache entry
/// index as empty.
pub struct CacheReplayProvider {
    cache: Arc<IndexCache>,
    init: std::sync::Once,
}

impl CacheReplayProvider {
    pub fn new(cache: Arc<IndexCache>) -> CacheReplayProvider {
        CacheReplayProvider {
            cache,
            init: std::sync::Once::new(),
        }
    }
}

impl IndexProvider for CacheReplayProvider {
    fn index(
        &self,
        path: &AbsPath,
        _args: &[String],
        contents: Option<&str>,
    ) -> scry_pipeline::Result<Vec<IndexFile>> {
        // The real driver registers parser targets here; that global setup
        // must happen once per process, under the shared lock.
        self.init.call_once(|| {
            let _guard = scry_pipeline::parser_init_guard();
        });

        if contents == Some("") {
            return Ok(vec![IndexFile::new(path.clone())]);
        }
        let mut index = self
            .cache
            .load(path)
            .unwrap_or_else(|| IndexFile::new(path.clone()));
        if let Some(mtime) = file_modification_time(path) {
            index.last_modification_time = mtime;
        }
        Ok(vec![index])
    }
}

struct EmptyTranslationUnit;

impl TranslationUnit for EmptyTranslationUnit {
    fn reparse(&mut self) -> scry_completion::Result<()> {
        Ok(())
    }

    fn complete(
        &mut self,
        _position: Position,
    ) -> scry_completion::Result<Vec<lsp_types::CompletionItem>> {
        Ok(Vec::new())
    }

    fn diagnostics(&mut self) -> scry_completion::Result<Vec<lsp_types::Diagnostic>> {
        Ok(Vec::new())
    }
}

/// Host whose translation units complete to nothing.
pub struct EmptyTranslationUnitHost;

impl TranslationUnitHost for EmptyTranslationUnitHost {
    fn parse(&self, path: &AbsPath) -> scry_completion::Result<Box<dyn TranslationUnit>> {
        if path.as_str().is_empty() {
            return Err(CompletionError::Parse("empty path".to_string()));
        }
        Ok(Box::new(EmptyTranslationUnit))
    }
}
