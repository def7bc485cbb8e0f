//! One completion session per file: two independently-locked translation
//! units.

use std::sync::Mutex;
use std::time::Instant;

use scry_core::{AbsPath, Position};
use scry_sync::AtomicObject;

use crate::{CompletionError, CompletionRequest, Result, TranslationUnit, TranslationUnitHost};

/// A translation unit slot with its own exclusive lock and parse timestamp.
///
/// Completion and diagnostics each get a slot so a long diagnostics reparse
/// never blocks an interactive completion. The two slots of a session are
/// never locked simultaneously.
pub struct TuSlot {
    state: Mutex<TuState>,
}

struct TuState {
    tu: Option<Box<dyn TranslationUnit>>,
    last_parsed_at: Option<Instant>,
}

impl TuSlot {
    fn new() -> TuSlot {
        TuSlot {
            state: Mutex::new(TuState {
                tu: None,
                last_parsed_at: None,
            }),
        }
    }

    /// Runs `f` with a parsed translation unit, creating or reusing one.
    /// The slot lock is held across the whole call; this is the long
    /// critical section of the session.
    pub fn with_tu<R>(
        &self,
        host: &dyn TranslationUnitHost,
        path: &AbsPath,
        f: impl FnOnce(&mut dyn TranslationUnit) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.tu.is_none() {
            state.tu = Some(host.parse(path)?);
            state.last_parsed_at = Some(Instant::now());
        }
        let tu = state.tu.as_mut().ok_or(CompletionError::NoTranslationUnit)?;
        f(tu.as_mut())
    }

    /// Reparses against the current buffer state (or parses fresh).
    pub fn reparse(&self, host: &dyn TranslationUnitHost, path: &AbsPath) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.tu.as_mut() {
            Some(tu) => tu.reparse()?,
            None => state.tu = Some(host.parse(path)?),
        }
        state.last_parsed_at = Some(Instant::now());
        Ok(())
    }

    pub fn last_parsed_at(&self) -> Option<Instant> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_parsed_at
    }
}

/// Session for one file. Shared (`Arc`) between the LRU caches and any
/// worker currently using it, so LRU eviction mid-completion just defers
/// disposal to the last holder.
pub struct CompletionSession {
    pub path: AbsPath,
    pub completion: TuSlot,
    pub diagnostics: TuSlot,
    /// This session's one waiting completion request. A newer request for
    /// the *same file* replaces an undispatched older one; requests for
    /// other files live in their own sessions and are unaffected.
    pub(crate) pending_completion: AtomicObject<CompletionRequest>,
}

impl CompletionSession {
    pub fn new(path: AbsPath) -> CompletionSession {
        CompletionSession {
            path,
            completion: TuSlot::new(),
            diagnostics: TuSlot::new(),
            pending_completion: AtomicObject::new(),
        }
    }

    pub fn complete_at(
        &self,
        host: &dyn TranslationUnitHost,
        position: Position,
    ) -> Result<Vec<lsp_types::CompletionItem>> {
        self.completion
            .with_tu(host, &self.path, |tu| tu.complete(position))
    }

    pub fn diagnostics(
        &self,
        host: &dyn TranslationUnitHost,
    ) -> Result<Vec<lsp_types::Diagnostic>> {
        self.diagnostics
            .with_tu(host, &self.path, |tu| tu.diagnostics())
    }
}
