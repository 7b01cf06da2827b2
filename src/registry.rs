//! State shared by every session in the process
//!
//! Sessions can run one after another or inside each other (a session
//! started from code evaluated by another session). They share:
//!
//! - the active-session count, maintained by the [`ActiveSession`] guard
//! - the running line number of the virtual eval file and its lines
//! - the lines typed so far, and the file they are persisted to
//!
//! Typed lines are written out only when the last active session ends.

use crate::error::ReplError;
use std::cell::{Cell, RefCell};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Virtual file name REPL input is evaluated under
pub const DEFAULT_EVAL_PATH: &str = "(ripl)";

/// Where typed lines are loaded from and saved to
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    should_load: bool,
    should_save: bool,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HistoryStore {
            path: path.into(),
            should_load: true,
            should_save: true,
        }
    }

    pub fn with_load(mut self, should_load: bool) -> Self {
        self.should_load = should_load;
        self
    }

    pub fn with_save(mut self, should_save: bool) -> Self {
        self.should_save = should_save;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn should_save(&self) -> bool {
        self.should_save
    }

    /// Read saved lines. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<String>, ReplError> {
        if !self.should_load {
            return Ok(Vec::new());
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(String::from).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append `lines` to the history file, creating it and its directory
    pub fn append(&self, lines: &[String]) -> Result<(), ReplError> {
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    eval_path: String,
    active: Cell<usize>,
    current_line: Cell<usize>,
    typed: RefCell<Vec<String>>,
    /// How many of `typed` are already in the history file
    saved: Cell<usize>,
    store: Option<HistoryStore>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            eval_path: DEFAULT_EVAL_PATH.to_string(),
            active: Cell::new(0),
            current_line: Cell::new(1),
            typed: RefCell::new(Vec::new()),
            saved: Cell::new(0),
            store: None,
        }
    }

    pub fn with_eval_path(mut self, path: impl Into<String>) -> Self {
        self.eval_path = path.into();
        self
    }

    pub fn with_history_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn eval_path(&self) -> &str {
        &self.eval_path
    }

    pub fn history_store(&self) -> Option<&HistoryStore> {
        self.store.as_ref()
    }

    /// Number of sessions currently between prologue and epilogue
    pub fn active_sessions(&self) -> usize {
        self.active.get()
    }

    /// Mark a session as active until the returned guard is dropped
    pub fn enter(&self) -> ActiveSession<'_> {
        self.active.set(self.active.get() + 1);
        debug!(active = self.active.get(), "session entered");
        ActiveSession { registry: self }
    }

    fn leave(&self) {
        let remaining = self.active.get().saturating_sub(1);
        self.active.set(remaining);
        debug!(active = remaining, "session left");
        if remaining == 0 {
            if let Err(e) = self.save_history() {
                warn!("Failed to save history: {}", e);
            }
        }
    }

    /// Line number the next evaluated unit starts at
    pub fn current_line(&self) -> usize {
        self.current_line.get()
    }

    /// Move the line counter past an evaluated unit
    pub fn advance(&self, source: &str) {
        self.current_line.set(self.current_line.get() + source.lines().count());
    }

    /// Remember a line the user typed
    pub fn record_typed(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        self.typed.borrow_mut().push(line.to_string());
    }

    /// Load the history file, returning its lines. Loaded lines count as
    /// already saved.
    pub fn load_history(&self) -> Result<Vec<String>, ReplError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        store.load()
    }

    /// Append lines typed since the last save to the history file
    pub fn save_history(&self) -> Result<(), ReplError> {
        let Some(store) = self.store.as_ref().filter(|s| s.should_save()) else {
            return Ok(());
        };
        let typed = self.typed.borrow();
        let pending = &typed[self.saved.get().min(typed.len())..];
        store.append(pending)?;
        debug!(lines = pending.len(), path = %store.path().display(), "history saved");
        self.saved.set(typed.len());
        Ok(())
    }
}

/// Keeps a session counted as active; leaving happens on drop, whichever
/// way the session ends
#[derive(Debug)]
pub struct ActiveSession<'a> {
    registry: &'a SessionRegistry,
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.registry.leave();
    }
}
