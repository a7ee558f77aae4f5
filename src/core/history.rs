//! Linear undo/redo history of applied batches.
//!
//! Entries after `current_index` are redoable and are discarded by the next
//! write. The manager only tracks which paths a batch touched; restoring
//! file content is the editor backend's job.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::plan::FileAction;
use crate::infra::io::write_atomic;

/// One file touched by a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub path: PathBuf,
    pub action: FileAction,
    /// Destination of a rename; `path` is the source
    #[serde(rename = "newPath", default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<PathBuf>,
}

impl Operation {
    pub fn new(path: impl Into<PathBuf>, action: FileAction) -> Self {
        Self { path: path.into(), action, new_path: None }
    }

    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self { path: from.into(), action: FileAction::Rename, new_path: Some(to.into()) }
    }

    /// Every path whose content this operation changed
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.path.as_path()).chain(self.new_path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Sorted by path
    pub operations: Vec<Operation>,
}

/// Persisted form: `{"history": [...], "currentIndex": n}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    #[serde(rename = "history", default)]
    pub entries: Vec<HistoryEntry>,
    #[serde(rename = "currentIndex", default = "no_index")]
    pub current_index: isize,
}

fn no_index() -> isize {
    -1
}

impl Default for HistoryState {
    fn default() -> Self {
        Self { entries: Vec::new(), current_index: -1 }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("nothing to revert")]
    NothingToRevert,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("failed to persist history: {0}")]
    Storage(String),
}

/// Where history state lives between runs
pub trait StateStore {
    /// Ok(None) when nothing has been stored yet
    fn load(&self) -> Result<Option<HistoryState>>;

    fn save(&self, state: &HistoryState) -> Result<()>;
}

/// JSON file in the working directory, written atomically under an advisory lock
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<fd_lock::RwLock<fs::File>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("open lock file: {}", self.lock_path.display()))?;
        Ok(fd_lock::RwLock::new(file))
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<HistoryState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let lock = self.lock_file()?;
        let _guard = lock.read().context("lock history for reading")?;

        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read history: {}", self.path.display()))?;
        let state = serde_json::from_str(&text)
            .with_context(|| format!("parse history: {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &HistoryState) -> Result<()> {
        let mut lock = self.lock_file()?;
        let _guard = lock.write().context("lock history for writing")?;

        let json = serde_json::to_string_pretty(state).context("serialize history")?;
        write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("write history: {}", self.path.display()))
    }
}

/// In-memory store; can be told to fail saves
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<HistoryState>>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { state: Mutex::new(None), fail_saves: true }
    }

    pub fn stored(&self) -> Option<HistoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<HistoryState>> {
        Ok(self.stored())
    }

    fn save(&self, state: &HistoryState) -> Result<()> {
        if self.fail_saves {
            anyhow::bail!("store is read-only");
        }
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = Some(state.clone());
        Ok(())
    }
}

/// Single owner of the history state
#[derive(Debug)]
pub struct HistoryManager<S: StateStore> {
    store: S,
    state: HistoryState,
}

impl<S: StateStore> HistoryManager<S> {
    /// Load from `store`; unreadable or malformed state starts empty
    pub fn open(store: S) -> Self {
        let mut state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => HistoryState::default(),
            Err(e) => {
                warn!("history unreadable, starting empty: {e:#}");
                HistoryState::default()
            }
        };

        let len = state.entries.len() as isize;
        if state.current_index < -1 || state.current_index >= len {
            let clamped = state.current_index.clamp(-1, len - 1);
            warn!(
                index = state.current_index,
                clamped, "history index out of range; clamped"
            );
            state.current_index = clamped;
        }

        Self { store, state }
    }

    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.state.entries
    }

    pub fn current_index(&self) -> isize {
        self.state.current_index
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist `next`; memory only changes when the store accepted it
    fn commit(&mut self, next: HistoryState) -> Result<(), HistoryError> {
        self.store
            .save(&next)
            .map_err(|e| HistoryError::Storage(format!("{e:#}")))?;
        self.state = next;
        Ok(())
    }

    /// Record a batch, discarding anything redoable
    pub fn write(&mut self, mut operations: Vec<Operation>) -> Result<(), HistoryError> {
        operations.sort_by(|a, b| a.path.cmp(&b.path));

        let mut next = self.state.clone();
        next.entries.truncate((next.current_index + 1) as usize);
        next.entries.push(HistoryEntry { timestamp: Utc::now(), operations });
        next.current_index = next.entries.len() as isize - 1;

        debug!(index = next.current_index, "history entry written");
        self.commit(next)
    }

    /// Operations `undo` would return, without moving the index
    pub fn peek_undo(&self) -> Option<&[Operation]> {
        usize::try_from(self.state.current_index)
            .ok()
            .and_then(|i| self.state.entries.get(i))
            .map(|e| e.operations.as_slice())
    }

    /// Operations `redo` would return, without moving the index
    pub fn peek_redo(&self) -> Option<&[Operation]> {
        self.state
            .entries
            .get((self.state.current_index + 1) as usize)
            .map(|e| e.operations.as_slice())
    }

    pub fn undo(&mut self) -> Result<Vec<Operation>, HistoryError> {
        let ops = self
            .peek_undo()
            .ok_or(HistoryError::NothingToRevert)?
            .to_vec();

        let mut next = self.state.clone();
        next.current_index -= 1;
        self.commit(next)?;
        Ok(ops)
    }

    pub fn redo(&mut self) -> Result<Vec<Operation>, HistoryError> {
        let ops = self
            .peek_redo()
            .ok_or(HistoryError::NothingToRedo)?
            .to_vec();

        let mut next = self.state.clone();
        next.current_index += 1;
        self.commit(next)?;
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn op(path: &str, action: FileAction) -> Operation {
        Operation::new(path, action)
    }

    #[test]
    fn test_write_sorts_operations() {
        let mut h = HistoryManager::open(MemoryStore::new());
        h.write(vec![op("/b", FileAction::Modify), op("/a", FileAction::Create)])
            .unwrap();
        let paths: Vec<_> = h.entries()[0].operations.iter().map(|o| o.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(h.current_index(), 0);
    }

    #[test]
    fn test_failed_save_keeps_memory_unchanged() {
        let mut h = HistoryManager::open(MemoryStore::failing());
        let err = h.write(vec![op("/a", FileAction::Create)]).unwrap_err();
        assert!(matches!(err, HistoryError::Storage(_)));
        assert!(h.entries().is_empty());
        assert_eq!(h.current_index(), -1);
    }

    #[test]
    fn test_out_of_range_index_clamped() {
        let store = MemoryStore::new();
        store
            .save(&HistoryState {
                entries: vec![HistoryEntry { timestamp: Utc::now(), operations: vec![] }],
                current_index: 7,
            })
            .unwrap();
        let h = HistoryManager::open(store);
        assert_eq!(h.current_index(), 0);
    }

    #[test]
    fn test_file_store_round_trip_and_format() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".itf_state.json");

        let mut h = HistoryManager::open(FileStore::new(&path));
        h.write(vec![op("/x/y.rs", FileAction::Modify), Operation::rename("/x/a.rs", "/x/b.rs")])
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["currentIndex"], 0);
        let ops = &raw["history"][0]["operations"];
        assert_eq!(ops[0]["action"], "rename");
        assert_eq!(ops[0]["newPath"], "/x/b.rs");
        assert_eq!(ops[1]["action"], "modify");
        // Only renames carry a destination
        assert!(ops[1].get("newPath").is_none());
        assert!(raw["history"][0]["timestamp"].is_string());

        let reopened = HistoryManager::open(FileStore::new(&path));
        assert_eq!(reopened.state(), h.state());
    }

    #[test]
    fn test_malformed_file_is_empty_history() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".itf_state.json");
        fs::write(&path, "{not json").unwrap();

        let h = HistoryManager::open(FileStore::new(&path));
        assert!(h.entries().is_empty());
        assert!(h.peek_undo().is_none());
    }
}
