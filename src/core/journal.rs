//! Per-file change journal standing in for an editor's undo tree.
//!
//! Layout under the journal directory:
//! - `files/<key>.json`: the change list and cursor for one target path
//! - `blobs/<blake3>`: content-addressed file bodies
//!
//! Every save records exactly one change `{before, after}`, so one history
//! operation is one journal step. Undo writes `before`, redo writes `after`.
//! An absent side means the file did not exist, which is how deletions and
//! the two halves of a rename are stored.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::plan::FileAction;
use crate::infra::io::{LineEnding, render_lines, write_atomic};

/// Text-editing capability the apply/undo commands drive
pub trait EditorBackend {
    /// Stage `lines` as the new content of `path`
    fn open_or_replace(&mut self, path: &Path, lines: &[String]) -> Result<()>;

    /// Stage the removal of `path`
    fn remove(&mut self, path: &Path) -> Result<()>;

    /// Stage a move; content already staged for `to` wins over the moved bytes
    fn rename(&mut self, from: &Path, to: &Path) -> Result<()>;

    /// Write every staged file
    fn save_all(&mut self) -> SaveReport;

    /// Take back the latest save of `path`, restoring what it replaced
    fn discard_last_save(&mut self, path: &Path) -> Result<()>;

    /// Step `path` one change back; a created file left empty is deleted
    fn undo_one_step(&mut self, path: &Path, action: FileAction) -> Result<()>;

    /// Step `path` one change forward
    fn redo_one_step(&mut self, path: &Path, action: FileAction) -> Result<()>;

    /// Would a step in `direction` succeed without clobbering outside edits?
    fn check_step(&self, _path: &Path, _direction: Step) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Back,
    Forward,
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(thiserror::Error, Debug)]
pub enum JournalError {
    #[error("{0} has no recorded changes")]
    NoJournal(PathBuf),

    #[error("{0} is already at its oldest recorded state")]
    AtOldest(PathBuf),

    #[error("{0} is already at its newest recorded state")]
    AtNewest(PathBuf),

    #[error("{0} was modified outside itf since the last change (use --force to overwrite)")]
    Drifted(PathBuf),

    #[error("snapshot blob {0} is missing")]
    MissingBlob(String),
}

/// One recorded write; `None` = file absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Change {
    before: Option<String>,
    after: Option<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileJournal {
    path: PathBuf,
    /// Number of changes currently applied
    cursor: usize,
    changes: Vec<Change>,
}

impl FileJournal {
    fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), cursor: 0, changes: Vec::new() }
    }

    fn record(&mut self, before: Option<String>, after: Option<String>) {
        self.changes.truncate(self.cursor);
        self.changes.push(Change { before, after, timestamp: Utc::now() });
        self.cursor = self.changes.len();
    }

    /// Contents itf itself left on disk at the cursor: the result of the
    /// change behind it, or the state the change ahead of it was made from
    fn known_at_cursor(&self) -> impl Iterator<Item = &Option<String>> {
        let behind = self.cursor.checked_sub(1).and_then(|i| self.changes.get(i));
        let ahead = self.changes.get(self.cursor);
        behind.map(|c| &c.after).into_iter().chain(ahead.map(|c| &c.before))
    }

    fn cap(&mut self, max: usize) {
        let max = max.max(1);
        if self.changes.len() > max {
            let excess = self.changes.len() - max;
            self.changes.drain(..excess);
            self.cursor = self.cursor.saturating_sub(excess);
        }
    }
}

/// Journal-backed editor writing straight to disk
#[derive(Debug)]
pub struct JournalEditor {
    root: PathBuf,
    max_changes: usize,
    force: bool,
    /// Staged content per path; `None` stages a removal
    pending: IndexMap<PathBuf, Option<Vec<u8>>>,
}

impl JournalEditor {
    pub fn new(root: impl Into<PathBuf>, max_changes: usize) -> Self {
        Self {
            root: root.into(),
            max_changes,
            force: false,
            pending: IndexMap::new(),
        }
    }

    /// Step even when disk content no longer matches the journal
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn journal_file(&self, path: &Path) -> PathBuf {
        let key = blake3::hash(path.to_string_lossy().as_bytes()).to_hex();
        self.root.join("files").join(format!("{}.json", &key[..32]))
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join("blobs").join(hash)
    }

    fn load(&self, path: &Path) -> Result<Option<FileJournal>> {
        let jf = self.journal_file(path);
        match fs::read_to_string(&jf) {
            Ok(text) => {
                let j = serde_json::from_str(&text)
                    .with_context(|| format!("parse journal: {}", jf.display()))?;
                Ok(Some(j))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("read journal: {}", jf.display()))),
        }
    }

    fn store(&self, journal: &FileJournal) -> Result<()> {
        let jf = self.journal_file(&journal.path);
        if let Some(dir) = jf.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create journal dir: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(journal).context("serialize journal")?;
        write_atomic(&jf, json.as_bytes())
    }

    /// Store `bytes` as a blob, returning its hash
    fn put_blob(&self, bytes: &[u8]) -> Result<String> {
        let hash = blake3::hash(bytes).to_hex().to_string();
        let path = self.blob_path(&hash);
        if !path.exists() {
            let dir = self.root.join("blobs");
            fs::create_dir_all(&dir)
                .with_context(|| format!("create blob dir: {}", dir.display()))?;
            write_atomic(&path, bytes)?;
        }
        Ok(hash)
    }

    fn get_blob(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Err(JournalError::MissingBlob(hash.to_string()).into());
        }
        fs::read(&path).with_context(|| format!("read blob: {}", path.display()))
    }

    /// Hash of what is on disk now, without storing it
    fn disk_hash(path: &Path) -> Result<Option<String>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(blake3::hash(&bytes).to_hex().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("read {}", path.display()))),
        }
    }

    /// Hash of what is on disk now, storing it as a blob
    fn capture_disk(&self, path: &Path) -> Result<Option<String>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(self.put_blob(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("read {}", path.display()))),
        }
    }

    /// Put the blob `state` on disk at `path`; `None` removes the file
    fn restore(&self, path: &Path, state: Option<&str>) -> Result<()> {
        match state {
            Some(hash) => {
                let bytes = self.get_blob(hash)?;
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("create directory: {}", dir.display()))?;
                }
                write_atomic(path, &bytes).with_context(|| format!("write {}", path.display()))
            }
            None => remove_if_present(path),
        }
    }

    fn save_one(&self, path: &Path, content: Option<&[u8]>) -> Result<()> {
        let mut journal = self.load(path)?.unwrap_or_else(|| FileJournal::new(path));

        // Whatever is on disk now, outside edits included, is this change's before
        let before = self.capture_disk(path)?;
        if journal.cursor > 0 && !journal.known_at_cursor().any(|h| *h == before) {
            debug!(path = %path.display(), "disk differs from journal; outside edit becomes the before state");
        }

        let after = match content {
            Some(bytes) => {
                let hash = self.put_blob(bytes)?;
                write_atomic(path, bytes).with_context(|| format!("write {}", path.display()))?;
                Some(hash)
            }
            None => {
                remove_if_present(path)?;
                None
            }
        };

        journal.record(before.clone(), after);
        journal.cap(self.max_changes);
        if let Err(e) = self.store(&journal) {
            // Unrecorded writes cannot be undone; put the old state back
            if let Err(undo) = self.restore(path, before.as_deref()) {
                warn!(path = %path.display(), "could not restore after journal failure: {undo:#}");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Journal for `path` with the index of the change a step crosses
    fn plan_step(&self, path: &Path, direction: Step) -> Result<(FileJournal, usize)> {
        let journal = self
            .load(path)?
            .ok_or_else(|| JournalError::NoJournal(path.to_path_buf()))?;

        let index = match direction {
            Step::Back => journal
                .cursor
                .checked_sub(1)
                .ok_or_else(|| JournalError::AtOldest(path.to_path_buf()))?,
            Step::Forward => {
                if journal.cursor >= journal.changes.len() {
                    return Err(JournalError::AtNewest(path.to_path_buf()).into());
                }
                journal.cursor
            }
        };

        if !self.force {
            let disk = Self::disk_hash(path)?;
            if !journal.known_at_cursor().any(|h| *h == disk) {
                return Err(JournalError::Drifted(path.to_path_buf()).into());
            }
        }
        Ok((journal, index))
    }

    /// Cross one change in `direction` and persist the cursor
    fn step(&self, path: &Path, direction: Step, action: FileAction) -> Result<()> {
        let (mut journal, index) = self.plan_step(path, direction)?;
        let change = journal.changes[index].clone();

        match direction {
            Step::Back => {
                // Undoing a creation that leaves nothing behind removes the file
                let empty = match &change.before {
                    Some(hash) => self.get_blob(hash)?.is_empty(),
                    None => true,
                };
                if empty && action == FileAction::Create {
                    remove_if_present(path)?;
                } else {
                    self.restore(path, change.before.as_deref())?;
                }
                journal.cursor = index;
            }
            Step::Forward => {
                self.restore(path, change.after.as_deref())?;
                journal.cursor = index + 1;
            }
        }
        self.store(&journal)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("delete {}", path.display()))),
    }
}

impl EditorBackend for JournalEditor {
    fn open_or_replace(&mut self, path: &Path, lines: &[String]) -> Result<()> {
        let ending = match self.pending.get(path) {
            Some(Some(staged)) => LineEnding::detect(&String::from_utf8_lossy(staged)),
            _ => match fs::read_to_string(path) {
                Ok(existing) => LineEnding::detect(&existing),
                Err(_) => LineEnding::default(),
            },
        };
        self.pending
            .insert(path.to_path_buf(), Some(render_lines(lines, ending).into_bytes()));
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            anyhow::bail!("{} does not exist", path.display());
        }
        self.pending.insert(path.to_path_buf(), None);
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        let bytes = fs::read(from).with_context(|| format!("read {}", from.display()))?;
        self.pending.entry(to.to_path_buf()).or_insert(Some(bytes));
        self.pending.insert(from.to_path_buf(), None);
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(files = self.pending.len()))]
    fn save_all(&mut self) -> SaveReport {
        let mut report = SaveReport::default();
        for (path, content) in std::mem::take(&mut self.pending) {
            match self.save_one(&path, content.as_deref()) {
                Ok(()) => report.saved.push(path),
                Err(e) => report.failed.push((path, format!("{e:#}"))),
            }
        }
        report
    }

    fn discard_last_save(&mut self, path: &Path) -> Result<()> {
        let mut journal = self
            .load(path)?
            .ok_or_else(|| JournalError::NoJournal(path.to_path_buf()))?;
        let index = journal
            .cursor
            .checked_sub(1)
            .ok_or_else(|| JournalError::AtOldest(path.to_path_buf()))?;

        let before = journal.changes[index].before.clone();
        self.restore(path, before.as_deref())?;
        journal.changes.truncate(index);
        journal.cursor = index;
        self.store(&journal)
    }

    fn undo_one_step(&mut self, path: &Path, action: FileAction) -> Result<()> {
        self.step(path, Step::Back, action)
    }

    fn redo_one_step(&mut self, path: &Path, action: FileAction) -> Result<()> {
        self.step(path, Step::Forward, action)
    }

    fn check_step(&self, path: &Path, direction: Step) -> Result<()> {
        self.plan_step(path, direction).map(|_| ())
    }
}
