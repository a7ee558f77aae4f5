//! Action planning for the block, diff and auto modes.
//!
//! A plan is computed entirely before the first mutation: final content per
//! absolute path, the deletions and renames to perform, the classification
//! of every target and the directories that must exist.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::correct::{Correction, DiffHunk, correct_hunks};
use crate::core::extract::{FileOp, PathFilter, content_blocks, diff_blocks, file_ops};
use crate::core::synth::{DiffApplier, SynthError, synthesize};
use crate::infra::io::read_lines;
use crate::infra::paths::PathResolver;

/// Which kinds of fenced content a run consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Block,
    Diff,
    Auto,
}

impl Mode {
    fn wants_blocks(self) -> bool {
        matches!(self, Mode::Block | Mode::Auto)
    }

    fn wants_diffs(self) -> bool {
        matches!(self, Mode::Diff | Mode::Auto)
    }
}

/// What happens to a target, judged before anything is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
    /// Both sides of a move
    Rename,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FileAction::Create => "create",
            FileAction::Modify => "modify",
            FileAction::Delete => "delete",
            FileAction::Rename => "rename",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Block,
    Diff,
}

/// Final content for one target
#[derive(Debug, Clone)]
pub struct PlannedFile {
    /// Path as written in the input
    pub display: String,
    pub lines: Vec<String>,
    pub origin: Origin,
}

/// A target that will not be changed, and why
#[derive(Debug, Clone, Serialize)]
pub struct PlanFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelete {
    pub path: PathBuf,
    pub display: String,
}

/// A move; new content planned for `to` replaces the moved bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub from: PathBuf,
    pub to: PathBuf,
    pub display: String,
}

#[derive(Debug, Default)]
pub struct Plan {
    /// Final content keyed by absolute path, in first-seen order
    pub files: IndexMap<PathBuf, PlannedFile>,
    pub deletes: Vec<PlannedDelete>,
    pub renames: Vec<PlannedRename>,
    /// Classification of every target seen in the input
    pub actions: BTreeMap<PathBuf, FileAction>,
    /// Missing parent directories of planned files and rename destinations
    pub dirs: BTreeSet<PathBuf>,
    /// Paths targeted by both a diff and a block; the block won
    pub conflicts: Vec<PathBuf>,
    pub failures: Vec<PlanFailure>,
    /// Hunks dropped because their context was not found
    pub dropped_hunks: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deletes.is_empty() && self.renames.is_empty()
    }

    /// Where the content of a rename destination comes from
    pub fn rename_source(&self, to: &Path) -> Option<&Path> {
        self.renames.iter().find(|r| r.to == to).map(|r| r.from.as_path())
    }

    fn is_rename_source(&self, path: &Path) -> bool {
        self.renames.iter().any(|r| r.from == path)
    }

    fn is_rename_dest(&self, path: &Path) -> bool {
        self.rename_source(path).is_some()
    }

    fn is_deleted(&self, path: &Path) -> bool {
        self.deletes.iter().any(|d| d.path == path)
    }

    pub fn action(&self, path: &Path) -> FileAction {
        self.actions.get(path).copied().unwrap_or(FileAction::Create)
    }
}

/// Diff hunks grouped per resolved target
#[derive(Debug, Clone)]
pub struct DiffTarget {
    pub display: String,
    pub hunks: Vec<DiffHunk>,
    /// File the hunks are matched against; the rename source for a rename destination
    pub source: PathBuf,
}

/// Group diff blocks by resolved path, merging repeats in document order
pub fn collect_diffs(
    text: &str,
    resolver: &PathResolver,
    filter: &PathFilter,
) -> IndexMap<PathBuf, DiffTarget> {
    let mut out: IndexMap<PathBuf, DiffTarget> = IndexMap::new();
    for block in diff_blocks(text, filter) {
        let abs = resolver.resolve(&block.path);
        out.entry(abs.clone())
            .or_insert_with(|| DiffTarget { display: block.path.clone(), hunks: Vec::new(), source: abs })
            .hunks
            .extend(block.hunks);
    }
    out
}

/// Correct every diff target against its current content
pub fn correct_all(diffs: &IndexMap<PathBuf, DiffTarget>) -> Vec<(PathBuf, Correction)> {
    diffs
        .par_iter()
        .map(|(abs, target)| {
            let source = read_lines(&target.source).ok().flatten().unwrap_or_default();
            (abs.clone(), correct_hunks(&target.display, &source, &target.hunks))
        })
        .collect()
}

pub struct Planner<'a> {
    resolver: &'a PathResolver,
    filter: &'a PathFilter,
    applier: Option<&'a dyn DiffApplier>,
}

impl<'a> Planner<'a> {
    pub fn new(resolver: &'a PathResolver, filter: &'a PathFilter) -> Self {
        Self { resolver, filter, applier: None }
    }

    /// Applier used for diff synthesis; required for diff and auto modes
    pub fn with_applier(mut self, applier: &'a dyn DiffApplier) -> Self {
        self.applier = Some(applier);
        self
    }

    #[instrument(level = "debug", skip(self, text))]
    pub fn plan(&self, mode: Mode, text: &str) -> anyhow::Result<Plan> {
        let mut plan = Plan::default();

        // 1) Content blocks; a later block for the same path replaces the earlier one
        if mode.wants_blocks() {
            for block in content_blocks(text, self.filter) {
                let abs = self.resolver.resolve(&block.path);
                if plan.files.contains_key(&abs) {
                    info!(path = %block.path, "duplicate block; later content wins");
                }
                plan.files.insert(
                    abs,
                    PlannedFile { display: block.path, lines: block.lines, origin: Origin::Block },
                );
            }
        }

        // 2) Diff targets, blocks win on overlap
        let mut diffs = if mode.wants_diffs() {
            collect_diffs(text, self.resolver, self.filter)
        } else {
            IndexMap::new()
        };
        diffs.retain(|abs, target| {
            if plan.files.contains_key(abs) {
                warn!(path = %target.display, "diff and code block target the same file; using the code block");
                plan.conflicts.push(abs.clone());
                false
            } else {
                true
            }
        });

        // 3) Deletions and renames, refused when they collide with other changes
        for op in file_ops(text, self.filter) {
            self.plan_op(&mut plan, &mut diffs, op);
        }

        // 4) Classify the union of targets before anything is materialized
        for abs in plan.files.keys().chain(diffs.keys()) {
            let action = if plan.is_rename_dest(abs) {
                FileAction::Rename
            } else if abs.exists() {
                FileAction::Modify
            } else {
                FileAction::Create
            };
            plan.actions.insert(abs.clone(), action);
        }
        for d in &plan.deletes {
            plan.actions.insert(d.path.clone(), FileAction::Delete);
        }
        for r in &plan.renames {
            plan.actions.insert(r.from.clone(), FileAction::Rename);
            plan.actions.insert(r.to.clone(), FileAction::Rename);
        }
        let written = plan.files.keys().chain(diffs.keys()).chain(plan.renames.iter().map(|r| &r.to));
        for abs in written {
            if let Some(parent) = abs.parent()
                && !parent.exists()
            {
                plan.dirs.insert(parent.to_path_buf());
            }
        }

        if diffs.is_empty() {
            return Ok(plan);
        }
        let applier = self
            .applier
            .ok_or_else(|| anyhow::anyhow!("no diff applier configured"))?;

        // 5) Correct and synthesize in parallel, collected in input order
        let corrections = correct_all(&diffs);
        let results: Vec<(PathBuf, usize, Result<Vec<String>, SynthError>)> = corrections
            .into_par_iter()
            .map(|(abs, c)| {
                let dropped = c.dropped.len();
                let source = diffs.get(&abs).map_or(abs.as_path(), |t| t.source.as_path());
                let merged = synthesize(applier, &c.patch, source);
                (abs, dropped, merged)
            })
            .collect();

        for (abs, dropped, merged) in results {
            plan.dropped_hunks += dropped;
            let shown = diffs
                .get(&abs)
                .map(|t| t.display.clone())
                .unwrap_or_else(|| abs.display().to_string());
            match merged {
                Ok(lines) => {
                    plan.files.insert(abs, PlannedFile { display: shown, lines, origin: Origin::Diff });
                }
                Err(e) => {
                    warn!(path = %shown, error = %e, "diff not applied");
                    plan.failures.push(PlanFailure { path: abs, reason: e.to_string() });
                }
            }
        }

        // Only directories some surviving file or rename needs
        let Plan { files, renames, dirs, .. } = &mut plan;
        dirs.retain(|d| {
            files.keys().chain(renames.iter().map(|r| &r.to)).any(|p| p.starts_with(d))
        });

        Ok(plan)
    }

    /// Validate one deletion or rename against everything planned so far
    fn plan_op(&self, plan: &mut Plan, diffs: &mut IndexMap<PathBuf, DiffTarget>, op: FileOp) {
        let has_content = |plan: &Plan, p: &Path| plan.files.contains_key(p) || diffs.contains_key(p);

        match op {
            FileOp::Delete { path } => {
                let abs = self.resolver.resolve(&path);
                if plan.is_deleted(&abs) {
                    debug!(%path, "duplicate delete ignored");
                    return;
                }
                let refusal = if !abs.exists() {
                    Some("cannot delete: file does not exist")
                } else if has_content(plan, &abs) || plan.is_rename_dest(&abs) {
                    Some("cannot delete: the same input also writes this file")
                } else if plan.is_rename_source(&abs) {
                    Some("cannot delete: the same input also renames this file")
                } else {
                    None
                };
                match refusal {
                    Some(reason) => {
                        warn!(%path, reason, "delete skipped");
                        plan.failures.push(PlanFailure { path: abs, reason: reason.to_string() });
                    }
                    None => plan.deletes.push(PlannedDelete { path: abs, display: path }),
                }
            }
            FileOp::Rename { from, to } => {
                let (src, dst) = (self.resolver.resolve(&from), self.resolver.resolve(&to));
                if src == dst {
                    debug!(%from, "rename onto itself ignored");
                    return;
                }
                let refusal = if !src.exists() {
                    Some("cannot rename: source does not exist")
                } else if dst.exists() {
                    Some("cannot rename: destination already exists")
                } else if has_content(plan, &src) || plan.is_deleted(&src) || plan.is_rename_source(&src) {
                    Some("cannot rename: the same input also changes the source")
                } else if plan.is_rename_dest(&dst) {
                    Some("cannot rename: another rename targets the same destination")
                } else {
                    None
                };
                if let Some(reason) = refusal {
                    warn!(%from, %to, reason, "rename skipped");
                    plan.failures.push(PlanFailure { path: src, reason: reason.to_string() });
                    return;
                }
                // Diffs for the new name are matched against the old file
                if let Some(target) = diffs.get_mut(&dst) {
                    target.source = src.clone();
                }
                plan.renames.push(PlannedRename { from: src, to: dst, display: format!("{from} -> {to}") });
            }
        }
    }
}
