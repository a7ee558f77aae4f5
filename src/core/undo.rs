//! `undo`, `redo` and `history` command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, HistoryArgs, HistoryStepArgs};
use crate::core::error::RunError;
use crate::core::history::{FileStore, HistoryError, HistoryManager, Operation, StateStore};
use crate::core::journal::{EditorBackend, JournalEditor, Step};
use crate::infra::config::Config;
use crate::infra::ui::{self, Printer};

use super::apply::Confirm;

pub fn undo_run(args: HistoryStepArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let mut prompt = |q: &str| ui::confirm(q);
    step_in(&root, Step::Back, &args, cfg, ctx, &mut prompt)
}

pub fn redo_run(args: HistoryStepArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let mut prompt = |q: &str| ui::confirm(q);
    step_in(&root, Step::Forward, &args, cfg, ctx, &mut prompt)
}

/// Move history one batch in `direction` and restore the files it names
#[instrument(level = "debug", skip_all, fields(direction = ?direction))]
pub fn step_in(
    root: &Path,
    direction: Step,
    args: &HistoryStepArgs,
    cfg: &Config,
    ctx: &AppContext,
    confirm: Confirm<'_>,
) -> Result<()> {
    let printer = Printer::new(ctx);
    let mut history = HistoryManager::open(FileStore::new(cfg.state_path(root)));
    let mut editor = JournalEditor::new(cfg.journal_path(root), cfg.journal.max_snapshots)
        .with_force(args.force);

    // 1) What would move
    let (verb, pending) = match direction {
        Step::Back => ("Revert", history.peek_undo().ok_or(HistoryError::NothingToRevert)?),
        Step::Forward => ("Re-apply", history.peek_redo().ok_or(HistoryError::NothingToRedo)?),
    };
    let pending: Vec<Operation> = pending.to_vec();

    // 2) Refuse before touching anything if a file moved on
    let blocked: Vec<String> = pending
        .iter()
        .flat_map(|op| op.paths())
        .filter_map(|p| editor.check_step(p, direction).err())
        .map(|e| format!("{e:#}"))
        .collect();
    if !blocked.is_empty() {
        for b in &blocked {
            printer.error(b);
        }
        return Err(RunError::Conflict(format!(
            "{} file(s) cannot be restored; nothing was changed",
            blocked.len()
        ))
        .into());
    }

    if ctx.dry_run {
        for op in &pending {
            printer.info(format!("DRY RUN: would {} {} {}", verb.to_lowercase(), op.action, describe(op)));
        }
        return Ok(());
    }

    // 3) Confirm
    if !args.yes {
        printer.info(format!("{verb} the following {} file(s):", pending.len()));
        for op in &pending {
            printer.detail(format!("{:<6} {}", op.action, describe(op)));
        }
        if !confirm(&format!("{verb}?")).context("Failed to read confirmation")? {
            printer.info("Aborted; nothing was changed.");
            return Ok(());
        }
    }

    // 4) Commit the index, then step every file
    let ops = match direction {
        Step::Back => history.undo()?,
        Step::Forward => history.redo()?,
    };

    let mut failed = 0usize;
    for op in &ops {
        // Both sides of a rename move together
        let errors: Vec<String> = op
            .paths()
            .filter_map(|p| {
                let res = match direction {
                    Step::Back => editor.undo_one_step(p, op.action),
                    Step::Forward => editor.redo_one_step(p, op.action),
                };
                res.err().map(|e| format!("{}: {e:#}", p.display()))
            })
            .collect();
        if errors.is_empty() {
            printer.success(format!("{:<6} {}", op.action, describe(op)));
        } else {
            failed += 1;
            for e in &errors {
                printer.error(e);
            }
        }
    }

    if failed > 0 {
        return Err(RunError::Partial(format!(
            "{} of {} file(s) could not be restored",
            failed,
            ops.len()
        ))
        .into());
    }
    Ok(())
}

fn describe(op: &Operation) -> String {
    match &op.new_path {
        Some(to) => format!("{} -> {}", op.path.display(), to.display()),
        None => op.path.display().to_string(),
    }
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Changes")]
    changes: String,
}

#[derive(Serialize)]
struct HistoryJson<'a> {
    #[serde(rename = "currentIndex")]
    current_index: isize,
    history: &'a [crate::core::history::HistoryEntry],
}

pub fn history_run(args: HistoryArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let history = HistoryManager::open(FileStore::new(cfg.state_path(&root)));
    print!("{}", render_history(&history, args.json, ctx)?);
    Ok(())
}

/// Text table (or JSON) of every recorded batch
pub fn render_history<S: StateStore>(
    history: &HistoryManager<S>,
    json: bool,
    ctx: &AppContext,
) -> Result<String> {
    if json {
        let out = HistoryJson { current_index: history.current_index(), history: history.entries() };
        return Ok(format!("{}\n", serde_json::to_string(&out).context("serialize history")?));
    }

    if history.entries().is_empty() {
        return Ok(if ctx.quiet { String::new() } else { "No history recorded.\n".to_string() });
    }

    let current = history.current_index();
    let rows: Vec<HistoryRow> = history
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| HistoryRow {
            marker: if i as isize == current { "→" } else { "" },
            index: i,
            when: e
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            files: e.operations.len(),
            changes: e
                .operations
                .iter()
                .map(|op| format!("{} {}", op.action, describe(op)))
                .join("\n"),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    Ok(format!("{table}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::MemoryStore;
    use crate::core::plan::FileAction;

    fn ctx() -> AppContext {
        AppContext { quiet: false, no_color: true, dry_run: false }
    }

    #[test]
    fn test_render_marks_current_entry() {
        let mut h = HistoryManager::open(MemoryStore::new());
        h.write(vec![Operation::new("/p/a.rs", FileAction::Create)])
            .unwrap();
        h.write(vec![
            Operation::new("/p/b.rs", FileAction::Modify),
            Operation::rename("/p/c.rs", "/p/d.rs"),
        ])
        .unwrap();
        h.undo().unwrap();

        let out = render_history(&h, false, &ctx()).unwrap();
        assert!(out.contains("create /p/a.rs"));
        assert!(out.contains("modify /p/b.rs"));
        assert!(out.contains("rename /p/c.rs -> /p/d.rs"));
        assert_eq!(out.matches('→').count(), 1);
    }

    #[test]
    fn test_render_json_shape() {
        let h = HistoryManager::open(MemoryStore::new());
        let out = render_history(&h, true, &ctx()).unwrap();
        let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(v["currentIndex"], -1);
        assert!(v["history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_empty_history_message() {
        let h = HistoryManager::open(MemoryStore::new());
        assert_eq!(render_history(&h, false, &ctx()).unwrap(), "No history recorded.\n");
    }
}
