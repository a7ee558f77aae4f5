//! `block`, `diff`, `auto` and `fix` command handlers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;
use tracing::{info, instrument, warn};

use crate::cli::{AppContext, ApplyArgs, FixArgs, SourceArgs};
use crate::core::correct::Correction;
use crate::core::error::RunError;
use crate::core::extract::PathFilter;
use crate::core::history::{FileStore, HistoryManager, Operation};
use crate::core::journal::{EditorBackend, JournalEditor};
use crate::core::plan::{FileAction, Mode, Origin, Plan, Planner, PlanFailure, collect_diffs, correct_all};
use crate::core::synth::{DiffApplier, create_applier};
use crate::infra::config::Config;
use crate::infra::io::{InputOrigin, InputRequest, LineEnding, read_input, render_lines};
use crate::infra::paths::PathResolver;
use crate::infra::ui::{self, Printer};

/// Answers the missing-directory prompt
pub type Confirm<'a> = &'a mut dyn FnMut(&str) -> io::Result<bool>;

#[derive(Debug, Serialize)]
struct AppliedFile {
    path: PathBuf,
    action: FileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_path: Option<PathBuf>,
    /// Absent for deletions and plain moves
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<Origin>,
}

impl AppliedFile {
    fn operation(&self) -> Operation {
        Operation { path: self.path.clone(), action: self.action, new_path: self.new_path.clone() }
    }

    fn describe(&self) -> String {
        match &self.new_path {
            Some(to) => format!("{} -> {}", self.path.display(), to.display()),
            None => self.path.display().to_string(),
        }
    }
}

/// Everything the plan would change, in the order it is staged
fn planned_changes(plan: &Plan) -> Vec<AppliedFile> {
    let files = plan.files.iter().filter(|(p, _)| plan.action(p) != FileAction::Rename);
    let files = files.map(|(p, f)| AppliedFile {
        path: p.clone(),
        action: plan.action(p),
        new_path: None,
        origin: Some(f.origin),
    });
    let deletes = plan.deletes.iter().map(|d| AppliedFile {
        path: d.path.clone(),
        action: FileAction::Delete,
        new_path: None,
        origin: None,
    });
    let renames = plan.renames.iter().map(|r| AppliedFile {
        path: r.from.clone(),
        action: FileAction::Rename,
        new_path: Some(r.to.clone()),
        origin: plan.files.get(&r.to).map(|f| f.origin),
    });
    files.chain(deletes).chain(renames).collect()
}

/// Machine-readable run summary (`--json`)
#[derive(Debug, Serialize)]
struct RunReport {
    mode: &'static str,
    input: String,
    dry_run: bool,
    applied: Vec<AppliedFile>,
    failures: Vec<PlanFailure>,
    conflicts: Vec<PathBuf>,
    dropped_hunks: usize,
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Block => "block",
        Mode::Diff => "diff",
        Mode::Auto => "auto",
    }
}

/// Pick the input source: explicit flags, else the configured file
/// (clipboard first for `auto` and `fix`)
pub fn input_request(
    source: &SourceArgs,
    cfg: &Config,
    root: &Path,
    clipboard_first: bool,
) -> InputRequest {
    if source.clipboard {
        return InputRequest::Clipboard;
    }
    let anchor = |p: &Path| {
        if p.as_os_str() == "-" || p.is_absolute() { p.to_path_buf() } else { root.join(p) }
    };
    match &source.input {
        Some(p) => InputRequest::File(anchor(p)),
        None if clipboard_first => InputRequest::ClipboardThenFile(anchor(&cfg.input.source_file)),
        None => InputRequest::File(anchor(&cfg.input.source_file)),
    }
}

fn load_text(req: &InputRequest) -> Result<Option<(String, InputOrigin)>> {
    read_input(req).map_err(|e| RunError::InvalidInput(format!("{e:#}")).into())
}

/// Entry point for `itf block|diff|auto`
pub fn run(mode: Mode, args: ApplyArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let mut prompt = |q: &str| ui::confirm(q);
    run_in(&root, mode, args, cfg, ctx, &mut prompt)
}

/// Apply pasted content with `root` as the working directory
#[instrument(level = "debug", skip_all, fields(mode = mode_name(mode)))]
pub fn run_in(
    root: &Path,
    mode: Mode,
    args: ApplyArgs,
    cfg: &Config,
    ctx: &AppContext,
    confirm: Confirm<'_>,
) -> Result<()> {
    let printer = Printer::new(ctx);

    // 1) Read input
    let req = input_request(&args.source, cfg, root, mode == Mode::Auto);
    let Some((text, origin)) = load_text(&req)? else {
        printer.info("No content found; nothing to do.");
        return Ok(());
    };
    info!(%origin, bytes = text.len(), "input loaded");

    // 2) Environment checks before anything else
    let extensions = if args.extensions.is_empty() { &cfg.input.extensions } else { &args.extensions };
    let filter = PathFilter::new(extensions, &args.only)?;
    let lookup = if args.lookup_dirs.is_empty() { &cfg.input.lookup_dirs } else { &args.lookup_dirs };
    let resolver = PathResolver::new(lookup, root).map_err(|e| RunError::InvalidInput(format!("{e:#}")))?;

    let applier: Option<Box<dyn DiffApplier>> = if mode == Mode::Block {
        None
    } else {
        let choice = args.engine.unwrap_or(cfg.apply.engine);
        Some(create_applier(choice).map_err(|e| RunError::Environment(format!("{e:#}")))?)
    };

    // 3) Plan
    let mut planner = Planner::new(&resolver, &filter);
    if let Some(a) = applier.as_deref() {
        planner = planner.with_applier(a);
    }
    let plan = planner.plan(mode, &text)?;

    for c in &plan.conflicts {
        printer.warn(format!(
            "{}: both a diff and a code block target this file; using the code block",
            c.display()
        ));
    }

    // 4) Nothing to write
    if plan.is_empty() {
        report_failures(&printer, &plan.failures);
        if args.json {
            print_json(mode, &origin, ctx, &plan, Vec::new())?;
        } else if plan.failures.is_empty() {
            printer.info(format!("No file blocks or diffs found in {origin}."));
        }
        return finish(&plan.failures, 0);
    }

    // 5) Preview only
    if ctx.dry_run {
        preview(&printer, &plan)?;
        if args.json {
            print_json(mode, &origin, ctx, &plan, planned_changes(&plan))?;
        }
        report_failures(&printer, &plan.failures);
        return Ok(());
    }

    // 6) Missing directories need consent
    if !plan.dirs.is_empty() {
        let assume_yes = args.yes || cfg.apply.assume_yes;
        if !assume_yes {
            printer.info("The following directories will be created:");
            for d in &plan.dirs {
                printer.detail(d.display().to_string());
            }
            let question = format!("Create {} director{}?", plan.dirs.len(), plural_y(plan.dirs.len()));
            if !confirm(&question).context("Failed to read confirmation")? {
                printer.info("Aborted; nothing was changed.");
                return Ok(());
            }
        }
        for d in &plan.dirs {
            fs::create_dir_all(d).with_context(|| format!("create directory: {}", d.display()))?;
        }
    }

    // 7) Stage moves first so rewritten destinations keep the moved line endings
    let mut editor = JournalEditor::new(cfg.journal_path(root), cfg.journal.max_snapshots);
    let mut failures = plan.failures.clone();
    let pb = ui::progress(ctx, plan.files.len() + plan.deletes.len() + plan.renames.len());
    for r in &plan.renames {
        pb.set_message(r.display.clone());
        if let Err(e) = editor.rename(&r.from, &r.to) {
            failures.push(PlanFailure { path: r.from.clone(), reason: format!("{e:#}") });
        }
        pb.inc(1);
    }
    for (path, file) in &plan.files {
        pb.set_message(file.display.clone());
        if let Err(e) = editor.open_or_replace(path, &file.lines) {
            warn!(path = %path.display(), "editor rejected file: {e:#}");
            failures.push(PlanFailure { path: path.clone(), reason: format!("{e:#}") });
        }
        pb.inc(1);
    }
    for d in &plan.deletes {
        pb.set_message(d.display.clone());
        if let Err(e) = editor.remove(&d.path) {
            failures.push(PlanFailure { path: d.path.clone(), reason: format!("{e:#}") });
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let saved = editor.save_all();
    for (path, reason) in saved.failed {
        failures.push(PlanFailure { path, reason });
    }

    // 8) One history entry for what actually landed; half a move is taken back
    let landed = |p: &Path| saved.saved.iter().any(|s| s == p);
    let mut applied = Vec::new();
    for change in planned_changes(&plan) {
        let Some(to) = &change.new_path else {
            if landed(change.path.as_path()) {
                applied.push(change);
            }
            continue;
        };
        match (landed(change.path.as_path()), landed(to.as_path())) {
            (true, true) => applied.push(change),
            (false, false) => {}
            (from_ok, _) => {
                let orphan = if from_ok { &change.path } else { to };
                if let Err(e) = editor.discard_last_save(orphan) {
                    warn!(path = %orphan.display(), "could not take back half a rename: {e:#}");
                }
                failures.push(PlanFailure {
                    path: change.path.clone(),
                    reason: format!("rename to {} did not complete; rolled back", to.display()),
                });
            }
        }
    }

    if !applied.is_empty() {
        let mut history = HistoryManager::open(FileStore::new(cfg.state_path(root)));
        if let Err(e) = history.write(applied.iter().map(AppliedFile::operation).collect()) {
            // Unrecorded changes could never be undone; put every file back
            for change in &applied {
                for path in change.operation().paths() {
                    if let Err(undo) = editor.discard_last_save(path) {
                        warn!(path = %path.display(), "rollback failed: {undo:#}");
                    }
                }
            }
            return Err(anyhow::Error::new(e).context("history not recorded; changes were rolled back"));
        }
    }

    // 9) Summary
    let applied_count = applied.len();
    if args.json {
        print_json_with(mode, &origin, ctx, &plan.conflicts, plan.dropped_hunks, &failures, applied)?;
    } else {
        for a in &applied {
            printer.success(format!("{:<6} {}", a.action, a.describe()));
        }
        report_failures(&printer, &failures);
        if plan.dropped_hunks > 0 {
            printer.warn(format!("{} hunk(s) could not be anchored and were skipped", plan.dropped_hunks));
        }
    }

    finish(&failures, applied_count)
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 { "y" } else { "ies" }
}

fn report_failures(printer: &Printer, failures: &[PlanFailure]) {
    for f in failures {
        printer.error(format!("{}: {}", f.path.display(), f.reason));
    }
}

/// Exit status for a run: any failure is a partial failure
fn finish(failures: &[PlanFailure], applied: usize) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    Err(RunError::Partial(format!(
        "{} file(s) applied, {} failed",
        applied,
        failures.len()
    ))
    .into())
}

fn print_json(
    mode: Mode,
    origin: &InputOrigin,
    ctx: &AppContext,
    plan: &Plan,
    applied: Vec<AppliedFile>,
) -> Result<()> {
    print_json_with(mode, origin, ctx, &plan.conflicts, plan.dropped_hunks, &plan.failures, applied)
}

fn print_json_with(
    mode: Mode,
    origin: &InputOrigin,
    ctx: &AppContext,
    conflicts: &[PathBuf],
    dropped_hunks: usize,
    failures: &[PlanFailure],
    applied: Vec<AppliedFile>,
) -> Result<()> {
    let report = RunReport {
        mode: mode_name(mode),
        input: origin.to_string(),
        dry_run: ctx.dry_run,
        applied,
        failures: failures.to_vec(),
        conflicts: conflicts.to_vec(),
        dropped_hunks,
    };
    println!("{}", serde_json::to_string(&report).context("JSON serialization failed")?);
    Ok(())
}

/// Unified diffs of every planned file against disk
fn preview(printer: &Printer, plan: &Plan) -> Result<()> {
    for d in &plan.dirs {
        printer.info(format!("DRY RUN: would create directory {}", d.display()));
    }
    for (path, file) in &plan.files {
        // A rename destination is compared with the file it moves from
        let base = plan.rename_source(path).unwrap_or(path);
        let old = match fs::read_to_string(base) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("read {}", base.display()))),
        };
        let new = render_lines(&file.lines, LineEnding::detect(&old));

        let verb = match plan.action(path) {
            FileAction::Rename => FileAction::Modify,
            action => action,
        };
        println!("DRY RUN: would {verb} {}", path.display());
        let diff = TextDiff::from_lines(&old, &new);
        let rendered = diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", file.display), &format!("b/{}", file.display))
            .to_string();
        for line in rendered.lines() {
            println!("{}", printer.diff_line(line));
        }
    }
    for d in &plan.deletes {
        println!("DRY RUN: would delete {}", d.path.display());
    }
    for r in &plan.renames {
        println!("DRY RUN: would rename {} -> {}", r.from.display(), r.to.display());
    }
    Ok(())
}

/// Entry point for `itf fix`
pub fn fix_run(args: FixArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let out = fix_in(&root, &args, cfg)?;
    if out.is_empty() {
        Printer::new(ctx).warn("no applicable diffs found");
    } else {
        print!("{out}");
    }
    Ok(())
}

/// Corrected diffs for every diff block in the input, concatenated
pub fn fix_in(root: &Path, args: &FixArgs, cfg: &Config) -> Result<String> {
    let req = input_request(&args.source, cfg, root, true);
    let Some((text, _)) = load_text(&req)? else {
        return Ok(String::new());
    };

    let lookup = if args.lookup_dirs.is_empty() { &cfg.input.lookup_dirs } else { &args.lookup_dirs };
    let resolver = PathResolver::new(lookup, root).map_err(|e| RunError::InvalidInput(format!("{e:#}")))?;
    let filter = PathFilter::new(&cfg.input.extensions, &[])?;

    let diffs = collect_diffs(&text, &resolver, &filter);
    let corrections: Vec<(PathBuf, Correction)> = correct_all(&diffs);

    let mut out = String::new();
    for (path, c) in corrections {
        if !c.dropped.is_empty() {
            warn!(path = %path.display(), dropped = c.dropped.len(), "hunks without anchor omitted");
        }
        out.push_str(&c.patch.render());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_request_defaults() {
        let cfg = Config::default();
        let root = Path::new("/work");
        let src = SourceArgs::default();

        match input_request(&src, &cfg, root, false) {
            InputRequest::File(p) => assert_eq!(p, PathBuf::from("/work/itf.txt")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            input_request(&src, &cfg, root, true),
            InputRequest::ClipboardThenFile(_)
        ));

        let stdin = SourceArgs { clipboard: false, input: Some(PathBuf::from("-")) };
        match input_request(&stdin, &cfg, root, true) {
            InputRequest::File(p) => assert_eq!(p, PathBuf::from("-")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_partial_failure_is_exit_two() {
        let f = vec![PlanFailure { path: PathBuf::from("x"), reason: "no".into() }];
        let err = finish(&f, 1).unwrap_err();
        let typed = crate::core::error::classify(err);
        assert_eq!(crate::core::error::exit_code_for(&typed), 2);
        assert!(finish(&[], 0).is_ok());
    }
}
