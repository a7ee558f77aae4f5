//! Patch synthesis: merge a corrected diff onto the original content
//! without touching the real target.
//!
//! The merge itself is behind [`DiffApplier`]. The in-process applier splices
//! hunks at their headers; the `patch` applier shells out to the system tool.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};

use crate::cli::EngineChoice;
use crate::core::correct::{CorrectedPatch, HunkLine};
use crate::infra::io::{LineEnding, read_lines, render_lines, split_lines};

/// Result of one apply attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub success: bool,
    pub stderr: String,
}

impl ApplyOutcome {
    fn ok() -> Self {
        Self { success: true, stderr: String::new() }
    }

    fn failed(msg: impl Into<String>) -> Self {
        Self { success: false, stderr: msg.into() }
    }
}

/// Apply a unified diff to `source`, writing the result to `output`
pub trait DiffApplier: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, diff: &str, source: &Path, output: &Path) -> Result<ApplyOutcome>;
}

/// Why a file produced no new content
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("no hunk could be anchored in the current content")]
    NothingToApply,

    #[error("patch applied but produced no changes")]
    NoChange,

    #[error("patch rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Io(String),
}

/// In-process applier with whitespace-insensitive context verification
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalApplier;

/// The system `patch` utility
#[derive(Debug, Clone)]
pub struct PatchTool {
    exe: PathBuf,
}

/// Internal first, then `patch` when it is installed
#[derive(Debug, Clone)]
pub struct AutoApplier {
    internal: InternalApplier,
    patch: Option<PatchTool>,
}

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("static regex")
});

struct ParsedHunk {
    old_start: usize,
    old_count: usize,
    lines: Vec<HunkLine>,
}

/// Parse hunks out of unified diff text, trusting the header counts
fn parse_unified(diff: &str) -> Result<Vec<ParsedHunk>, String> {
    let mut hunks = Vec::new();
    let mut lines = diff.lines();

    while let Some(line) = lines.next() {
        let Some(caps) = HUNK_HEADER.captures(line) else {
            continue;
        };
        let num = |i: usize, default: usize| {
            caps.get(i)
                .map_or(Ok(default), |m| m.as_str().parse::<usize>())
                .map_err(|e| format!("bad hunk header '{line}': {e}"))
        };
        let old_start = num(1, 0)?;
        let old_count = num(2, 1)?;
        let new_count = num(4, 1)?;

        let (mut old_left, mut new_left) = (old_count, new_count);
        let mut body = Vec::new();
        while old_left > 0 || new_left > 0 {
            let Some(raw) = lines.next() else {
                return Err(format!("truncated hunk at '{line}'"));
            };
            if raw.starts_with('\\') {
                continue;
            }
            let hl = HunkLine::parse(raw);
            match hl {
                HunkLine::Context(_) => {
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                }
                HunkLine::Remove(_) => old_left = old_left.saturating_sub(1),
                HunkLine::Add(_) => new_left = new_left.saturating_sub(1),
            }
            body.push(hl);
        }
        hunks.push(ParsedHunk { old_start, old_count, lines: body });
    }
    Ok(hunks)
}

/// Splice parsed hunks into `source`; context keeps the source's formatting
fn splice(source: &[String], hunks: &[ParsedHunk]) -> Result<Vec<String>, String> {
    let mut out = Vec::with_capacity(source.len());
    let mut cursor = 0usize;

    for (n, h) in hunks.iter().enumerate() {
        // Zero-length old ranges name the line *after which* to insert
        let start = if h.old_count == 0 { h.old_start } else { h.old_start.saturating_sub(1) };
        if start < cursor || start > source.len() {
            return Err(format!("hunk #{} at line {} is out of range", n + 1, h.old_start));
        }
        out.extend_from_slice(&source[cursor..start]);

        let mut idx = start;
        for line in &h.lines {
            match line {
                HunkLine::Add(text) => out.push(text.clone()),
                HunkLine::Context(text) | HunkLine::Remove(text) => {
                    let Some(have) = source.get(idx) else {
                        return Err(format!("hunk #{} runs past end of file", n + 1));
                    };
                    if have.trim() != text.trim() {
                        return Err(format!(
                            "hunk #{} does not match at line {}: expected '{}', found '{}'",
                            n + 1,
                            idx + 1,
                            text.trim(),
                            have.trim()
                        ));
                    }
                    if matches!(line, HunkLine::Context(_)) {
                        out.push(have.clone());
                    }
                    idx += 1;
                }
            }
        }
        cursor = idx;
    }
    out.extend_from_slice(&source[cursor..]);
    Ok(out)
}

impl DiffApplier for InternalApplier {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn apply(&self, diff: &str, source: &Path, output: &Path) -> Result<ApplyOutcome> {
        let text = fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let ending = LineEnding::detect(&text);
        let original = split_lines(&text);

        let merged = match parse_unified(diff).and_then(|hunks| splice(&original, &hunks)) {
            Ok(lines) => lines,
            Err(msg) => return Ok(ApplyOutcome::failed(msg)),
        };

        fs::write(output, render_lines(&merged, ending))
            .with_context(|| format!("Failed to write {}", output.display()))?;
        Ok(ApplyOutcome::ok())
    }
}

impl PatchTool {
    /// Locate `patch` on PATH
    pub fn detect() -> Result<Self> {
        let output = Command::new("patch")
            .arg("--version")
            .output()
            .context("`patch` executable not found in PATH")?;

        if !output.status.success() {
            anyhow::bail!("`patch --version` failed");
        }
        Ok(Self { exe: PathBuf::from("patch") })
    }
}

impl DiffApplier for PatchTool {
    fn name(&self) -> &'static str {
        "patch"
    }

    fn apply(&self, diff: &str, source: &Path, output: &Path) -> Result<ApplyOutcome> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(["-s", "-t", "-l", "-p1", "--no-backup-if-mismatch", "-r", "-", "-o"])
            .arg(output)
            .arg(source)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn patch process")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(diff.as_bytes())
                .context("Failed to write diff to patch stdin")?;
        }
        let out = child
            .wait_with_output()
            .context("Failed to wait for patch process")?;

        if out.status.success() {
            return Ok(ApplyOutcome::ok());
        }
        let mut msg = String::from_utf8_lossy(&out.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&out.stdout);
        if !stdout.trim().is_empty() {
            if !msg.is_empty() {
                msg.push('\n');
            }
            msg.push_str(stdout.trim());
        }
        Ok(ApplyOutcome::failed(msg))
    }
}

impl DiffApplier for AutoApplier {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn apply(&self, diff: &str, source: &Path, output: &Path) -> Result<ApplyOutcome> {
        let first = self.internal.apply(diff, source, output)?;
        if first.success {
            return Ok(first);
        }
        match &self.patch {
            Some(tool) => {
                debug!(reason = %first.stderr, "internal applier failed; trying patch");
                tool.apply(diff, source, output)
            }
            None => Ok(first),
        }
    }
}

/// Build the applier for `choice`. `patch` must be installed for the patch engine.
pub fn create_applier(choice: EngineChoice) -> Result<Box<dyn DiffApplier>> {
    Ok(match choice {
        EngineChoice::Internal => Box::new(InternalApplier),
        EngineChoice::Patch => Box::new(PatchTool::detect()?),
        EngineChoice::Auto => Box::new(AutoApplier {
            internal: InternalApplier,
            patch: PatchTool::detect().ok(),
        }),
    })
}

/// Produce the new content of `source` by applying `patch` to a scratch copy.
///
/// A missing source is treated as empty so that pure additions create files.
#[instrument(level = "debug", skip(applier, patch), fields(engine = applier.name()))]
pub fn synthesize(
    applier: &dyn DiffApplier,
    patch: &CorrectedPatch,
    source: &Path,
) -> Result<Vec<String>, SynthError> {
    if patch.is_empty() {
        return Err(SynthError::NothingToApply);
    }
    let io = |e: anyhow::Error| SynthError::Io(format!("{e:#}"));
    let io_std = |e: std::io::Error| SynthError::Io(e.to_string());

    let scratch = tempfile::tempdir().map_err(io_std)?;
    let original = read_lines(source).map_err(io)?;

    let src_path = if original.is_some() {
        source.to_path_buf()
    } else {
        let empty = scratch.path().join("empty");
        fs::write(&empty, "").map_err(io_std)?;
        empty
    };
    let out_path = scratch.path().join("out");

    let outcome = applier.apply(&patch.render(), &src_path, &out_path).map_err(io)?;
    if !outcome.success {
        return Err(SynthError::Rejected(outcome.stderr));
    }

    let merged = read_lines(&out_path)
        .map_err(io)?
        .ok_or_else(|| SynthError::Io("applier wrote no output".to_string()))?;
    if merged == original.unwrap_or_default() {
        return Err(SynthError::NoChange);
    }
    Ok(merged)
}
