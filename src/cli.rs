use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "itf")]
#[command(
    about = "Turn pasted LLM output (file blocks and sloppy diffs) into reversible file changes"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replace whole files from path-hinted code blocks
    Block(ApplyArgs),

    /// Repair and apply ```diff blocks
    Diff(ApplyArgs),

    /// Apply both code blocks and diffs (code blocks win on conflict)
    Auto(ApplyArgs),

    /// Print corrected diffs to stdout without touching any file
    Fix(FixArgs),

    /// Revert the most recent applied batch
    Undo(HistoryStepArgs),

    /// Re-apply the most recently reverted batch
    Redo(HistoryStepArgs),

    /// List the recorded batches
    History(HistoryArgs),

    /// Initialize an itf.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the pasted text comes from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read input from the clipboard
    #[arg(short, long, conflicts_with = "input")]
    pub clipboard: bool,

    /// Input file to parse ("-" for stdin); defaults to itf.txt
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Directories searched (in order) for existing files; new files go to the first
    #[arg(short = 'l', long = "lookup-dir", value_name = "DIR")]
    pub lookup_dirs: Vec<String>,

    /// Only accept these file extensions (e.g. .rs, py)
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Only accept paths matching these globs
    #[arg(long, value_name = "GLOB")]
    pub only: Vec<String>,

    /// Engine used to merge corrected diffs: internal, patch, auto
    #[arg(long, value_enum)]
    pub engine: Option<EngineChoice>,

    /// Create missing directories without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Emit the run report as single-line JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// In-process applier with whitespace-tolerant context checks
    Internal,
    /// System `patch` utility
    Patch,
    /// Try internal first, fall back to `patch`
    Auto,
}

#[derive(Args, Debug, Clone)]
pub struct FixArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Directories searched (in order) for the files the diffs target
    #[arg(short = 'l', long = "lookup-dir", value_name = "DIR")]
    pub lookup_dirs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryStepArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Restore files even if they changed since the batch was applied
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,

    /// Write the script into this directory instead of printing it
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}
