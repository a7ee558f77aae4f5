//! **itf** - turn pasted LLM output into reversible file changes
//!
//! Fenced file blocks replace whole files; sloppy ```diff blocks are re-anchored
//! against the real source before they are applied. Every applied batch lands
//! in a linear undo/redo history backed by a per-file content journal.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core pipeline: extract → correct → synthesize → plan → apply, plus history
pub mod core {
    /// Fenced block and diff extraction with path hint discovery
    pub mod extract;

    /// Hunk re-anchoring and header reconstruction
    pub mod correct;

    /// Diff application onto scratch copies (internal engine or `patch`)
    pub mod synth;

    /// Per-mode action planning and block/diff conflict resolution
    pub mod plan;
    pub use plan::{FileAction, Mode, Plan, Planner};

    /// Linear undo/redo history with pluggable storage
    pub mod history;
    pub use history::{FileStore, HistoryManager, MemoryStore, StateStore};

    /// Per-file snapshot journal acting as the editor backend
    pub mod journal;
    pub use journal::{EditorBackend, JournalEditor};

    /// block/diff/auto/fix handlers
    pub mod apply;
    pub use apply::{fix_run, run as apply_run};

    /// undo/redo/history handlers
    pub mod undo;
    pub use undo::{history_run, redo_run, undo_run};

    /// Exit-code taxonomy
    pub mod error;
    pub use error::{RunError, finish_with_exit};
}

/// Infrastructure - configuration, I/O, paths, terminal output, logging
pub mod infra {
    /// Layered configuration (itf.toml + ITF_* env)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Input sources, line handling and atomic writes
    pub mod io;

    /// Ordered lookup-directory resolution
    pub mod paths;
    pub use paths::PathResolver;

    /// Colored status lines, progress bars and prompts
    pub mod ui;

    /// tracing subscriber setup
    pub mod logging;
}

pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};
