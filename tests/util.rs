//! Shared test utilities for integration tests
//!
//! Provides fixture creation and argument builders used across
//! multiple test files.

#![allow(dead_code)]

use assert_fs::prelude::*;
use itf::cli::{AppContext, ApplyArgs, HistoryStepArgs, SourceArgs};

/// Project with one existing file and a pasted input file
pub fn make_project(input: &str) -> assert_fs::TempDir
{
    // Initialize the temporary project root
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    // Existing source that diffs can anchor against
    tmp.child("src/app.py")
        .write_str("def main():\n    print('hello')\n    return 0\n")
        .expect("write app.py");

    // The pasted text, as if saved from a chat window
    tmp.child("itf.txt")
        .write_str(input)
        .expect("write itf.txt");

    tmp
}

/// Quiet, colorless context so test output stays clean
pub fn ctx() -> AppContext
{
    AppContext { quiet: true, no_color: true, dry_run: false }
}

pub fn dry_ctx() -> AppContext
{
    AppContext { quiet: true, no_color: true, dry_run: true }
}

/// Apply args reading `itf.txt` under the project root, prompts pre-answered
pub fn apply_args(root: &std::path::Path) -> ApplyArgs
{
    ApplyArgs {
        source: SourceArgs { clipboard: false, input: Some(root.join("itf.txt")) },
        lookup_dirs: Vec::new(),
        extensions: Vec::new(),
        only: Vec::new(),
        engine: None,
        yes: true,
        json: false,
    }
}

pub fn step_args() -> HistoryStepArgs
{
    HistoryStepArgs { yes: true, force: false }
}

/// Prompt stub that must never be reached
pub fn no_prompt(q: &str) -> std::io::Result<bool>
{
    panic!("unexpected prompt: {q}")
}
