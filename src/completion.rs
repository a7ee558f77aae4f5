//! `itf completions`: shell completion scripts generated from the clap tree.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Generator, Shell, generate};

use crate::cli::{AppContext, Cli, CompletionsArgs};
use crate::infra::io::write_atomic;
use crate::infra::ui::Printer;

const BIN: &str = "itf";

/// Completion script for `shell`
pub fn render(shell: Shell, out: &mut dyn Write) {
    generate(shell, &mut Cli::command(), BIN, out);
}

/// Write the script into `dir` under the name the shell looks for
pub fn install(shell: Shell, dir: &Path) -> Result<PathBuf> {
    let mut script = Vec::new();
    render(shell, &mut script);

    fs::create_dir_all(dir).with_context(|| format!("create directory: {}", dir.display()))?;
    let path = dir.join(shell.file_name(BIN));
    write_atomic(&path, &script)?;
    Ok(path)
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let Some(dir) = args.out_dir else {
        render(args.shell, &mut io::stdout().lock());
        return Ok(());
    };

    let printer = Printer::new(ctx);
    if ctx.dry_run {
        printer.info(format!(
            "DRY RUN: would write {} completions to {}",
            args.shell,
            dir.join(args.shell.file_name(BIN)).display()
        ));
        return Ok(());
    }

    let path = install(args.shell, &dir)?;
    printer.success(format!("Wrote {} completions to {}", args.shell, path.display()));
    Ok(())
}
