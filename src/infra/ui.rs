//! Terminal output helpers: colored status lines, progress bars, prompts.

use std::io::{self, BufRead, Write};

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::cli::AppContext;

/// Status printer honoring --quiet and --no-color
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    quiet: bool,
    color: bool,
}

impl Printer {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            quiet: ctx.quiet,
            color: !ctx.no_color,
        }
    }

    /// Green check line on stdout
    pub fn success(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{} {}", "✓".green(), msg.as_ref());
        } else {
            println!("✓ {}", msg.as_ref());
        }
    }

    /// Plain informational line on stdout
    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", msg.as_ref());
        }
    }

    /// Yellow warning on stderr; shown even with --quiet
    pub fn warn(&self, msg: impl AsRef<str>) {
        if self.color {
            eprintln!("{} {}", "warning:".yellow().bold(), msg.as_ref());
        } else {
            eprintln!("warning: {}", msg.as_ref());
        }
    }

    /// Red failure line on stderr; shown even with --quiet
    pub fn error(&self, msg: impl AsRef<str>) {
        if self.color {
            eprintln!("{} {}", "✗".red(), msg.as_ref());
        } else {
            eprintln!("✗ {}", msg.as_ref());
        }
    }

    /// Dim line, used for path listings
    pub fn detail(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("  {}", msg.as_ref().dimmed());
        } else {
            println!("  {}", msg.as_ref());
        }
    }

    /// Colorize one line of a unified diff preview
    pub fn diff_line(&self, line: &str) -> String {
        if !self.color {
            return line.to_string();
        }
        if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line.to_string()
        }
    }
}

/// Progress bar over `len` items, hidden in quiet mode
pub fn progress(ctx: &AppContext, len: usize) -> ProgressBar {
    if ctx.quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Ask a yes/no question on stderr; EOF or anything but y/yes declines
pub fn confirm(question: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    confirm_with(question, &mut stdin.lock(), &mut io::stderr())
}

pub fn confirm_with<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    out: &mut W,
) -> io::Result<bool> {
    write!(out, "{question} [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        // EOF
        writeln!(out)?;
        return Ok(false);
    }
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
