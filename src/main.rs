use anyhow::Result;
use clap::Parser;
use itf::cli::{AppContext, Cli, Commands};
use itf::core::{Mode, finish_with_exit};
use itf::infra::logging::init_logging;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    finish_with_exit(dispatch(cli.command, &ctx));
}

fn dispatch(command: Commands, ctx: &AppContext) -> Result<()> {
    // Commands that never need the project config
    let command = match command {
        Commands::Init(args) => return itf::infra::config::init(args, ctx),
        Commands::Completions(args) => return itf::completion::run(args, ctx),
        other => other,
    };

    let cfg = itf::load_config()?;
    match command {
        Commands::Block(args) => itf::core::apply_run(Mode::Block, args, &cfg, ctx),
        Commands::Diff(args) => itf::core::apply_run(Mode::Diff, args, &cfg, ctx),
        Commands::Auto(args) => itf::core::apply_run(Mode::Auto, args, &cfg, ctx),
        Commands::Fix(args) => itf::core::fix_run(args, &cfg, ctx),
        Commands::Undo(args) => itf::core::undo_run(args, &cfg, ctx),
        Commands::Redo(args) => itf::core::redo_run(args, &cfg, ctx),
        Commands::History(args) => itf::core::history_run(args, &cfg, ctx),
        Commands::Init(_) | Commands::Completions(_) => Ok(()),
    }
}
