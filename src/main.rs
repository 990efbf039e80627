mod cli;
mod commands;
mod config;
mod modules;
mod progress;
mod provider;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, NodeCommand};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: cli.config,
    };

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Plan(args) => commands::plan::run(&ctx, args.json),
        Command::Apply(args) => commands::apply::run(&ctx, args.yes, args.dry_run),
        Command::Destroy(args) => commands::destroy::run(&ctx, args.yes),
        Command::Outputs(args) => commands::outputs::run(&ctx, args.json),
        Command::RenderUserData => commands::user_data::run(&ctx),
        Command::Node(NodeCommand::Bootstrap(args)) => {
            let code = commands::node::bootstrap(&ctx, &args.payload, &args.journal);
            std::process::exit(code)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tierstack", &mut io::stdout());
            Ok(())
        }
    }
}
