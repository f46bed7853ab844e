use std::process::ExitCode;

use anstream::eprintln;
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;

use crate::cli::{CacheCommand, Cli, Commands, ProjectCommand};
use crate::commands::ExitStatus;
use crate::printer::Printer;

mod cli;
mod commands;
mod logging;
mod printer;

fn run() -> Result<ExitStatus> {
    let Cli {
        command,
        global_args,
    } = Cli::parse();

    anstream::ColorChoice::write_global(global_args.color.into());

    let level = if global_args.quiet {
        logging::Level::Quiet
    } else if global_args.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    };
    logging::setup_logging(level)?;

    let printer = if global_args.quiet {
        Printer::Quiet
    } else {
        Printer::Default
    };
    let python = global_args.python.as_deref();
    let build_dir = global_args.build_dir;

    match command {
        Commands::Import(args) => commands::import(args, python, build_dir, printer),
        Commands::Cache(cache) => match cache.command {
            CacheCommand::Dir => commands::cache_dir(python, build_dir, printer),
            CacheCommand::Clear => commands::cache_clear(python, build_dir, printer),
            CacheCommand::Status(args) => {
                commands::cache_status(args.source.as_deref(), python, build_dir, printer)
            }
        },
        Commands::Project(project) => match project.command {
            ProjectCommand::Show(args) => commands::project_show(&args.dir, printer),
        },
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code.into(),
        Err(err) => {
            let mut causes = err.chain();
            if let Some(err) = causes.next() {
                eprintln!("{}: {}", "error".red().bold(), err);
            }
            for err in causes {
                eprintln!("  {}: {}", "Caused by".red().bold(), err);
            }
            ExitStatus::Error.into()
        }
    }
}
