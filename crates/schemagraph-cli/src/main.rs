//! schemagraph command-line tool
//!
//! Inspects, checks and normalizes schema design project documents.

mod commands;
mod config;
mod error;
mod formatter;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Args, Command};

fn main() {
    // Logs go to stderr so command output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("schemagraph_cli=info,schemagraph_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> error::Result<()> {
    let (config, command) = args.into_config();
    tracing::debug!(load = ?config.load, save = ?config.save, "configuration loaded");

    let output = match command {
        Command::Inspect { file, format, tree } => commands::inspect(&file, &config, format, tree)?,
        Command::Resave { file, output, .. } => {
            commands::resave(&file, output.as_deref(), &config)?
        }
        Command::Check { file } => commands::check(&file, &config)?,
    };
    println!("{}", output);
    Ok(())
}
