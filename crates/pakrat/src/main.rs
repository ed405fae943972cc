use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use crate::commands::ExitStatus;
use crate::settings::Settings;

mod commands;
mod logging;
mod settings;

#[derive(Parser)]
#[command(name = "pakrat", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// With no subcommand, the role comes from the `MODE` variable
    /// (`server` or `worker`) so one container image can play both parts.
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    settings: Settings,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the caching proxy server.
    Serve,
    /// Run the background download worker.
    Work,
    /// Delete stored package files older than the given age.
    Prune(PruneArgs),
}

#[derive(Args)]
struct PruneArgs {
    /// Delete files older than this number of days.
    days: u64,

    /// Don't actually delete anything.
    #[arg(long)]
    dry_run: bool,
}

async fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    });

    let command = match cli.command {
        Some(command) => command,
        None => match std::env::var("MODE").as_deref() {
            Ok("server") => Commands::Serve,
            Ok("worker") => Commands::Work,
            Ok(other) => bail!("Unknown mode: {other}"),
            Err(_) => bail!("No command given and `MODE` is not set"),
        },
    };

    match command {
        Commands::Serve => commands::serve(cli.settings).await,
        Commands::Work => commands::work(cli.settings).await,
        Commands::Prune(args) => commands::prune(cli.settings, args.days, args.dry_run).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match inner().await {
        Ok(status) => status.into(),
        Err(err) => {
            let mut causes = err.chain();
            eprintln!("error: {}", causes.next().expect("non-empty error chain"));
            for cause in causes {
                eprintln!("  caused by: {cause}");
            }
            ExitStatus::Error.into()
        }
    }
}
