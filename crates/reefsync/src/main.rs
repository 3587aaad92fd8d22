mod cli;
mod commands;
mod error;
mod output;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use reefsync_config::Config;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli.global.config.clone().unwrap_or_else(reefsync_config::config_path);

    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "reefsync", &mut std::io::stdout());
            Ok(())
        }

        Command::Config(args) => {
            let config = load(&path)?;
            commands::config_cmd::handle(args, &config, &path, cli.global.output)
        }

        cmd => {
            let config = load(&path)?;
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &config, &path, cli.global.output).await
        }
    }
}

fn load(path: &Path) -> Result<Config, CliError> {
    reefsync_config::load_config_from(path).map_err(|e| CliError::config(e, path))
}
