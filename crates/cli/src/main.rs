// gitseal CLI entry point. Runs the lock/unlock flows directly against the
// local repository; no daemon is involved.

use std::process;

use clap::Parser;
use gitseal_daemon::config::DaemonConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "gitseal", about = "Lock and unlock notebooks with signed git commits")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.command.json_flag());

    let filter = EnvFilter::try_from_env("GITSEAL_LOG_FILTER").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();

    let result = DaemonConfig::load()
        .map_err(anyhow::Error::new)
        .and_then(|config| commands::run(cli.command, &commands::Session::new(&config.commands)));

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
