use std::process::ExitCode;

use clap::Parser;
use ifstat_cli::cli::Cli;
use ifstat_cli::watch;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match watch::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ifstat failed");
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
