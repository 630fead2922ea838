use clap::Parser;
use gangway::logging;
use gangway::terminal::{app, cli::Cli, error::CliError};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _log_guard = match logging::init(&cli.logging.to_config()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{}", CliError::Logging(err.to_string()));
            return ExitCode::FAILURE;
        }
    };

    match app::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
