use std::io;
use std::process::ExitCode;

use caret_capture::{init_logging, EnvConfig};
use caret_capture_cli::{providers, run_cli, CliArgs, CliError, USAGE};

fn main() -> ExitCode {
    let config = EnvConfig::from_env();
    init_logging(config.log_level.as_deref());

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("error: {message}\n\n{USAGE}");
            ExitCode::from(2)
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &EnvConfig) -> Result<(), CliError> {
    let args = CliArgs::parse(std::env::args().skip(1))?;
    let provider = providers::provider_from_env(config).map_err(CliError::Provider)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_cli(&args, config, provider, &mut out)?;
    Ok(())
}
