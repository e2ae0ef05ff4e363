use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use shelfd::config::{CliArgs, ServerConfig};
use shelfd::server::Server;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    let args = match CliArgs::parse().merge_config_file() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("shelfd: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = shelfd::logging::init(&args) {
        eprintln!("shelfd: failed to install logging: {err}");
        return ExitCode::FAILURE;
    }

    let config = match ServerConfig::from_cli_args(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let signal_rx = match shelfd::signals::spawn() {
        Ok(rx) => rx,
        Err(err) => {
            error!(error = %err, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let server = Server::new(config);
    if let Err(err) = server.start() {
        error!(error = %err, "failed to start server");
        return ExitCode::FAILURE;
    }

    server.run(signal_rx, SHUTDOWN_TIMEOUT, || {
        let args = CliArgs::parse().merge_config_file()?;
        Ok(ServerConfig::from_cli_args(&args)?)
    });

    ExitCode::SUCCESS
}
