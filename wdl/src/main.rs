use std::process::ExitCode;

use wdl::{init_logger, replay};
use wdl_config::{CaptureConfig, LoadConfiguration, LoggingConfig};

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let exec_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            let _ = init_logger(&LoggingConfig::default());
            log::error!("Couldn't determine the working directory: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = match CaptureConfig::load(&exec_dir) {
        Ok(config) => config,
        Err(err) => {
            let _ = init_logger(&LoggingConfig::default());
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logger(&config.logging) {
        eprintln!("Failed to initialize logger: {err}");
    }

    log::info!("Starting wdl {CARGO_PKG_VERSION}");
    log::debug!(
        "Build info: OS: \"{}\", ARCH: \"{}\", BUILD: \"{}\"",
        std::env::consts::OS,
        std::env::consts::ARCH,
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    match replay(&config).await {
        Ok(summary) if summary.truncated => {
            log::warn!("The capture was cut short; everything before the damage was saved");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Replay failed: {err}");
            ExitCode::FAILURE
        }
    }
}
