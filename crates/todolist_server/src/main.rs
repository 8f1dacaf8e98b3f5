//! `todolist-server` entry point.

use clap::Parser;
use log::error;
use std::process::ExitCode;
use todolist_core::init_logging;
use todolist_server::config::{Cli, ServerSettings};
use todolist_server::{run, ServerError};

#[tokio::main]
async fn main() -> ExitCode {
    match start(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=server_exit module=server status=error error={err}");
            eprintln!("todolist-server: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn start(cli: Cli) -> Result<(), ServerError> {
    let settings = ServerSettings::resolve(cli)?;
    init_logging(&settings.log_level, settings.log_dir.as_deref()).map_err(ServerError::Logging)?;
    run(settings).await
}
