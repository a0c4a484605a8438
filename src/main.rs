use clap::Parser;
use std::process::ExitCode;

mod args;
mod cache;
mod compression;
mod file_serving;
mod http;
mod logging;
mod redirect;
mod routing;
mod server;
mod tls;

use args::Args;
use logging::setup_logging;
use server::start_server;

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging();

    match start_server(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
