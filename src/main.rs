//! backlog - Dependency-aware work queue for autonomous workers

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = backlog::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
