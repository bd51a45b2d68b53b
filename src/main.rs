//! soilmap - Digital soil mapping toolkit

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = soilmap::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
