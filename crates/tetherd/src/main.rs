//! Command-line entry point for the tether server.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match tetherd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "tetherd: {error}").is_err() {
                return ExitCode::from(2);
            }
            ExitCode::FAILURE
        }
    }
}
