mod actions;
mod cli;
mod errors;

use std::process::ExitCode;

/// Parse arguments, run the selected command, and map its outcome to an exit code.
pub fn run_cli() -> ExitCode {
    cli::dispatch::run().into()
}
