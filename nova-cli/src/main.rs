use std::process::ExitCode;

fn main() -> ExitCode {
    nova::run_cli()
}
