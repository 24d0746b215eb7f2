use clap::Parser;

use crate::actions::{self, CommandContext};
use crate::cli::args::{Cli, Commands};
use crate::cli::logging::init_tracing;
use crate::errors::{CliError, Exit};

pub(crate) fn run() -> Exit {
    // clap's own usage-error exit code would collide with the cleanup-failure code
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                Exit::Failure
            } else {
                Exit::Success
            };
        }
    };

    init_tracing(cli.global.verbose, cli.global.quiet);

    match execute(cli) {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit()
        }
    }
}

fn execute(cli: Cli) -> Result<Exit, CliError> {
    let ctx = CommandContext::load(&cli.global)?;
    tracing::debug!(repo = %ctx.repo_root.display(), "resolved repository");

    match cli.command {
        Commands::Apply(cmd) => actions::run_apply(&ctx, &cmd),
        Commands::Review(cmd) => actions::run_review(&ctx, &cmd),
        Commands::Rollback(cmd) => actions::run_rollback(&ctx, &cmd),
        Commands::Status => actions::run_status(&ctx),
    }
}
