use std::path::PathBuf;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

/// Repair, vet and apply untrusted patches on a disposable branch.
#[derive(Parser, Debug)]
#[command(
    name = "nova",
    version,
    about,
    // Show help when you forget a subcommand
    arg_required_else_help = true,
    propagate_version = true
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalOpts,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(ClapArgs, Debug, Default)]
pub(crate) struct GlobalOpts {
    /// Increase stderr verbosity (`-v` = info, `-vv` = debug); `RUST_LOG` wins when set
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// Emit the outcome as JSON to stdout
    #[arg(short = 'j', long, global = true)]
    pub(crate) json: bool,

    /// Config file to layer on top of the global and project config (JSON or TOML)
    #[arg(short = 'C', long = "config-file", global = true)]
    pub(crate) config_file: Option<PathBuf>,

    /// Repository to operate on; defaults to the one containing the current directory
    #[arg(long = "repo", value_name = "PATH", global = true)]
    pub(crate) repo: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Apply a patch as one commit on a fresh session branch
    ///
    /// Examples:
    ///   nova apply fix.diff
    ///   generate-fix | nova apply -
    Apply(ApplyCmd),

    /// Repair and evaluate a patch without touching the repository
    Review(ReviewCmd),

    /// Undo the most recent nova steps on the current branch
    ///
    /// Examples:
    ///   nova rollback                  # revert the last step
    ///   nova rollback --count 2 --hard # reset past the last two steps
    ///   nova rollback --backup --hard  # keep a backup branch first
    Rollback(RollbackCmd),

    /// Show branch state and the nova steps on HEAD
    Status,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct ApplyCmd {
    /// Patch file to apply; `-` reads from stdin
    #[arg(value_name = "PATCH")]
    pub(crate) patch: PathBuf,

    /// Commit message for the step instead of `nova: step <n>`
    #[arg(short = 'm', long = "message")]
    pub(crate) message: Option<String>,

    /// Context file used when the patch was generated; accepted and ignored
    #[arg(long = "context", value_name = "FILE")]
    pub(crate) context: Option<PathBuf>,

    /// Skip the duplicate-definition review
    #[arg(long = "no-critic")]
    pub(crate) no_critic: bool,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct ReviewCmd {
    /// Patch file to review; `-` reads from stdin
    #[arg(value_name = "PATCH")]
    pub(crate) patch: PathBuf,

    /// Skip the duplicate-definition review
    #[arg(long = "no-critic")]
    pub(crate) no_critic: bool,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct RollbackCmd {
    /// Reset the branch past the steps instead of adding revert commits
    #[arg(long = "hard")]
    pub(crate) hard: bool,

    /// How many steps to roll back
    #[arg(short = 'n', long = "count", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) count: u32,

    /// Create a backup branch at HEAD first, optionally with this name
    #[arg(long = "backup", value_name = "NAME", num_args = 0..=1)]
    pub(crate) backup: Option<Option<String>>,

    /// List the steps that would be rolled back and stop
    #[arg(long = "dry-run")]
    pub(crate) dry_run: bool,
}
