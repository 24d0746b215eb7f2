use std::io;
use std::process::ExitCode;

use nova_core::{EngineError, ErrorKind};

/// How a command ended, as the shell sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Exit {
    Success,
    /// Rejected patch, failed apply or rollback, bad input.
    Failure,
    /// Restoring the repository failed; a human has to look at it.
    CleanupFailure,
    Interrupted,
}

impl Exit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Failure => 1,
            Exit::CleanupFailure => 2,
            Exit::Interrupted => 130,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("could not read patch from {origin}: {source}")]
    ReadPatch { origin: String, source: io::Error },
    #[error("could not write output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub(crate) fn exit(&self) -> Exit {
        match self {
            CliError::Engine(err) if err.kind() == ErrorKind::CleanupFailure => Exit::CleanupFailure,
            _ => Exit::Failure,
        }
    }
}

impl From<nova_core::config::ConfigError> for CliError {
    fn from(err: nova_core::config::ConfigError) -> Self {
        CliError::Engine(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_failures_get_their_own_exit_code() {
        let err = CliError::from(EngineError::CleanupFailure {
            original_head: "abc".to_string(),
            detail: "locked".to_string(),
        });
        assert_eq!(err.exit(), Exit::CleanupFailure);
        assert_eq!(err.exit().code(), 2);
        assert_eq!(CliError::from(EngineError::DirtyWorktree).exit(), Exit::Failure);
        assert_eq!(Exit::Interrupted.code(), 130);
    }
}
