use std::fmt;

use nova_kernel::config::ConfigError;
use nova_kernel::diff::DiffError;
use nova_kernel::policy::PolicyError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error("patch rejected by safety policy: {}", .0.join("; "))]
    SafetyViolation(Vec<String>),
    #[error("patch does not apply cleanly to {file}: {detail}")]
    PreflightMismatch { file: String, detail: String },
    #[error("applying patch failed: {0}")]
    ApplyFailed(String),
    #[error(
        "could not restore {original_head} after a failed session ({detail}); \
         inspect the repository and restore it manually"
    )]
    CleanupFailure {
        original_head: String,
        detail: String,
    },
    #[error("tracked files have uncommitted changes; commit or stash them first")]
    DirtyWorktree,
    #[error("repository has no commits yet")]
    UnbornHead,
    #[error("no applied patch steps to roll back")]
    NothingToRollback,
    #[error("{commit} is not an ancestor of HEAD; refusing to reset")]
    NotAncestor { commit: String },
    #[error("branch `{0}` already exists")]
    BranchExists(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("git: {0}")]
    Git(#[from] git2::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable labels for [`EngineError`] variants, used in audit records and
/// machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnresolvablePath,
    MalformedHunk,
    InvalidDiff,
    SafetyViolation,
    PreflightMismatch,
    ApplyFailed,
    CleanupFailure,
    DirtyWorktree,
    UnbornHead,
    NothingToRollback,
    NotAncestor,
    BranchExists,
    Config,
    Git,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnresolvablePath => "unresolvable_path",
            ErrorKind::MalformedHunk => "malformed_hunk",
            ErrorKind::InvalidDiff => "invalid_diff",
            ErrorKind::SafetyViolation => "safety_violation",
            ErrorKind::PreflightMismatch => "preflight_mismatch",
            ErrorKind::ApplyFailed => "apply_failed",
            ErrorKind::CleanupFailure => "cleanup_failure",
            ErrorKind::DirtyWorktree => "dirty_worktree",
            ErrorKind::UnbornHead => "unborn_head",
            ErrorKind::NothingToRollback => "nothing_to_rollback",
            ErrorKind::NotAncestor => "not_ancestor",
            ErrorKind::BranchExists => "branch_exists",
            ErrorKind::Config => "config",
            ErrorKind::Git => "git",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Diff(DiffError::UnresolvablePath { .. }) => ErrorKind::UnresolvablePath,
            EngineError::Diff(DiffError::MalformedHunk { .. }) => ErrorKind::MalformedHunk,
            EngineError::Diff(_) => ErrorKind::InvalidDiff,
            EngineError::SafetyViolation(_) => ErrorKind::SafetyViolation,
            EngineError::PreflightMismatch { .. } => ErrorKind::PreflightMismatch,
            EngineError::ApplyFailed(_) => ErrorKind::ApplyFailed,
            EngineError::CleanupFailure { .. } => ErrorKind::CleanupFailure,
            EngineError::DirtyWorktree => ErrorKind::DirtyWorktree,
            EngineError::UnbornHead => ErrorKind::UnbornHead,
            EngineError::NothingToRollback => ErrorKind::NothingToRollback,
            EngineError::NotAncestor { .. } => ErrorKind::NotAncestor,
            EngineError::BranchExists(_) => ErrorKind::BranchExists,
            EngineError::Config(_) | EngineError::Policy(_) => ErrorKind::Config,
            EngineError::Git(_) => ErrorKind::Git,
            EngineError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a calling loop may retry with a different patch.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::CleanupFailure)
    }
}
