//! Undo committed patch steps, either by reverting them or by resetting the
//! session branch past them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Oid;
use serde::Serialize;

use nova_kernel::audit::AuditEvent;
use nova_kernel::ports::{EventSink, NullSink};

use crate::errors::{EngineError, ErrorKind};
use crate::history::{PatchHistory, PatchStep};
use crate::vcs::{self, RevertOutcome};

pub const BACKUP_BRANCH_PREFIX: &str = "nova-backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMode {
    /// New inverse commit; history is preserved.
    Revert,
    /// Move the branch to the step's parent; history is rewritten.
    HardReset,
}

impl RollbackMode {
    pub fn from_preserve_history(preserve_history: bool) -> Self {
        if preserve_history {
            RollbackMode::Revert
        } else {
            RollbackMode::HardReset
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RollbackMode::Revert => "revert",
            RollbackMode::HardReset => "hard_reset",
        }
    }
}

impl fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPreview {
    pub hash: String,
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    pub step_number: usize,
    pub commit_hash: String,
    pub mode: RollbackMode,
    pub success: bool,
    /// The revert commit, for a successful [`RollbackMode::Revert`].
    pub revert_commit: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub reason: Option<String>,
}

pub struct RollbackManager<'a> {
    repo_root: PathBuf,
    history: &'a mut PatchHistory,
    sink: Arc<dyn EventSink>,
}

impl<'a> RollbackManager<'a> {
    pub fn new(repo_root: impl Into<PathBuf>, history: &'a mut PatchHistory) -> Self {
        Self::with_sink(repo_root, history, Arc::new(NullSink))
    }

    pub fn with_sink(
        repo_root: impl Into<PathBuf>,
        history: &'a mut PatchHistory,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            history,
            sink,
        }
    }

    pub fn history(&self) -> &PatchHistory {
        self.history
    }

    /// Tracked steps, newest first, as they would be rolled back.
    pub fn preview(&self) -> Result<Vec<StepPreview>, EngineError> {
        self.history
            .steps()
            .iter()
            .rev()
            .map(|step| {
                let summary = vcs::commit_summary_in(&self.repo_root, Oid::from_str(&step.commit_hash)?)?;
                Ok(StepPreview {
                    hash: step.commit_hash.clone(),
                    message: summary.message.trim_end().to_string(),
                    files: summary.files,
                })
            })
            .collect()
    }

    /// Undo the most recent step. The step leaves the history only when the
    /// rollback succeeded; a failure comes back as an unsuccessful result.
    pub fn rollback_one(&mut self, preserve_history: bool) -> Result<RollbackResult, EngineError> {
        let step = self.history.last().cloned().ok_or(EngineError::NothingToRollback)?;
        let mode = RollbackMode::from_preserve_history(preserve_history);

        let outcome = self.ensure_clean().and_then(|()| match mode {
            RollbackMode::Revert => self.revert(&step).map(Some),
            RollbackMode::HardReset => self.reset_past(&step).map(|()| None),
        });

        let result = match outcome {
            Ok(revert_commit) => {
                self.history.pop();
                tracing::info!(step = step.step_number, commit = %step.commit_hash, mode = %mode, "rolled back step");
                RollbackResult {
                    step_number: step.step_number,
                    commit_hash: step.commit_hash.clone(),
                    mode,
                    success: true,
                    revert_commit,
                    error_kind: None,
                    reason: None,
                }
            }
            Err(err) => {
                tracing::warn!(step = step.step_number, commit = %step.commit_hash, mode = %mode, error = %err, "rollback failed");
                RollbackResult {
                    step_number: step.step_number,
                    commit_hash: step.commit_hash.clone(),
                    mode,
                    success: false,
                    revert_commit: None,
                    error_kind: Some(err.kind()),
                    reason: Some(err.to_string()),
                }
            }
        };

        self.sink.record(&AuditEvent::RollbackPerformed {
            mode: mode.to_string(),
            commit: step.commit_hash,
            success: result.success,
            reason: result.reason.clone(),
        });
        Ok(result)
    }

    /// Roll back up to `count` steps, newest first, stopping after the first
    /// failed attempt. Every attempt is in the returned list.
    pub fn rollback_many(
        &mut self,
        count: usize,
        preserve_history: bool,
    ) -> Result<Vec<RollbackResult>, EngineError> {
        if self.history.is_empty() {
            return Err(EngineError::NothingToRollback);
        }

        let mut results = Vec::new();
        for _ in 0..count {
            if self.history.is_empty() {
                break;
            }
            let result = self.rollback_one(preserve_history)?;
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }
        Ok(results)
    }

    /// Point a new branch at HEAD before a risky rollback. Without a name the
    /// branch is `nova-backup/<timestamp>`.
    pub fn create_backup_branch(&self, name: Option<&str>) -> Result<String, EngineError> {
        create_backup_branch_in(&self.repo_root, name)
    }

    /// Both modes rewrite the working tree, so uncommitted edits to tracked
    /// files must not be present.
    fn ensure_clean(&self) -> Result<(), EngineError> {
        if vcs::has_tracked_changes_in(&self.repo_root)? {
            return Err(EngineError::DirtyWorktree);
        }
        Ok(())
    }

    fn revert(&self, step: &PatchStep) -> Result<String, EngineError> {
        let target = Oid::from_str(&step.commit_hash)?;
        let summary = vcs::commit_summary_in(&self.repo_root, target)?;
        let message = revert_message(&summary.subject, &step.commit_hash);
        match vcs::revert_commit_in(&self.repo_root, target, &message)? {
            RevertOutcome::Committed(oid) => Ok(oid.to_string()),
            RevertOutcome::Conflicted(files) => Err(EngineError::ApplyFailed(format!(
                "revert of {} conflicts in {}",
                short(&step.commit_hash),
                files.join(", ")
            ))),
        }
    }

    fn reset_past(&self, step: &PatchStep) -> Result<(), EngineError> {
        let target = Oid::from_str(&step.commit_hash)?;
        let head = vcs::head_oid_in(&self.repo_root)?.ok_or(EngineError::UnbornHead)?;
        if !vcs::is_ancestor_in(&self.repo_root, target, head)? {
            return Err(EngineError::NotAncestor {
                commit: step.commit_hash.clone(),
            });
        }
        let parent = vcs::commit_summary_in(&self.repo_root, target)?
            .parent
            .ok_or_else(|| EngineError::NotAncestor {
                commit: format!("parent of {}", step.commit_hash),
            })?;
        vcs::reset_hard_in(&self.repo_root, parent)?;
        Ok(())
    }
}

pub fn create_backup_branch_in(repo_root: &Path, name: Option<&str>) -> Result<String, EngineError> {
    let name = match name {
        Some(name) => name.to_string(),
        None => format!(
            "{BACKUP_BRANCH_PREFIX}/{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ),
    };
    if vcs::branch_exists_in(repo_root, &name)? {
        return Err(EngineError::BranchExists(name));
    }
    let head = vcs::head_oid_in(repo_root)?.ok_or(EngineError::UnbornHead)?;
    vcs::create_branch_at_in(repo_root, &name, head)?;
    tracing::info!(branch = %name, head = %head, "created backup branch");
    Ok(name)
}

fn revert_message(subject: &str, hash: &str) -> String {
    format!("Revert \"{subject}\"\n\nThis reverts commit {hash}.\n")
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::default_step_message;
    use crate::vcs::tests::TestRepo;
    use nova_kernel::ports::MemorySink;

    fn history_of(repo: &TestRepo, edits: &[&str]) -> PatchHistory {
        let mut history = PatchHistory::new();
        for (index, contents) in edits.iter().enumerate() {
            repo.write("a.txt", contents);
            let message = default_step_message(index + 1);
            let oid = repo.commit_all(&message);
            history.push(PatchStep {
                step_number: index + 1,
                commit_hash: oid.to_string(),
                changed_files: vec!["a.txt".to_string()],
                message,
            });
        }
        history
    }

    #[test]
    fn preview_lists_newest_first_without_mutating() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = history_of(&repo, &["1\n", "2\n"]);
        let head = repo.head();
        let manager = RollbackManager::new(repo.path(), &mut history);

        let preview = manager.preview().unwrap();
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].message, "nova: step 2");
        assert_eq!(preview[0].files, vec!["a.txt".to_string()]);
        assert_eq!(repo.head(), head);
        assert_eq!(manager.history().len(), 2);
    }

    #[test]
    fn revert_keeps_history_and_adds_inverse_commit() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = history_of(&repo, &["1\n", "2\n"]);
        let reverted = history.last().unwrap().commit_hash.clone();
        let sink = Arc::new(MemorySink::new());
        let mut manager = RollbackManager::with_sink(repo.path(), &mut history, sink.clone());

        let result = manager.rollback_one(true).unwrap();
        assert!(result.success);
        assert_eq!(result.step_number, 2);
        assert_eq!(repo.read("a.txt"), "1\n");
        assert_eq!(repo.head_subject(), "Revert \"nova: step 2\"");
        assert_eq!(result.revert_commit, Some(repo.head().to_string()));
        assert_eq!(manager.history().len(), 1);
        assert!(
            vcs::commit_summary_in(repo.path(), repo.head())
                .unwrap()
                .message
                .contains(&format!("This reverts commit {reverted}."))
        );
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn hard_reset_moves_branch_to_parent() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = history_of(&repo, &["1\n", "2\n"]);
        let first = history.steps()[0].commit_hash.clone();
        let mut manager = RollbackManager::new(repo.path(), &mut history);

        let result = manager.rollback_one(false).unwrap();
        assert!(result.success);
        assert_eq!(result.mode, RollbackMode::HardReset);
        assert_eq!(repo.head().to_string(), first);
        assert_eq!(repo.read("a.txt"), "1\n");
    }

    #[test]
    fn hard_reset_refuses_commits_off_the_branch() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = history_of(&repo, &["1\n"]);
        let step_head = repo.head();
        let original = vcs::commit_summary_in(repo.path(), step_head).unwrap().parent.unwrap();
        vcs::reset_hard_in(repo.path(), original).unwrap();

        let mut manager = RollbackManager::new(repo.path(), &mut history);
        let result = manager.rollback_one(false).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NotAncestor));
        assert_eq!(manager.history().len(), 1);
    }

    #[test]
    fn rollback_many_stops_at_first_failure() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = history_of(&repo, &["1\n", "2\n"]);
        // An edit outside the tracked steps, on the same line, makes reverting step 2 conflict.
        repo.write("a.txt", "hand edit\n");
        repo.commit_all("manual");

        let mut manager = RollbackManager::new(repo.path(), &mut history);
        let results = manager.rollback_many(2, true).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].step_number, 2);
        assert_eq!(results[0].error_kind, Some(ErrorKind::ApplyFailed));
        assert_eq!(manager.history().len(), 2);
        assert_eq!(repo.read("a.txt"), "hand edit\n");
        assert_eq!(repo.head_subject(), "manual");
    }

    #[test]
    fn uncommitted_edits_block_rollback() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n"), ("notes.txt", "draft\n")]);
        let mut history = history_of(&repo, &["1\n"]);
        let head = repo.head();
        repo.write("notes.txt", "important unsaved work\n");

        let mut manager = RollbackManager::new(repo.path(), &mut history);
        for preserve_history in [true, false] {
            let result = manager.rollback_one(preserve_history).unwrap();
            assert!(!result.success);
            assert_eq!(result.error_kind, Some(ErrorKind::DirtyWorktree));
        }
        assert_eq!(manager.history().len(), 1);
        assert_eq!(repo.head(), head);
        assert_eq!(repo.read("a.txt"), "1\n");
        assert_eq!(repo.read("notes.txt"), "important unsaved work\n");
    }

    #[test]
    fn empty_history_has_nothing_to_roll_back() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = PatchHistory::new();
        let mut manager = RollbackManager::new(repo.path(), &mut history);
        assert!(matches!(manager.rollback_one(true), Err(EngineError::NothingToRollback)));
        assert!(matches!(manager.rollback_many(3, false), Err(EngineError::NothingToRollback)));
    }

    #[test]
    fn backup_branch_names_must_be_free() {
        let repo = TestRepo::with_files(&[("a.txt", "0\n")]);
        let mut history = PatchHistory::new();
        let manager = RollbackManager::new(repo.path(), &mut history);

        let named = manager.create_backup_branch(Some("keep-me")).unwrap();
        assert_eq!(named, "keep-me");
        assert!(matches!(
            manager.create_backup_branch(Some("keep-me")),
            Err(EngineError::BranchExists(_))
        ));
        let generated = manager.create_backup_branch(None).unwrap();
        assert!(generated.starts_with("nova-backup/"));
    }
}
