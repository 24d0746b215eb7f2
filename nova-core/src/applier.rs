//! Applies a vetted diff to the session branch as exactly one commit.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use nova_kernel::audit::{AuditEvent, patch_digest};
use nova_kernel::diff::Diff;
use nova_kernel::ports::{EventSink, NullSink};

use crate::errors::{EngineError, ErrorKind};
use crate::history::{PatchStep, default_step_message};
use crate::session::BranchSession;
use crate::vcs;

/// Paths staged per index write.
pub const STAGE_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub success: bool,
    /// The new step; `None` on failure and on a no-op.
    pub step: Option<PatchStep>,
    pub error_kind: Option<ErrorKind>,
    /// Why the patch was not applied, or why nothing changed.
    pub reason: Option<String>,
}

impl ApplyResult {
    fn applied(step: PatchStep) -> Self {
        Self {
            success: true,
            step: Some(step),
            error_kind: None,
            reason: None,
        }
    }

    fn no_op(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            step: None,
            error_kind: None,
            reason: Some(reason.into()),
        }
    }

    fn failed(err: &EngineError) -> Self {
        Self {
            success: false,
            step: None,
            error_kind: Some(err.kind()),
            reason: Some(err.to_string()),
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.success && self.step.is_none()
    }
}

pub struct PatchApplier {
    sink: Arc<dyn EventSink>,
}

impl Default for PatchApplier {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl PatchApplier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Apply `diff` on the session branch. Every outcome comes back as an
    /// [`ApplyResult`]; the working tree is untouched when the preflight fails.
    pub fn apply(
        &self,
        session: &mut BranchSession,
        diff: &Diff,
        message: Option<&str>,
    ) -> ApplyResult {
        let digest = patch_digest(&diff.render());
        let result = match self.try_apply(session, diff, message) {
            Ok(Some(step)) => {
                tracing::info!(
                    step = step.step_number,
                    commit = %step.commit_hash,
                    files = step.changed_files.len(),
                    "committed patch step"
                );
                session.history.push(step.clone());
                ApplyResult::applied(step)
            }
            Ok(None) => {
                tracing::info!(patch = %digest, "patch is already applied; nothing to commit");
                ApplyResult::no_op("patch produces no changes against HEAD")
            }
            Err(err) => {
                tracing::warn!(patch = %digest, kind = %err.kind(), error = %err, "patch not applied");
                ApplyResult::failed(&err)
            }
        };

        self.sink.record(&AuditEvent::ApplyAttempted {
            patch: digest,
            success: result.success,
            step_number: result.step.as_ref().map(|step| step.step_number),
            commit: result.step.as_ref().map(|step| step.commit_hash.clone()),
            error_kind: result.error_kind.map(|kind| kind.to_string()),
            reason: result.reason.clone(),
        });
        result
    }

    fn try_apply(
        &self,
        session: &BranchSession,
        diff: &Diff,
        message: Option<&str>,
    ) -> Result<Option<PatchStep>, EngineError> {
        let root = session.repo_root.as_path();
        let patch = write_scratch_patch(&diff.render_git())?;

        if let Err(err) = vcs::check_patch_in(root, &patch) {
            if vcs::check_patch_in(root, diff.reversed().render_git().as_bytes()).is_ok() {
                return Ok(None);
            }
            return Err(diagnose_mismatch(root, diff, err));
        }

        vcs::apply_patch_to_workdir_in(root, &patch)
            .map_err(|err| EngineError::ApplyFailed(err.message().to_string()))?;

        let touched: Vec<String> = diff.touched_paths().into_iter().collect();
        for chunk in touched.chunks(STAGE_CHUNK_SIZE) {
            let paths: Vec<&str> = chunk.iter().map(String::as_str).collect();
            vcs::stage_paths_allow_missing_in(root, &paths).map_err(|err| {
                EngineError::ApplyFailed(format!("staging failed: {}", err.message()))
            })?;
        }

        if !vcs::has_staged_changes_in(root)? {
            return Ok(None);
        }

        let step_number = session.history.next_step_number();
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| default_step_message(step_number));
        let oid = vcs::commit_staged_in(root, &message)
            .map_err(|err| EngineError::ApplyFailed(format!("commit failed: {}", err.message())))?;

        Ok(Some(PatchStep {
            step_number,
            commit_hash: oid.to_string(),
            changed_files: touched,
            message,
        }))
    }
}

/// Round-trip the patch through a scratch file so libgit2 sees exactly the
/// bytes a `git apply` would. The file is removed when this returns.
fn write_scratch_patch(text: &str) -> Result<Vec<u8>, EngineError> {
    let mut scratch = tempfile::Builder::new()
        .prefix("nova-patch-")
        .suffix(".diff")
        .tempfile()?;
    scratch.write_all(text.as_bytes())?;
    scratch.flush()?;
    Ok(std::fs::read(scratch.path())?)
}

/// Name the first file whose hunks do not apply on their own.
fn diagnose_mismatch(root: &Path, diff: &Diff, whole: git2::Error) -> EngineError {
    for file in &diff.files {
        let single = Diff::new(vec![file.clone()]).render_git();
        if let Err(err) = vcs::check_patch_in(root, single.as_bytes()) {
            return EngineError::PreflightMismatch {
                file: file.display_path().to_string(),
                detail: err.message().to_string(),
            };
        }
    }
    EngineError::PreflightMismatch {
        file: diff
            .touched_paths()
            .into_iter()
            .next()
            .unwrap_or_default(),
        detail: whole.message().to_string(),
    }
}
