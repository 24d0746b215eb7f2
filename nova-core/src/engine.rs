//! Repair, evaluate and apply, in that order, for one submitted patch.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use nova_kernel::audit::{AuditEvent, patch_digest};
use nova_kernel::config::Config;
use nova_kernel::diff::DiffError;
use nova_kernel::duplicates::DuplicateDefinition;
use nova_kernel::policy::{SafetyPolicy, SafetyReport, evaluate_with_duplicates};
use nova_kernel::ports::{EventSink, NullSink};
use nova_kernel::repair::{DiffRepairer, RepairOptions, RepairOutcome, RepairWarning};

use crate::applier::{ApplyResult, PatchApplier};
use crate::errors::{EngineError, ErrorKind};
use crate::fs::LocalFs;
use crate::session::BranchSession;

/// What a patch looks like after repair, and what the policy makes of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    /// The repaired diff text.
    pub patch: String,
    pub warnings: Vec<RepairWarning>,
    pub report: SafetyReport,
}

impl Review {
    fn new(repair: &RepairOutcome, report: SafetyReport) -> Self {
        Self {
            patch: repair.text.clone(),
            warnings: repair.warnings.clone(),
            report,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    RepairRejected {
        error_kind: ErrorKind,
        reason: String,
    },
    SafetyRejected {
        review: Review,
    },
    Applied {
        review: Review,
        result: ApplyResult,
    },
}

impl SubmitOutcome {
    /// Applied, either as a new step or as a no-op.
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Applied { result, .. } if result.success)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            SubmitOutcome::RepairRejected { error_kind, .. } => Some(*error_kind),
            SubmitOutcome::SafetyRejected { .. } => Some(ErrorKind::SafetyViolation),
            SubmitOutcome::Applied { result, .. } => result.error_kind,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            SubmitOutcome::RepairRejected { reason, .. } => Some(reason.clone()),
            SubmitOutcome::SafetyRejected { review } => Some(review.report.violations.join("; ")),
            SubmitOutcome::Applied { result, .. } => result.reason.clone(),
        }
    }
}

pub struct PatchEngine {
    policy: SafetyPolicy,
    applier: PatchApplier,
    sink: Arc<dyn EventSink>,
    repair_options: RepairOptions,
}

impl PatchEngine {
    pub fn new(policy: SafetyPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            policy,
            applier: PatchApplier::new(Arc::clone(&sink)),
            sink,
            repair_options: RepairOptions::default(),
        }
    }

    pub fn from_config(config: &Config, sink: Arc<dyn EventSink>) -> Result<Self, EngineError> {
        Ok(Self::new(SafetyPolicy::from_config(&config.safety)?, sink))
    }

    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::from_config(&Config::default(), Arc::new(NullSink))
    }

    pub fn with_repair_options(mut self, options: RepairOptions) -> Self {
        self.repair_options = options;
        self
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Repair and evaluate `raw` against the tree at `repo_root` without
    /// touching the repository.
    pub fn review(&self, repo_root: &Path, raw: &str) -> Result<Review, DiffError> {
        let repair = self.repair(repo_root, raw)?;
        let report = self.evaluate(&repair);
        Ok(Review::new(&repair, report))
    }

    /// Repair, evaluate and, when the policy allows it, apply `raw` on the
    /// session branch.
    pub fn submit(
        &self,
        session: &mut BranchSession,
        raw: &str,
        message: Option<&str>,
    ) -> SubmitOutcome {
        let repair = match self.repair(&session.repo_root, raw) {
            Ok(repair) => repair,
            Err(err) => {
                let err = EngineError::from(err);
                return SubmitOutcome::RepairRejected {
                    error_kind: err.kind(),
                    reason: err.to_string(),
                };
            }
        };

        let report = self.evaluate(&repair);
        let review = Review::new(&repair, report);
        if !review.report.is_safe {
            tracing::warn!(violations = ?review.report.violations, "patch rejected by safety policy");
            return SubmitOutcome::SafetyRejected { review };
        }

        let result = self.applier.apply(session, &repair.diff, message);
        SubmitOutcome::Applied { review, result }
    }

    fn repair(&self, repo_root: &Path, raw: &str) -> Result<RepairOutcome, DiffError> {
        let fs = LocalFs::new(repo_root);
        let repairer = DiffRepairer::new(&fs, fs.root_name(), self.repair_options);
        match repairer.repair(raw) {
            Ok(outcome) => {
                tracing::debug!(
                    files = outcome.diff.files.len(),
                    warnings = outcome.warnings.len(),
                    "repaired patch"
                );
                for warning in &outcome.warnings {
                    tracing::info!(%warning, "repair");
                }
                self.sink.record(&AuditEvent::DiffRepaired {
                    patch: patch_digest(&outcome.text),
                    files: outcome.diff.touched_paths().into_iter().collect(),
                    warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
                });
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, "patch could not be repaired");
                self.sink.record(&AuditEvent::RepairRejected {
                    patch: patch_digest(raw),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn evaluate(&self, repair: &RepairOutcome) -> SafetyReport {
        let duplicates: Vec<DuplicateDefinition> =
            repair.duplicates().into_iter().cloned().collect();
        let report = evaluate_with_duplicates(&repair.diff, &self.policy, &duplicates);
        self.sink.record(&AuditEvent::SafetyEvaluated {
            patch: patch_digest(&repair.text),
            is_safe: report.is_safe,
            violations: report.violations.clone(),
            lines_added: report.stats.lines_added,
            lines_removed: report.stats.lines_removed,
            files_touched: report.stats.files_touched.iter().cloned().collect(),
        });
        report
    }
}
