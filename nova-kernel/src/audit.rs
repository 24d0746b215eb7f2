//! Events describing engine decisions. Sinks decide where they go; the
//! kernel only fixes their shape.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const DIGEST_HEX_LEN: usize = 12;

/// Short stable fingerprint of a patch, used to correlate the repair,
/// evaluation and apply events that belong to the same submission.
pub fn patch_digest(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    digest[..DIGEST_HEX_LEN].to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    SessionBegan {
        original_head: String,
        original_branch: Option<String>,
        working_branch: String,
    },
    DiffRepaired {
        patch: String,
        files: Vec<String>,
        warnings: Vec<String>,
    },
    RepairRejected {
        patch: String,
        reason: String,
    },
    SafetyEvaluated {
        patch: String,
        is_safe: bool,
        violations: Vec<String>,
        lines_added: usize,
        lines_removed: usize,
        files_touched: Vec<String>,
    },
    ApplyAttempted {
        patch: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        step_number: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        commit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error_kind: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
    },
    RollbackPerformed {
        mode: String,
        commit: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
    },
    SessionFinalized {
        working_branch: String,
        success: bool,
        branch_kept: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        cleanup_error: Option<String>,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::SessionBegan { .. } => "session_began",
            AuditEvent::DiffRepaired { .. } => "diff_repaired",
            AuditEvent::RepairRejected { .. } => "repair_rejected",
            AuditEvent::SafetyEvaluated { .. } => "safety_evaluated",
            AuditEvent::ApplyAttempted { .. } => "apply_attempted",
            AuditEvent::RollbackPerformed { .. } => "rollback_performed",
            AuditEvent::SessionFinalized { .. } => "session_finalized",
        }
    }
}
