use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::errors::EngineError;
use crate::vcs;

const STEP_SUBJECT_PREFIX: &str = "nova: step ";
/// How far back `from_branch_in` looks for steps.
const HISTORY_SCAN_LIMIT: usize = 500;

pub fn default_step_message(step_number: usize) -> String {
    format!("{STEP_SUBJECT_PREFIX}{step_number}")
}

/// One committed patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchStep {
    pub step_number: usize,
    pub commit_hash: String,
    pub changed_files: Vec<String>,
    pub message: String,
}

/// Steps applied in the current session, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchHistory {
    steps: Vec<PatchStep>,
}

impl PatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PatchStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&PatchStep> {
        self.steps.last()
    }

    pub fn next_step_number(&self) -> usize {
        self.steps.len() + 1
    }

    pub(crate) fn push(&mut self, step: PatchStep) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) -> Option<PatchStep> {
        self.steps.pop()
    }

    /// Rebuild history from HEAD's first-parent log: every `nova: step <n>`
    /// commit that no later `Revert "..."` commit undid. The walk stops at the
    /// first commit that is neither a step nor a revert of one.
    pub fn from_branch_in<P: AsRef<Path>>(repo_path: P) -> Result<Self, EngineError> {
        let log = vcs::first_parent_log_in(repo_path, HISTORY_SCAN_LIMIT)?;

        let mut reverted = BTreeSet::new();
        let mut found = Vec::new();
        for commit in log {
            if let Some(target) = reverted_hash(&commit.message) {
                reverted.insert(target);
                continue;
            }
            if !commit.subject.starts_with(STEP_SUBJECT_PREFIX) {
                break;
            }
            let hash = commit.id.to_string();
            if reverted.remove(&hash) {
                continue;
            }
            found.push((hash, commit.files, commit.subject));
        }

        let steps = found
            .into_iter()
            .rev()
            .enumerate()
            .map(|(index, (commit_hash, changed_files, message))| PatchStep {
                step_number: index + 1,
                commit_hash,
                changed_files,
                message,
            })
            .collect();
        Ok(Self { steps })
    }
}

fn reverted_hash(message: &str) -> Option<String> {
    if !message.starts_with("Revert \"") {
        return None;
    }
    message.lines().find_map(|line| {
        line.trim()
            .strip_prefix("This reverts commit ")
            .map(|rest| rest.trim_end_matches('.').trim().to_string())
    })
}
