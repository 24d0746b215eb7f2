use std::sync::Arc;

use serde_json::json;

use nova_core::{BranchLifecycle, FinalizeReport, PatchEngine, SubmitOutcome};
use nova_kernel::repair::RepairOptions;

use super::shared::{CommandContext, read_patch, short_hash, warning_lines};
use crate::cli::args::ApplyCmd;
use crate::errors::{CliError, Exit};

/// Begin a session, submit the patch, and keep the branch only when a new
/// step was committed. Anything else puts the repository back as it was.
pub(crate) fn run_apply(ctx: &CommandContext, cmd: &ApplyCmd) -> Result<Exit, CliError> {
    if let Some(context) = &cmd.context {
        tracing::warn!(file = %context.display(), "--context only feeds patch generation; ignoring it");
    }
    let patch = read_patch(&cmd.patch)?;
    let engine = PatchEngine::from_config(&ctx.config, Arc::clone(&ctx.sink))?
        .with_repair_options(RepairOptions {
            detect_duplicates: !cmd.no_critic,
        });
    let lifecycle = BranchLifecycle::new(ctx.config.session.clone(), Arc::clone(&ctx.sink));

    let mut active = lifecycle.begin(&ctx.repo_root)?;
    let outcome = engine.submit(active.session_mut(), &patch, cmd.message.as_deref());
    let interrupted = active.is_interrupted();
    let committed = matches!(
        &outcome,
        SubmitOutcome::Applied { result, .. } if result.step.is_some()
    );
    let finalized = active.finalize(committed && !interrupted);

    ctx.emit(
        &json!({
            "outcome": &outcome,
            "session": finalized.as_ref().ok(),
            "interrupted": interrupted,
        }),
        apply_rows(&outcome, finalized.as_ref().ok(), interrupted),
    )?;

    finalized?;
    Ok(apply_exit(&outcome, interrupted))
}

/// An interrupt wins over whatever the submission produced.
fn apply_exit(outcome: &SubmitOutcome, interrupted: bool) -> Exit {
    if interrupted {
        Exit::Interrupted
    } else if outcome.is_success() {
        Exit::Success
    } else {
        Exit::Failure
    }
}

fn apply_rows(
    outcome: &SubmitOutcome,
    report: Option<&FinalizeReport>,
    interrupted: bool,
) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    let status = match outcome {
        _ if interrupted => "interrupted".to_string(),
        SubmitOutcome::RepairRejected { .. } => "rejected (unrepairable patch)".to_string(),
        SubmitOutcome::SafetyRejected { .. } => "rejected (safety policy)".to_string(),
        SubmitOutcome::Applied { result, .. } if result.step.is_some() => "applied".to_string(),
        SubmitOutcome::Applied { result, .. } if result.success => "no changes".to_string(),
        SubmitOutcome::Applied { result, .. } => match result.error_kind {
            Some(kind) => format!("failed ({kind})"),
            None => "failed".to_string(),
        },
    };
    rows.push(("Outcome".to_string(), status));

    if let Some(report) = report {
        let branch = if report.branch_kept {
            report.working_branch.clone()
        } else {
            format!("{} (removed)", report.working_branch)
        };
        rows.push(("Branch".to_string(), branch));
    }

    match outcome {
        SubmitOutcome::RepairRejected { reason, .. } => {
            rows.push(("Reason".to_string(), reason.clone()));
        }
        SubmitOutcome::SafetyRejected { review } => {
            rows.push(("Warnings".to_string(), warning_lines(&review.warnings)));
            rows.push(("Violations".to_string(), review.report.violations.join("\n")));
        }
        SubmitOutcome::Applied { review, result } => {
            if let Some(step) = &result.step {
                rows.push(("Step".to_string(), step.step_number.to_string()));
                rows.push(("Commit".to_string(), short_hash(&step.commit_hash).to_string()));
                rows.push(("Files".to_string(), step.changed_files.join("\n")));
            }
            rows.push(("Warnings".to_string(), warning_lines(&review.warnings)));
            rows.push((
                "Lines".to_string(),
                format!(
                    "+{} -{}",
                    review.report.stats.lines_added, review.report.stats.lines_removed
                ),
            ));
            if let Some(reason) = &result.reason {
                rows.push(("Reason".to_string(), reason.clone()));
            }
        }
    }
    rows
}
