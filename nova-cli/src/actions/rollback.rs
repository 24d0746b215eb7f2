use std::sync::Arc;

use serde_json::json;

use nova_core::{EngineError, PatchHistory, RollbackManager, RollbackResult, StepPreview};

use super::shared::{CommandContext, short_hash};
use crate::cli::args::RollbackCmd;
use crate::errors::{CliError, Exit};

/// Rebuild the step history from HEAD, then undo the newest `count` steps.
pub(crate) fn run_rollback(ctx: &CommandContext, cmd: &RollbackCmd) -> Result<Exit, CliError> {
    let count = cmd.count as usize;
    let mut history = PatchHistory::from_branch_in(&ctx.repo_root)?;
    let mut manager = RollbackManager::with_sink(&ctx.repo_root, &mut history, Arc::clone(&ctx.sink));

    let planned: Vec<StepPreview> = manager.preview()?.into_iter().take(count).collect();
    if planned.is_empty() {
        return Err(EngineError::NothingToRollback.into());
    }

    if cmd.dry_run {
        ctx.emit(&json!({ "planned": &planned }), vec![("Planned".to_string(), preview_lines(&planned))])?;
        return Ok(Exit::Success);
    }

    let backup = match &cmd.backup {
        Some(name) => Some(manager.create_backup_branch(name.as_deref())?),
        None => None,
    };
    let results = manager.rollback_many(count, !cmd.hard)?;
    let all_succeeded = results.iter().all(|result| result.success);

    ctx.emit(
        &json!({
            "backup_branch": &backup,
            "results": &results,
            "remaining_steps": manager.history().len(),
        }),
        vec![
            ("Backup".to_string(), backup.clone().unwrap_or_default()),
            ("Rolled back".to_string(), result_lines(&results)),
            ("Remaining".to_string(), manager.history().len().to_string()),
        ],
    )?;

    Ok(if all_succeeded {
        Exit::Success
    } else {
        Exit::Failure
    })
}

fn preview_lines(planned: &[StepPreview]) -> String {
    planned
        .iter()
        .map(|step| {
            format!(
                "{}  {}  ({})",
                short_hash(&step.hash),
                step.message.lines().next().unwrap_or_default(),
                step.files.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn result_lines(results: &[RollbackResult]) -> String {
    results
        .iter()
        .map(|result| {
            let status = if result.success {
                "ok".to_string()
            } else {
                format!("failed: {}", result.reason.as_deref().unwrap_or("unknown error"))
            };
            format!(
                "step {} {} via {}: {status}",
                result.step_number,
                short_hash(&result.commit_hash),
                result.mode
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
