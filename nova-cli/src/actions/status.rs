use serde_json::json;

use nova_core::{EngineError, PatchHistory, vcs};

use super::shared::{CommandContext, short_hash};
use crate::errors::{CliError, Exit};

pub(crate) fn run_status(ctx: &CommandContext) -> Result<Exit, CliError> {
    let status = vcs::status_with_branch(&ctx.repo_root).map_err(EngineError::from)?;
    let history = PatchHistory::from_branch_in(&ctx.repo_root)?;

    if ctx.json {
        ctx.emit(
            &json!({
                "status": status.lines().collect::<Vec<_>>(),
                "steps": history.steps(),
            }),
            Vec::new(),
        )?;
        return Ok(Exit::Success);
    }

    println!("{}", status.trim_end());
    let steps = history
        .steps()
        .iter()
        .map(|step| {
            format!(
                "{}  {}  {}",
                step.step_number,
                short_hash(&step.commit_hash),
                step.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    ctx.emit(&(), vec![("Steps".to_string(), steps)])?;
    Ok(Exit::Success)
}
