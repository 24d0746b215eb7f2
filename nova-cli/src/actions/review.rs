use std::sync::Arc;

use nova_core::{EngineError, PatchEngine, Review};
use nova_kernel::repair::RepairOptions;

use super::shared::{CommandContext, read_patch, warning_lines};
use crate::cli::args::ReviewCmd;
use crate::errors::{CliError, Exit};

pub(crate) fn run_review(ctx: &CommandContext, cmd: &ReviewCmd) -> Result<Exit, CliError> {
    let patch = read_patch(&cmd.patch)?;
    let engine = PatchEngine::from_config(&ctx.config, Arc::clone(&ctx.sink))?
        .with_repair_options(RepairOptions {
            detect_duplicates: !cmd.no_critic,
        });
    let review = engine
        .review(&ctx.repo_root, &patch)
        .map_err(EngineError::from)?;

    ctx.emit(&review, review_rows(&review))?;
    Ok(if review.report.is_safe {
        Exit::Success
    } else {
        Exit::Failure
    })
}

fn review_rows(review: &Review) -> Vec<(String, String)> {
    let stats = &review.report.stats;
    let verdict = if review.report.is_safe { "safe" } else { "unsafe" };
    vec![
        ("Verdict".to_string(), verdict.to_string()),
        (
            "Files".to_string(),
            stats.files_touched.iter().cloned().collect::<Vec<_>>().join("\n"),
        ),
        (
            "Lines".to_string(),
            format!("+{} -{}", stats.lines_added, stats.lines_removed),
        ),
        ("Warnings".to_string(), warning_lines(&review.warnings)),
        ("Violations".to_string(), review.report.violations.join("\n")),
    ]
}
