use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use nova_core::EngineError;
use nova_core::audit::open_audit_sink;
use nova_core::config::{self, Config};
use nova_core::vcs;
use nova_kernel::ports::EventSink;
use nova_kernel::repair::RepairWarning;

use crate::cli::args::GlobalOpts;
use crate::errors::CliError;

/// Everything a command needs that does not depend on its own arguments.
pub(crate) struct CommandContext {
    pub(crate) repo_root: PathBuf,
    pub(crate) config: Config,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) json: bool,
}

impl CommandContext {
    pub(crate) fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let start = match &global.repo {
            Some(path) => path.clone(),
            None => std::env::current_dir().map_err(EngineError::from)?,
        };
        let repo_root = vcs::repo_root_in(&start).map_err(EngineError::from)?;
        let config = config::load_config(&repo_root, global.config_file.as_deref())?;
        let sink = open_audit_sink(&repo_root, &config.audit);
        Ok(Self {
            repo_root,
            config,
            sink,
            json: global.json,
        })
    }

    /// Print `value` as JSON when `--json` is set, otherwise the label/value block.
    pub(crate) fn emit<T: Serialize>(
        &self,
        value: &T,
        rows: Vec<(String, String)>,
    ) -> Result<(), CliError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let block = format_block(rows);
            if !block.is_empty() {
                println!("{block}");
            }
        }
        Ok(())
    }
}

/// Read a patch from `path`, or from stdin when `path` is `-`.
pub(crate) fn read_patch(path: &Path) -> Result<String, CliError> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| CliError::ReadPatch {
                origin: "stdin".to_string(),
                source,
            })?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|source| CliError::ReadPatch {
        origin: path.display().to_string(),
        source,
    })
}

/// Align labels into a column. Rows with empty values are skipped and
/// multi-line values continue under the value column.
pub(crate) fn format_block(rows: Vec<(String, String)>) -> String {
    let rows: Vec<(String, String)> = rows
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect();
    let width = rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (label, value) in &rows {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or_default();
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("{label:<width$}  {first}"));
        for line in lines {
            out.push('\n');
            out.push_str(&format!("{:width$}  {line}", ""));
        }
    }
    out
}

pub(crate) fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

pub(crate) fn warning_lines(warnings: &[RepairWarning]) -> String {
    warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(label: &str, value: &str) -> (String, String) {
        (label.to_string(), value.to_string())
    }

    #[test]
    fn block_aligns_labels_and_skips_empty_rows() {
        let block = format_block(vec![
            row("Outcome", "applied"),
            row("Reason", ""),
            row("Violations", "first\nsecond"),
        ]);
        assert_eq!(
            block,
            "Outcome     applied\nViolations  first\n            second"
        );
    }

    #[test]
    fn empty_rows_render_nothing() {
        assert_eq!(format_block(vec![row("Outcome", " ")]), "");
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash("0123456789abcdef"), "01234567");
    }
}
