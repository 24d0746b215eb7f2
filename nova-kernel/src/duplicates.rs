//! Detects added function definitions that shadow an existing one in the
//! same file, a common defect when a generated patch re-inserts a function
//! instead of editing it in place.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::diff::{Diff, LineKind};
use crate::ports::FsPort;

static DEFINITION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // python
        r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(",
        // rust
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)",
        // javascript / typescript
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(",
        // go
        r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)\s*\(",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateDefinition {
    pub path: String,
    pub symbol: String,
    /// 1-based line of the existing definition in the on-disk file.
    pub existing_line: usize,
}

/// Name of the function a line defines, if any.
pub fn definition_name(line: &str) -> Option<&str> {
    DEFINITION_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|name| name.as_str())
    })
}

/// Flag every added definition whose name already exists in the current
/// file, unless the patch also removes a definition of that name somewhere.
/// Files that cannot be read are skipped.
pub fn find_duplicate_definitions<F: FsPort>(diff: &Diff, fs: &F) -> Vec<DuplicateDefinition> {
    let removed: BTreeSet<&str> = diff
        .files
        .iter()
        .flat_map(|file| &file.hunks)
        .flat_map(|hunk| &hunk.lines)
        .filter(|line| line.kind == LineKind::Removed)
        .filter_map(|line| definition_name(&line.text))
        .collect();

    let mut found = Vec::new();
    let mut seen = BTreeSet::new();
    for file in &diff.files {
        let (Some(old_path), Some(new_path)) = (&file.old_path, &file.new_path) else {
            continue;
        };
        let Ok(current) = fs.read_to_string(Path::new(old_path)) else {
            continue;
        };

        let added = file
            .hunks
            .iter()
            .flat_map(|hunk| &hunk.lines)
            .filter(|line| line.kind == LineKind::Added)
            .filter_map(|line| definition_name(&line.text));

        for symbol in added {
            if removed.contains(symbol) || !seen.insert((new_path.as_str(), symbol)) {
                continue;
            }
            let existing = current
                .lines()
                .position(|line| definition_name(line) == Some(symbol));
            if let Some(index) = existing {
                found.push(DuplicateDefinition {
                    path: new_path.clone(),
                    symbol: symbol.to_string(),
                    existing_line: index + 1,
                });
            }
        }
    }
    found
}
