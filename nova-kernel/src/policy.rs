//! Deterministic accept/reject gate over a diff. Evaluation never fails and
//! never has side effects; invalid rules are rejected when the policy is built.

use std::collections::BTreeSet;

use globset::{Glob, GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::Serialize;

use crate::config::SafetyPolicyConfig;
use crate::diff::Diff;
use crate::duplicates::DuplicateDefinition;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid denied path glob `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid denied path regex `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
struct GlobRule {
    pattern: String,
    matcher: GlobMatcher,
}

#[derive(Debug, Clone)]
struct RegexRule {
    pattern: String,
    regex: Regex,
}

/// Compiled, immutable form of [`SafetyPolicyConfig`].
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    pub max_lines_changed_total: usize,
    pub max_files_modified: usize,
    pub block_duplicate_definitions: bool,
    allowed_overrides: BTreeSet<String>,
    globs: Vec<GlobRule>,
    regexes: Vec<RegexRule>,
}

impl SafetyPolicy {
    pub fn from_config(config: &SafetyPolicyConfig) -> Result<Self, PolicyError> {
        let globs = config
            .denied_path_globs
            .iter()
            .map(|pattern| {
                compile_glob(pattern).map(|matcher| GlobRule {
                    pattern: pattern.clone(),
                    matcher,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let regexes = config
            .denied_path_regexes
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map(|regex| RegexRule {
                        pattern: pattern.clone(),
                        regex,
                    })
                    .map_err(|source| PolicyError::Regex {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_lines_changed_total: config.max_lines_changed_total,
            max_files_modified: config.max_files_modified,
            block_duplicate_definitions: config.block_duplicate_definitions,
            allowed_overrides: config
                .allowed_overrides
                .iter()
                .map(|path| normalize(path))
                .collect(),
            globs,
            regexes,
        })
    }

    pub fn is_overridden(&self, path: &str) -> bool {
        self.allowed_overrides.contains(&normalize(path))
    }

    /// The first denial rule `path` matches, globs before regexes.
    pub fn denial_rule(&self, path: &str) -> Option<&str> {
        let path = normalize(path);
        self.globs
            .iter()
            .find(|rule| rule.matcher.is_match(&path))
            .map(|rule| rule.pattern.as_str())
            .or_else(|| {
                self.regexes
                    .iter()
                    .find(|rule| rule.regex.is_match(&path))
                    .map(|rule| rule.pattern.as_str())
            })
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, PolicyError> {
    let glob: Glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| PolicyError::Glob {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(glob.compile_matcher())
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

fn escapes_repository(path: &str) -> bool {
    path.starts_with('/')
        || path.split('/').any(|segment| segment == "..")
        || path.as_bytes().get(1) == Some(&b':')
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SafetyStats {
    pub lines_added: usize,
    pub lines_removed: usize,
    pub files_touched: BTreeSet<String>,
}

impl SafetyStats {
    pub fn from_diff(diff: &Diff) -> Self {
        Self {
            lines_added: diff.lines_added(),
            lines_removed: diff.lines_removed(),
            files_touched: diff.touched_paths(),
        }
    }

    pub fn lines_changed(&self) -> usize {
        self.lines_added + self.lines_removed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    pub violations: Vec<String>,
    pub stats: SafetyStats,
}

/// Evaluate `diff` against `policy`. Violations come out in a fixed order:
/// denied paths (sorted by path), then total lines, then file count.
pub fn evaluate(diff: &Diff, policy: &SafetyPolicy) -> SafetyReport {
    evaluate_with_duplicates(diff, policy, &[])
}

/// Like [`evaluate`], and when the policy blocks duplicate definitions each
/// finding is appended as a final violation.
pub fn evaluate_with_duplicates(
    diff: &Diff,
    policy: &SafetyPolicy,
    duplicates: &[DuplicateDefinition],
) -> SafetyReport {
    let stats = SafetyStats::from_diff(diff);
    let mut violations = Vec::new();

    for path in &stats.files_touched {
        if escapes_repository(path) {
            violations.push(format!("{path}: path escapes the repository"));
            continue;
        }
        if policy.is_overridden(path) {
            continue;
        }
        if let Some(rule) = policy.denial_rule(path) {
            violations.push(format!("{path}: matches denied path rule `{rule}`"));
        }
    }

    let changed = stats.lines_changed();
    if changed > policy.max_lines_changed_total {
        violations.push(format!(
            "too many lines changed: {changed} > {} (max_lines_changed_total)",
            policy.max_lines_changed_total
        ));
    }

    let files = stats.files_touched.len();
    if files > policy.max_files_modified {
        violations.push(format!(
            "too many files modified: {files} > {} (max_files_modified)",
            policy.max_files_modified
        ));
    }

    if policy.block_duplicate_definitions {
        for dup in duplicates {
            violations.push(format!(
                "{}: duplicate definition of `{}` (already defined at line {})",
                dup.path, dup.symbol, dup.existing_line
            ));
        }
    }

    SafetyReport {
        is_safe: violations.is_empty(),
        violations,
        stats,
    }
}
