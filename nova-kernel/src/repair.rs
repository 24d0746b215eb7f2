//! Turns a possibly malformed generated diff into one that is structurally
//! valid and whose paths point at real repository files.

use std::fmt;

use serde::Serialize;

use crate::diff::{Diff, DiffError, FileDiff, Hunk, strip_markdown_fences};
use crate::duplicates::{DuplicateDefinition, find_duplicate_definitions};
use crate::ports::FsPort;
use crate::resolver::{PathResolver, Resolution, ResolutionStrategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepairOptions {
    pub detect_duplicates: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            detect_duplicates: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairWarning {
    FencesStripped,
    ContextPrefixRestored {
        path: String,
        lines: usize,
    },
    HunkCountsRewritten {
        path: String,
        declared: (usize, usize),
        actual: (usize, usize),
    },
    PathResolved {
        from: String,
        to: String,
        strategy: ResolutionStrategy,
    },
    DuplicateDefinition(DuplicateDefinition),
}

impl fmt::Display for RepairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairWarning::FencesStripped => write!(f, "stripped markdown fences around the patch"),
            RepairWarning::ContextPrefixRestored { path, lines } => {
                write!(f, "{path}: restored missing context prefix on {lines} line(s)")
            }
            RepairWarning::HunkCountsRewritten {
                path,
                declared,
                actual,
            } => write!(
                f,
                "{path}: hunk counts -{} +{} rewritten to -{} +{}",
                declared.0, declared.1, actual.0, actual.1
            ),
            RepairWarning::PathResolved { from, to, strategy } => {
                write!(f, "{from} resolved to {to} ({strategy})")
            }
            RepairWarning::DuplicateDefinition(dup) => write!(
                f,
                "{}: adds `{}` which is already defined at line {}",
                dup.path, dup.symbol, dup.existing_line
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairOutcome {
    pub diff: Diff,
    /// Rendered repaired diff. Equal to the input text when nothing needed fixing.
    pub text: String,
    pub warnings: Vec<RepairWarning>,
}

impl RepairOutcome {
    pub fn duplicates(&self) -> Vec<&DuplicateDefinition> {
        self.warnings
            .iter()
            .filter_map(|warning| match warning {
                RepairWarning::DuplicateDefinition(dup) => Some(dup),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Rewrite every hunk whose declared counts disagree with its body.
/// Consistent hunks are returned untouched.
pub fn normalize_hunks(diff: &Diff) -> (Diff, Vec<RepairWarning>) {
    let mut warnings = Vec::new();
    let files = diff
        .files
        .iter()
        .map(|file| {
            let restored: usize = file.hunks.iter().map(Hunk::restored_prefixes).sum();
            if restored > 0 {
                warnings.push(RepairWarning::ContextPrefixRestored {
                    path: file.display_path().to_string(),
                    lines: restored,
                });
            }
            let hunks = file
                .hunks
                .iter()
                .map(|hunk| {
                    if hunk.is_consistent() {
                        return hunk.clone();
                    }
                    let actual = hunk.tally();
                    warnings.push(RepairWarning::HunkCountsRewritten {
                        path: file.display_path().to_string(),
                        declared: (hunk.old_count, hunk.new_count),
                        actual,
                    });
                    hunk.with_counts(actual.0, actual.1)
                })
                .collect();
            file.with_hunks(hunks)
        })
        .collect();
    (Diff::new(files), warnings)
}

pub struct DiffRepairer<'a, F: FsPort> {
    fs: &'a F,
    resolver: PathResolver<'a, F>,
    options: RepairOptions,
}

impl<'a, F: FsPort> DiffRepairer<'a, F> {
    pub fn new(fs: &'a F, repo_name: Option<&str>, options: RepairOptions) -> Self {
        Self {
            fs,
            resolver: PathResolver::new(fs, repo_name),
            options,
        }
    }

    /// Parse and repair `raw`. Fails on unparseable input and on a modified or
    /// deleted file whose path resolves to nothing in the repository.
    pub fn repair(&self, raw: &str) -> Result<RepairOutcome, DiffError> {
        let mut warnings = Vec::new();
        if matches!(strip_markdown_fences(raw), std::borrow::Cow::Owned(_)) {
            warnings.push(RepairWarning::FencesStripped);
        }

        let parsed = Diff::parse(raw)?;
        let (counted, count_warnings) = normalize_hunks(&parsed);
        warnings.extend(count_warnings);

        let mut files = Vec::with_capacity(counted.files.len());
        for file in &counted.files {
            files.push(self.resolve_file(file, &mut warnings)?);
        }
        let diff = Diff::new(files);

        if self.options.detect_duplicates {
            warnings.extend(
                find_duplicate_definitions(&diff, self.fs)
                    .into_iter()
                    .map(RepairWarning::DuplicateDefinition),
            );
        }

        let text = diff.render();
        Ok(RepairOutcome {
            diff,
            text,
            warnings,
        })
    }

    fn resolve_file(
        &self,
        file: &FileDiff,
        warnings: &mut Vec<RepairWarning>,
    ) -> Result<FileDiff, DiffError> {
        let old = match file.old_path.as_deref() {
            Some(path) => {
                let resolution = self.resolver.resolve(path);
                if !resolution.is_resolved() {
                    return Err(DiffError::UnresolvablePath {
                        path: path.to_string(),
                    });
                }
                Some(resolution)
            }
            None => None,
        };

        let new = match file.new_path.as_deref() {
            // a rename target or in-place edit follows wherever the old path went
            Some(path) if file.old_path.as_deref() == Some(path) => old.clone(),
            Some(path) => Some(self.resolver.resolve_new(path)),
            None => None,
        };

        let mut changed = false;
        for (original, resolution) in [
            (file.old_path.as_deref(), old.as_ref()),
            (file.new_path.as_deref(), new.as_ref()),
        ] {
            if let (Some(from), Some(resolution)) = (original, resolution)
                && resolution.path != from
            {
                changed = true;
                let warning = RepairWarning::PathResolved {
                    from: from.to_string(),
                    to: resolution.path.clone(),
                    strategy: resolution.strategy,
                };
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
        }

        if !changed {
            return Ok(file.clone());
        }
        Ok(file.with_paths(
            old.map(|resolution: Resolution| resolution.path),
            new.map(|resolution| resolution.path),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::MemFs;

    const CLEAN: &str = "\
diff --git a/app.py b/app.py
index 1111111..2222222 100644
--- a/app.py
+++ b/app.py
@@ -1,3 +1,3 @@ def main():
 def main():
-    print(\"hi\")
+    print(\"hello\")
     return 0
";

    fn app_fs() -> MemFs {
        MemFs::with(&[("app.py", "def main():\n    print(\"hi\")\n    return 0\n")])
    }

    #[test]
    fn clean_diff_is_left_alone() {
        let fs = app_fs();
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let outcome = repairer.repair(CLEAN).unwrap();
        assert_eq!(outcome.text, CLEAN);
        assert!(outcome.is_clean());
    }

    #[test]
    fn rewrites_wrong_hunk_counts() {
        let fs = app_fs();
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let broken = CLEAN.replace("@@ -1,3 +1,3 @@", "@@ -1,7 +1,9 @@");
        let outcome = repairer.repair(&broken).unwrap();

        let hunk = &outcome.diff.files[0].hunks[0];
        assert_eq!((hunk.old_count, hunk.new_count), (3, 3));
        assert!(outcome.text.contains("@@ -1,3 +1,3 @@ def main():\n"));
        assert_eq!(
            outcome.warnings,
            vec![RepairWarning::HunkCountsRewritten {
                path: "app.py".to_string(),
                declared: (7, 9),
                actual: (3, 3),
            }]
        );
        assert_eq!(
            outcome.warnings[0].to_string(),
            "app.py: hunk counts -7 +9 rewritten to -3 +3"
        );
    }

    #[test]
    fn restores_missing_context_prefix_without_touching_content() {
        let fs = app_fs();
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let broken = CLEAN.replace("\n def main():\n-", "\ndef main():\n-");
        let outcome = repairer.repair(&broken).unwrap();
        assert_eq!(outcome.text, CLEAN);
        assert!(outcome.warnings.contains(&RepairWarning::ContextPrefixRestored {
            path: "app.py".to_string(),
            lines: 1,
        }));
    }

    #[test]
    fn resolves_src_prefixed_paths() {
        let fs = MemFs::with(&[("src/app.py", "def main():\n    print(\"hi\")\n    return 0\n")]);
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let outcome = repairer.repair(CLEAN).unwrap();

        let file = &outcome.diff.files[0];
        assert_eq!(file.old_path.as_deref(), Some("src/app.py"));
        assert_eq!(file.new_path.as_deref(), Some("src/app.py"));
        assert!(outcome.text.starts_with("diff --git a/src/app.py b/src/app.py\n"));
        assert!(outcome.text.contains("--- a/src/app.py\n+++ b/src/app.py\n"));
    }

    #[test]
    fn unresolvable_modification_fails_loudly() {
        let fs = MemFs::with(&[]);
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let err = repairer.repair(CLEAN).unwrap_err();
        assert_eq!(
            err,
            DiffError::UnresolvablePath {
                path: "app.py".to_string()
            }
        );
    }

    #[test]
    fn created_files_never_need_to_exist() {
        let fs = MemFs::with(&[]);
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let outcome = repairer
            .repair("--- /dev/null\n+++ b/notes.md\n@@ -0,0 +1 @@\n+hello\n")
            .unwrap();
        assert!(outcome.diff.files[0].is_creation());
    }

    #[test]
    fn duplicate_detection_is_advisory_and_optional() {
        let fs = app_fs();
        let patch = "--- a/app.py\n+++ b/app.py\n@@ -3 +3,3 @@\n     return 0\n+def main():\n+    pass\n";

        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let outcome = repairer.repair(patch).unwrap();
        assert_eq!(outcome.duplicates().len(), 1);
        assert_eq!(outcome.duplicates()[0].symbol, "main");

        let quiet = DiffRepairer::new(
            &fs,
            None,
            RepairOptions {
                detect_duplicates: false,
            },
        );
        assert!(quiet.repair(patch).unwrap().duplicates().is_empty());
    }

    #[test]
    fn fenced_input_is_reported() {
        let fs = app_fs();
        let repairer = DiffRepairer::new(&fs, None, RepairOptions::default());
        let fenced = format!("```diff\n{CLEAN}```\n");
        let outcome = repairer.repair(&fenced).unwrap();
        assert_eq!(outcome.text, CLEAN);
        assert_eq!(outcome.warnings, vec![RepairWarning::FencesStripped]);
    }
}
