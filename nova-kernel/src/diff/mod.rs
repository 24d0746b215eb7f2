//! In-memory unified diff model.
//!
//! A [`Diff`] is parsed once and never mutated in place; repair passes derive
//! new values from it. Rendering a parsed diff that nobody touched reproduces
//! the input text byte for byte, which is what makes `repair(d) == d` hold for
//! well-formed input.

use std::collections::BTreeSet;
use std::fmt;

mod parse;

pub use parse::{parse_diff, strip_markdown_fences};

pub const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("no file diffs found in patch text")]
    Empty,
    #[error("malformed hunk header in {path}: `{header}`")]
    MalformedHunk { path: String, header: String },
    #[error("hunk header `{header}` appears before any file header")]
    OrphanHunk { header: String },
    #[error("{path} does not resolve to a file in the repository")]
    UnresolvablePath { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Added,
    Removed,
    NoNewlineMarker,
}

impl LineKind {
    pub fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Removed => '-',
            LineKind::NoNewlineMarker => '\\',
        }
    }

    fn inverse(self) -> Self {
        match self {
            LineKind::Added => LineKind::Removed,
            LineKind::Removed => LineKind::Added,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    /// Line content without the leading marker character.
    pub text: String,
}

impl Line {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Trailing text after the closing `@@`, including its leading space.
    pub section: String,
    pub lines: Vec<Line>,
    /// Verbatim header line, kept while the counts are untouched.
    raw_header: Option<String>,
    /// Body lines that arrived without any marker and were read as context.
    restored_prefixes: usize,
}

impl Hunk {
    pub fn new(
        old_start: usize,
        old_count: usize,
        new_start: usize,
        new_count: usize,
        lines: Vec<Line>,
    ) -> Self {
        Self {
            old_start,
            old_count,
            new_start,
            new_count,
            section: String::new(),
            lines,
            raw_header: None,
            restored_prefixes: 0,
        }
    }

    /// Count the old/new lines the body actually describes.
    pub fn tally(&self) -> (usize, usize) {
        let mut old = 0usize;
        let mut new = 0usize;
        for line in &self.lines {
            match line.kind {
                LineKind::Context => {
                    old += 1;
                    new += 1;
                }
                LineKind::Removed => old += 1,
                LineKind::Added => new += 1,
                LineKind::NoNewlineMarker => {}
            }
        }
        (old, new)
    }

    pub fn is_consistent(&self) -> bool {
        self.tally() == (self.old_count, self.new_count)
    }

    pub fn restored_prefixes(&self) -> usize {
        self.restored_prefixes
    }

    /// Copy of this hunk with the header counts replaced.
    pub fn with_counts(&self, old_count: usize, new_count: usize) -> Self {
        Self {
            old_count,
            new_count,
            raw_header: None,
            ..self.clone()
        }
    }

    pub fn header(&self) -> String {
        if let Some(raw) = &self.raw_header {
            return raw.clone();
        }
        format!(
            "@@ -{} +{} @@{}",
            format_range(self.old_start, self.old_count),
            format_range(self.new_start, self.new_count),
            self.section
        )
    }

    fn reversed(&self) -> Self {
        Self {
            old_start: self.new_start,
            old_count: self.new_count,
            new_start: self.old_start,
            new_count: self.old_count,
            section: self.section.clone(),
            lines: self
                .lines
                .iter()
                .map(|line| Line::new(line.kind.inverse(), line.text.clone()))
                .collect(),
            raw_header: None,
            restored_prefixes: 0,
        }
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.header());
        out.push('\n');
        for line in &self.lines {
            out.push(line.kind.prefix());
            out.push_str(&line.text);
            out.push('\n');
        }
    }
}

fn format_range(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Repository-relative path before the change; `None` for a created file.
    pub old_path: Option<String>,
    /// Repository-relative path after the change; `None` for a deleted file.
    pub new_path: Option<String>,
    /// Lines between `diff --git` and `---` (`index`, mode, rename metadata).
    pub extended_headers: Vec<String>,
    pub hunks: Vec<Hunk>,
    git_header: Option<String>,
    old_header: Option<String>,
    new_header: Option<String>,
}

impl FileDiff {
    pub fn new(old_path: Option<String>, new_path: Option<String>, hunks: Vec<Hunk>) -> Self {
        Self {
            old_path,
            new_path,
            extended_headers: Vec::new(),
            hunks,
            git_header: None,
            old_header: None,
            new_header: None,
        }
    }

    /// The path a reader would call "the file": the new path unless it was deleted.
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or(DEV_NULL)
    }

    pub fn is_creation(&self) -> bool {
        self.old_path.is_none()
    }

    pub fn is_deletion(&self) -> bool {
        self.new_path.is_none()
    }

    /// Old and new paths, without `/dev/null` and without duplicates.
    pub fn touched_paths(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(2);
        for path in [self.old_path.as_deref(), self.new_path.as_deref()]
            .into_iter()
            .flatten()
        {
            if !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }

    /// Copy with new paths; the verbatim `diff --git`/`---`/`+++` lines are
    /// dropped so they get regenerated from the new paths.
    pub fn with_paths(&self, old_path: Option<String>, new_path: Option<String>) -> Self {
        Self {
            old_path,
            new_path,
            git_header: None,
            old_header: None,
            new_header: None,
            ..self.clone()
        }
    }

    pub fn with_hunks(&self, hunks: Vec<Hunk>) -> Self {
        Self {
            hunks,
            ..self.clone()
        }
    }

    fn old_label(&self) -> String {
        match &self.old_path {
            Some(path) => format!("a/{path}"),
            None => DEV_NULL.to_string(),
        }
    }

    fn new_label(&self) -> String {
        match &self.new_path {
            Some(path) => format!("b/{path}"),
            None => DEV_NULL.to_string(),
        }
    }

    fn git_header_line(&self) -> String {
        let old = self.old_path.as_deref().or(self.new_path.as_deref());
        let new = self.new_path.as_deref().or(self.old_path.as_deref());
        format!(
            "diff --git a/{} b/{}",
            old.unwrap_or_default(),
            new.unwrap_or_default()
        )
    }

    fn render_into(&self, out: &mut String) {
        if let Some(header) = &self.git_header {
            out.push_str(header);
            out.push('\n');
        } else if !self.extended_headers.is_empty() {
            out.push_str(&self.git_header_line());
            out.push('\n');
        }
        for line in &self.extended_headers {
            out.push_str(line);
            out.push('\n');
        }
        if self.hunks.is_empty() && self.old_header.is_none() && self.new_header.is_none() {
            return;
        }
        let old_header = self
            .old_header
            .clone()
            .unwrap_or_else(|| format!("--- {}", self.old_label()));
        let new_header = self
            .new_header
            .clone()
            .unwrap_or_else(|| format!("+++ {}", self.new_label()));
        out.push_str(&old_header);
        out.push('\n');
        out.push_str(&new_header);
        out.push('\n');
        for hunk in &self.hunks {
            hunk.render_into(out);
        }
    }

    /// Canonical git form: `a/`/`b/` labels, a `diff --git` line, and the mode
    /// lines libgit2 needs to recognise creations, deletions and renames.
    fn render_git_into(&self, out: &mut String) {
        out.push_str(&self.git_header_line());
        out.push('\n');

        let keep = |line: &str| {
            ["new file mode", "deleted file mode", "old mode", "new mode"]
                .iter()
                .any(|prefix| line.starts_with(prefix))
        };
        let mut kept: Vec<&str> = self
            .extended_headers
            .iter()
            .map(String::as_str)
            .filter(|line| keep(line))
            .collect();

        if self.is_creation() && !kept.iter().any(|l| l.starts_with("new file mode")) {
            kept.insert(0, "new file mode 100644");
        }
        if self.is_deletion() && !kept.iter().any(|l| l.starts_with("deleted file mode")) {
            kept.insert(0, "deleted file mode 100644");
        }
        for line in kept {
            out.push_str(line);
            out.push('\n');
        }
        if let (Some(old), Some(new)) = (&self.old_path, &self.new_path)
            && old != new
        {
            out.push_str(&format!("rename from {old}\nrename to {new}\n"));
        }

        if self.hunks.is_empty() {
            return;
        }
        out.push_str(&format!("--- {}\n+++ {}\n", self.old_label(), self.new_label()));
        for hunk in &self.hunks {
            hunk.render_into(out);
        }
    }

    fn reversed(&self) -> Self {
        let extended_headers = self
            .extended_headers
            .iter()
            .filter_map(|line| {
                if let Some(mode) = line.strip_prefix("new file mode ") {
                    Some(format!("deleted file mode {mode}"))
                } else {
                    line.strip_prefix("deleted file mode ")
                        .map(|mode| format!("new file mode {mode}"))
                }
            })
            .collect();

        Self {
            old_path: self.new_path.clone(),
            new_path: self.old_path.clone(),
            extended_headers,
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
            git_header: None,
            old_header: None,
            new_header: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diff {
    pub files: Vec<FileDiff>,
}

impl Diff {
    pub fn new(files: Vec<FileDiff>) -> Self {
        Self { files }
    }

    pub fn parse(text: &str) -> Result<Self, DiffError> {
        parse_diff(text)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            file.render_into(&mut out);
        }
        out
    }

    /// Render in the canonical form handed to libgit2.
    pub fn render_git(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            file.render_git_into(&mut out);
        }
        out
    }

    /// The inverse patch: applying it undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            files: self.files.iter().map(FileDiff::reversed).collect(),
        }
    }

    /// Union of every file's old and new path, `/dev/null` excluded.
    pub fn touched_paths(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|file| file.touched_paths())
            .map(|path| path.replace('\\', "/"))
            .collect()
    }

    pub fn lines_added(&self) -> usize {
        self.count_lines(LineKind::Added)
    }

    pub fn lines_removed(&self) -> usize {
        self.count_lines(LineKind::Removed)
    }

    fn count_lines(&self, kind: LineKind) -> usize {
        self.files
            .iter()
            .flat_map(|file| &file.hunks)
            .flat_map(|hunk| &hunk.lines)
            .filter(|line| line.kind == kind)
            .count()
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFY: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 83db48f..bf269f4 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@ fn main() {
 use std::fmt;
-use std::io;
+use std::io::{self, Read};
+use std::path::Path;
 fn main() {}
";

    #[test]
    fn untouched_diff_renders_verbatim() {
        let diff = Diff::parse(MODIFY).unwrap();
        assert_eq!(diff.render(), MODIFY);
    }

    #[test]
    fn tally_counts_context_toward_both_sides() {
        let diff = Diff::parse(MODIFY).unwrap();
        let hunk = &diff.files[0].hunks[0];
        assert_eq!(hunk.tally(), (3, 4));
        assert!(hunk.is_consistent());
    }

    #[test]
    fn with_counts_regenerates_header_and_keeps_section() {
        let diff = Diff::parse(MODIFY).unwrap();
        let hunk = diff.files[0].hunks[0].with_counts(7, 1);
        assert_eq!(hunk.header(), "@@ -1,7 +1 @@ fn main() {");
    }

    #[test]
    fn reversed_swaps_sides() {
        let diff = Diff::parse(MODIFY).unwrap();
        let reversed = diff.reversed();
        let hunk = &reversed.files[0].hunks[0];
        assert_eq!((hunk.old_count, hunk.new_count), (4, 3));
        assert_eq!(hunk.lines[1].kind, LineKind::Added);
        assert_eq!(hunk.lines[2].kind, LineKind::Removed);
        assert_eq!(reversed.reversed().files[0].hunks[0].lines, diff.files[0].hunks[0].lines);
    }

    #[test]
    fn git_rendering_adds_creation_metadata() {
        let text = "--- /dev/null\n+++ b/notes.txt\n@@ -0,0 +1,2 @@\n+one\n+two\n";
        let diff = Diff::parse(text).unwrap();
        let git = diff.render_git();
        assert!(git.starts_with("diff --git a/notes.txt b/notes.txt\nnew file mode 100644\n"));
        assert!(git.contains("--- /dev/null\n+++ b/notes.txt\n"));
    }

    #[test]
    fn touched_paths_skip_dev_null() {
        let text = "--- a/old.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-gone\n";
        let diff = Diff::parse(text).unwrap();
        let touched: Vec<String> = diff.touched_paths().into_iter().collect();
        assert_eq!(touched, vec!["old.txt".to_string()]);
        assert_eq!(diff.lines_removed(), 1);
        assert_eq!(diff.lines_added(), 0);
    }
}
