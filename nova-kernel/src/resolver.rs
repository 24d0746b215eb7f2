//! Maps the file paths a generated diff mentions onto paths that exist in
//! the repository.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::ports::FsPort;

const BUILD_CONFIG_FILES: &[&str] = &["pyproject.toml", "setup.cfg", "setup.py"];

static SRC_LAYOUT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // setuptools: [tool.setuptools.packages.find] where = ["src"]
        r#"where\s*=\s*\[\s*["']src["']\s*\]"#,
        // setup.py: package_dir={"": "src"}
        r#"package_dir\s*=\s*\{\s*["']{2}\s*:\s*["']src["']"#,
        // setup.cfg: package_dir =\n    = src
        r"package_dir\s*=\s*\n\s*=\s*src\b",
        // poetry/hatch: packages = [{ include = "pkg", from = "src" }]
        r#"from\s*=\s*["']src["']"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Verbatim,
    SrcPrefix,
    SrcLayoutPackage,
    StripDuplicateSrc,
    StripRepoName,
    Unresolved,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionStrategy::Verbatim => "verbatim",
            ResolutionStrategy::SrcPrefix => "src/ prefix",
            ResolutionStrategy::SrcLayoutPackage => "src-layout package",
            ResolutionStrategy::StripDuplicateSrc => "duplicate src/ stripped",
            ResolutionStrategy::StripRepoName => "repository name stripped",
            ResolutionStrategy::Unresolved => "unresolved",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub path: String,
    pub strategy: ResolutionStrategy,
}

impl Resolution {
    fn new(path: impl Into<String>, strategy: ResolutionStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.strategy != ResolutionStrategy::Unresolved
    }
}

/// Strip `a/`/`b/` labels, leading slashes and `./`, and use forward slashes.
pub fn normalize_diff_path(raw: &str) -> String {
    let mut path = raw.trim().replace('\\', "/");
    if let Some(rest) = path.strip_prefix("a/").or_else(|| path.strip_prefix("b/")) {
        path = rest.to_string();
    }
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest.to_string();
        } else {
            break;
        }
    }
    path
}

pub struct PathResolver<'a, F: FsPort> {
    fs: &'a F,
    repo_name: Option<String>,
    src_packages: BTreeSet<String>,
}

impl<'a, F: FsPort> PathResolver<'a, F> {
    /// `repo_name` is the repository directory's name, used to undo diffs
    /// that prefix every path with it.
    pub fn new(fs: &'a F, repo_name: Option<&str>) -> Self {
        let src_packages = if uses_src_layout(fs) {
            src_packages(fs)
        } else {
            BTreeSet::new()
        };
        Self {
            fs,
            repo_name: repo_name.map(str::to_string),
            src_packages,
        }
    }

    pub fn uses_src_layout(&self) -> bool {
        !self.src_packages.is_empty()
    }

    /// Resolve a path the diff expects to exist. The first candidate that
    /// exists wins; otherwise the normalized input comes back `Unresolved`.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let path = normalize_diff_path(raw);

        if self.is_file(&path) {
            return Resolution::new(path, ResolutionStrategy::Verbatim);
        }

        let prefixed = format!("src/{path}");
        if self.is_file(&prefixed) {
            return Resolution::new(prefixed, ResolutionStrategy::SrcPrefix);
        }

        if self.matches_src_package(&path) {
            return Resolution::new(prefixed, ResolutionStrategy::SrcLayoutPackage);
        }

        if let Some(rest) = path.strip_prefix("src/src/") {
            let candidate = format!("src/{rest}");
            if self.is_file(&candidate) {
                return Resolution::new(candidate, ResolutionStrategy::StripDuplicateSrc);
            }
        }

        if let Some(rest) = self.strip_repo_name(&path) {
            if self.is_file(rest) {
                return Resolution::new(rest, ResolutionStrategy::StripRepoName);
            }
            let prefixed = format!("src/{rest}");
            if self.is_file(&prefixed) {
                return Resolution::new(prefixed, ResolutionStrategy::StripRepoName);
            }
        }

        Resolution::new(path, ResolutionStrategy::Unresolved)
    }

    /// Resolve the destination of a created file. Nothing exists yet, so
    /// only the layout rules apply; anything else keeps its path.
    pub fn resolve_new(&self, raw: &str) -> Resolution {
        let path = normalize_diff_path(raw);

        if let Some(rest) = self.strip_repo_name(&path) {
            return Resolution::new(rest, ResolutionStrategy::StripRepoName);
        }
        if let Some(rest) = path.strip_prefix("src/src/") {
            return Resolution::new(format!("src/{rest}"), ResolutionStrategy::StripDuplicateSrc);
        }
        if self.matches_src_package(&path) {
            return Resolution::new(format!("src/{path}"), ResolutionStrategy::SrcLayoutPackage);
        }
        Resolution::new(path, ResolutionStrategy::Verbatim)
    }

    fn is_file(&self, path: &str) -> bool {
        let path = Path::new(path);
        matches!(self.fs.exists(path), Ok(true)) && matches!(self.fs.is_dir(path), Ok(false))
    }

    fn matches_src_package(&self, path: &str) -> bool {
        if path.starts_with("src/") {
            return false;
        }
        match path.split_once('/') {
            Some((head, _)) => self.src_packages.contains(head),
            None => false,
        }
    }

    fn strip_repo_name<'p>(&self, path: &'p str) -> Option<&'p str> {
        let name = self.repo_name.as_deref()?;
        let (head, rest) = path.split_once('/')?;
        if head == name && !rest.is_empty() && !self.fs.exists(Path::new(head)).unwrap_or(false) {
            Some(rest)
        } else {
            None
        }
    }
}

fn uses_src_layout<F: FsPort>(fs: &F) -> bool {
    BUILD_CONFIG_FILES.iter().any(|name| {
        let Ok(contents) = fs.read_to_string(Path::new(name)) else {
            return false;
        };
        SRC_LAYOUT_PATTERNS
            .iter()
            .any(|pattern| pattern.is_match(&contents))
    })
}

fn src_packages<F: FsPort>(fs: &F) -> BTreeSet<String> {
    let Ok(entries) = fs.list_dir(Path::new("src")) else {
        return BTreeSet::new();
    };
    entries
        .into_iter()
        .filter(|entry| fs.is_dir(entry).unwrap_or(false))
        .filter_map(|entry| {
            entry
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .filter(|name| !name.starts_with('.') && !name.ends_with(".egg-info"))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::io;
    use std::path::PathBuf;

    use super::*;

    /// In-memory tree: file path -> contents. Directories are implied.
    #[derive(Default)]
    pub(crate) struct MemFs {
        files: BTreeMap<String, String>,
    }

    impl MemFs {
        pub(crate) fn with(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(path, contents)| (path.to_string(), contents.to_string()))
                    .collect(),
            }
        }

        fn dir_exists(&self, dir: &str) -> bool {
            let prefix = format!("{dir}/");
            self.files.keys().any(|path| path.starts_with(&prefix))
        }
    }

    impl FsPort for MemFs {
        type Error = io::Error;

        fn read_to_string(&self, path: &Path) -> Result<String, Self::Error> {
            let key = path.to_string_lossy().to_string();
            self.files
                .get(&key)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, key))
        }

        fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error> {
            let dir = path.to_string_lossy().to_string();
            let prefix = format!("{dir}/");
            let entries: BTreeSet<String> = self
                .files
                .keys()
                .filter_map(|file| file.strip_prefix(&prefix))
                .filter_map(|rest| rest.split('/').next())
                .map(|name| format!("{prefix}{name}"))
                .collect();
            Ok(entries.into_iter().map(PathBuf::from).collect())
        }

        fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
            let key = path.to_string_lossy().to_string();
            Ok(self.files.contains_key(&key) || self.dir_exists(&key))
        }

        fn is_dir(&self, path: &Path) -> Result<bool, Self::Error> {
            Ok(self.dir_exists(&path.to_string_lossy()))
        }
    }

    #[test]
    fn normalizes_labels_and_leading_slashes() {
        assert_eq!(normalize_diff_path("a/src/x.py"), "src/x.py");
        assert_eq!(normalize_diff_path("/./pkg/mod.py"), "pkg/mod.py");
        assert_eq!(normalize_diff_path("pkg\\mod.py"), "pkg/mod.py");
    }

    #[test]
    fn prefers_verbatim_then_src_prefix() {
        let fs = MemFs::with(&[("app.py", ""), ("src/util.py", "")]);
        let resolver = PathResolver::new(&fs, None);

        let verbatim = resolver.resolve("app.py");
        assert_eq!(verbatim.strategy, ResolutionStrategy::Verbatim);

        let prefixed = resolver.resolve("util.py");
        assert_eq!(prefixed.path, "src/util.py");
        assert_eq!(prefixed.strategy, ResolutionStrategy::SrcPrefix);
    }

    #[test]
    fn maps_package_paths_in_src_layout_repos() {
        let fs = MemFs::with(&[
            (
                "pyproject.toml",
                "[tool.setuptools.packages.find]\nwhere = [\"src\"]\n",
            ),
            ("src/mypkg/__init__.py", ""),
        ]);
        let resolver = PathResolver::new(&fs, None);
        assert!(resolver.uses_src_layout());

        let resolution = resolver.resolve("mypkg/new_module.py");
        assert_eq!(resolution.path, "src/mypkg/new_module.py");
        assert_eq!(resolution.strategy, ResolutionStrategy::SrcLayoutPackage);
    }

    #[test]
    fn ignores_packages_without_layout_declaration() {
        let fs = MemFs::with(&[("src/mypkg/__init__.py", "")]);
        let resolver = PathResolver::new(&fs, None);
        assert!(!resolver.uses_src_layout());
        assert!(!resolver.resolve("mypkg/other.py").is_resolved());
    }

    #[test]
    fn strips_duplicate_src_and_repo_name() {
        let fs = MemFs::with(&[("src/core.py", ""), ("lib/io.py", "")]);
        let resolver = PathResolver::new(&fs, Some("widget"));

        let dup = resolver.resolve("src/src/core.py");
        assert_eq!(dup.path, "src/core.py");
        assert_eq!(dup.strategy, ResolutionStrategy::StripDuplicateSrc);

        let named = resolver.resolve("widget/lib/io.py");
        assert_eq!(named.path, "lib/io.py");
        assert_eq!(named.strategy, ResolutionStrategy::StripRepoName);
    }

    #[test]
    fn unresolved_paths_come_back_normalized() {
        let fs = MemFs::with(&[("app.py", "")]);
        let resolver = PathResolver::new(&fs, None);
        let resolution = resolver.resolve("b/missing.py");
        assert_eq!(resolution.path, "missing.py");
        assert!(!resolution.is_resolved());
    }

    #[test]
    fn new_files_keep_their_path_unless_a_layout_rule_applies() {
        let fs = MemFs::with(&[
            ("setup.py", "setup(package_dir={\"\": \"src\"})\n"),
            ("src/mypkg/__init__.py", ""),
        ]);
        let resolver = PathResolver::new(&fs, Some("widget"));
        assert_eq!(resolver.resolve_new("docs/notes.md").path, "docs/notes.md");
        assert_eq!(resolver.resolve_new("mypkg/extra.py").path, "src/mypkg/extra.py");
        assert_eq!(resolver.resolve_new("widget/docs/a.md").path, "docs/a.md");
    }
}
