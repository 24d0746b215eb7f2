use std::io;
use std::path::{Path, PathBuf};

use nova_kernel::ports::FsPort;

/// [`FsPort`] over a directory on disk. Paths handed in are relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name of the root, used to recognise repo-name-prefixed paths.
    pub fn root_name(&self) -> Option<&str> {
        self.root.file_name().and_then(|name| name.to_str())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FsPort for LocalFs {
    type Error = io::Error;

    fn read_to_string(&self, path: &Path) -> Result<String, Self::Error> {
        std::fs::read_to_string(self.resolve(path))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(self.resolve(path))? {
            entries.push(path.join(entry?.file_name()));
        }
        entries.sort();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
        self.resolve(path).try_exists()
    }

    fn is_dir(&self, path: &Path) -> Result<bool, Self::Error> {
        Ok(self.resolve(path).is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_relative_to_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/pkg")).unwrap();
        std::fs::write(dir.path().join("src/pkg/mod.py"), "x = 1\n").unwrap();

        let fs = LocalFs::new(dir.path());
        assert!(fs.exists(Path::new("src/pkg/mod.py")).unwrap());
        assert!(fs.is_dir(Path::new("src/pkg")).unwrap());
        assert_eq!(
            fs.list_dir(Path::new("src")).unwrap(),
            vec![PathBuf::from("src/pkg")]
        );
        assert_eq!(fs.read_to_string(Path::new("src/pkg/mod.py")).unwrap(), "x = 1\n");
        assert!(!fs.exists(Path::new("missing.py")).unwrap());
    }
}
