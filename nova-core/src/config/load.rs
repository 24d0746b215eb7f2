use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::*;

const PROJECT_DIR: &str = ".nova";
const CONFIG_DIR_ENV: &str = "NOVA_CONFIG_DIR";
const CONFIG_FILE_ENV: &str = "NOVA_CONFIG_FILE";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        }
    }
}

/// Build the effective config for `repo_root`.
///
/// Layers, lowest precedence first: built-in defaults, the user-global file,
/// the repository's `.nova/config.{toml,json}`, then `explicit` (the CLI
/// `--config-file`) or, when absent, `$NOVA_CONFIG_FILE`.
pub fn load_config(repo_root: &Path, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut layers = Vec::new();

    if let Some(global) = global_config_path().filter(|path| path.is_file()) {
        layers.push(load_config_layer_from_path(&global)?);
    }
    if let Some(project) = project_config_path(repo_root) {
        layers.push(load_config_layer_from_path(&project)?);
    }
    if let Some(path) = explicit.map(Path::to_path_buf).or_else(env_config_path) {
        layers.push(load_config_layer_from_path(&path)?);
    }

    Ok(Config::from_layers(&layers))
}

pub fn load_config_layer_from_path<P: AsRef<Path>>(path: P) -> Result<ConfigLayer, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_layer_from_str(&contents, FileFormat::for_path(path), path)
}

/// Parse one layer. `origin` only labels errors.
pub fn load_config_layer_from_str(
    contents: &str,
    format: FileFormat,
    origin: &Path,
) -> Result<ConfigLayer, ConfigError> {
    let value: Value = match format {
        FileFormat::Json => serde_json::from_str(contents).map_err(|source| ConfigError::Json {
            path: origin.to_path_buf(),
            source,
        })?,
        FileFormat::Toml => toml::from_str(contents).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source,
        })?,
    };
    LayerParser { origin }.parse(&value)
}

struct LayerParser<'a> {
    origin: &'a Path,
}

impl LayerParser<'_> {
    fn parse(&self, value: &Value) -> Result<ConfigLayer, ConfigError> {
        let root = self.table(value, "")?;
        let mut layer = ConfigLayer::default();

        for (key, section) in root {
            match key.as_str() {
                "safety" => self.parse_safety(section, &mut layer.safety)?,
                "session" => self.parse_session(section, &mut layer.session)?,
                "audit" => self.parse_audit(section, &mut layer.audit)?,
                other => return Err(self.unknown(other)),
            }
        }
        Ok(layer)
    }

    fn parse_safety(&self, value: &Value, layer: &mut SafetyLayer) -> Result<(), ConfigError> {
        for (key, entry) in self.table(value, "safety")? {
            let full = format!("safety.{key}");
            match key.as_str() {
                "max_lines_changed_total" => {
                    layer.max_lines_changed_total = Some(self.usize(entry, &full)?)
                }
                "max_files_modified" => layer.max_files_modified = Some(self.usize(entry, &full)?),
                "denied_path_globs" => {
                    layer.denied_path_globs = Some(ListLayer::Replace(self.strings(entry, &full)?))
                }
                "extra_denied_path_globs" => {
                    layer.denied_path_globs = Some(ListLayer::Extend(self.strings(entry, &full)?))
                }
                "denied_path_regexes" => {
                    layer.denied_path_regexes =
                        Some(ListLayer::Replace(self.strings(entry, &full)?))
                }
                "extra_denied_path_regexes" => {
                    layer.denied_path_regexes =
                        Some(ListLayer::Extend(self.strings(entry, &full)?))
                }
                "allowed_overrides" => {
                    layer.allowed_overrides = Some(ListLayer::Replace(self.strings(entry, &full)?))
                }
                "extra_allowed_overrides" => {
                    layer.allowed_overrides = Some(ListLayer::Extend(self.strings(entry, &full)?))
                }
                "block_duplicate_definitions" => {
                    layer.block_duplicate_definitions = Some(self.bool(entry, &full)?)
                }
                _ => return Err(self.unknown(&full)),
            }
        }
        Ok(())
    }

    fn parse_session(&self, value: &Value, layer: &mut SessionLayer) -> Result<(), ConfigError> {
        for (key, entry) in self.table(value, "session")? {
            let full = format!("session.{key}");
            match key.as_str() {
                "branch_prefix" => {
                    let prefix = self.string(entry, &full)?;
                    let prefix = prefix.trim().trim_end_matches('/');
                    if prefix.is_empty() {
                        return Err(self.invalid(&full, "must not be empty"));
                    }
                    layer.branch_prefix = Some(prefix.to_string());
                }
                "allow_dirty" => layer.allow_dirty = Some(self.bool(entry, &full)?),
                _ => return Err(self.unknown(&full)),
            }
        }
        Ok(())
    }

    fn parse_audit(&self, value: &Value, layer: &mut AuditLayer) -> Result<(), ConfigError> {
        for (key, entry) in self.table(value, "audit")? {
            let full = format!("audit.{key}");
            match key.as_str() {
                "enabled" => layer.enabled = Some(self.bool(entry, &full)?),
                "path" => layer.path = Some(PathBuf::from(self.string(entry, &full)?)),
                _ => return Err(self.unknown(&full)),
            }
        }
        Ok(())
    }

    fn table<'v>(&self, value: &'v Value, key: &str) -> Result<&'v Map<String, Value>, ConfigError> {
        value
            .as_object()
            .ok_or_else(|| self.invalid(if key.is_empty() { "<root>" } else { key }, "expected a table"))
    }

    fn usize(&self, value: &Value, key: &str) -> Result<usize, ConfigError> {
        value
            .as_u64()
            .and_then(|num| usize::try_from(num).ok())
            .ok_or_else(|| self.invalid(key, "expected a non-negative integer"))
    }

    fn bool(&self, value: &Value, key: &str) -> Result<bool, ConfigError> {
        value
            .as_bool()
            .ok_or_else(|| self.invalid(key, "expected true or false"))
    }

    fn string<'v>(&self, value: &'v Value, key: &str) -> Result<&'v str, ConfigError> {
        value
            .as_str()
            .ok_or_else(|| self.invalid(key, "expected a string"))
    }

    fn strings(&self, value: &Value, key: &str) -> Result<BTreeSet<String>, ConfigError> {
        let array = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "expected an array of strings"))?;
        let mut out = BTreeSet::new();
        for entry in array {
            let text = self.string(entry, key)?.trim();
            if !text.is_empty() {
                out.insert(text.to_string());
            }
        }
        Ok(out)
    }

    fn invalid(&self, key: &str, message: &str) -> ConfigError {
        ConfigError::InvalidValue {
            path: self.origin.to_path_buf(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    fn unknown(&self, key: &str) -> ConfigError {
        ConfigError::UnknownKey {
            path: self.origin.to_path_buf(),
            key: key.to_string(),
        }
    }
}

/// Returns the repo-local config path if `.nova/config.toml` or `.nova/config.json` exists.
pub fn project_config_path(project_root: &Path) -> Option<PathBuf> {
    let dir = project_root.join(PROJECT_DIR);
    ["config.toml", "config.json"]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Returns the user-global config path (`~/.config/nova/config.toml` on Unix).
pub fn global_config_path() -> Option<PathBuf> {
    Some(base_config_dir()?.join("nova").join("config.toml"))
}

/// Returns the config path provided via `NOVA_CONFIG_FILE`, ignoring blank values.
pub fn env_config_path() -> Option<PathBuf> {
    non_blank_env(CONFIG_FILE_ENV).map(PathBuf::from)
}

pub fn base_config_dir() -> Option<PathBuf> {
    non_blank_env(CONFIG_DIR_ENV)
        .or_else(|| non_blank_env("XDG_CONFIG_HOME"))
        .or_else(|| non_blank_env("APPDATA"))
        .map(PathBuf::from)
        .or_else(|| non_blank_env("HOME").map(|home| PathBuf::from(home).join(".config")))
        .or_else(|| {
            non_blank_env("USERPROFILE")
                .map(|profile| PathBuf::from(profile).join("AppData").join("Roaming"))
        })
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config_lock;

    fn parse_toml(text: &str) -> Result<ConfigLayer, ConfigError> {
        load_config_layer_from_str(text, FileFormat::Toml, Path::new("test.toml"))
    }

    #[test]
    fn parses_every_section_from_toml() {
        let layer = parse_toml(
            r#"
[safety]
max_lines_changed_total = 120
extra_denied_path_globs = ["vendor/**"]
block_duplicate_definitions = true

[session]
branch_prefix = "bot/"
allow_dirty = true

[audit]
enabled = false
path = "logs/nova.jsonl"
"#,
        )
        .unwrap();

        assert_eq!(layer.safety.max_lines_changed_total, Some(120));
        assert_eq!(
            layer.safety.denied_path_globs,
            Some(ListLayer::Extend(["vendor/**".to_string()].into_iter().collect()))
        );
        assert_eq!(layer.safety.block_duplicate_definitions, Some(true));
        assert_eq!(layer.session.branch_prefix.as_deref(), Some("bot"));
        assert_eq!(layer.session.allow_dirty, Some(true));
        assert_eq!(layer.audit.enabled, Some(false));
        assert_eq!(layer.audit.path, Some(PathBuf::from("logs/nova.jsonl")));
    }

    #[test]
    fn parses_json_layers() {
        let layer = load_config_layer_from_str(
            r#"{"safety": {"max_files_modified": 3, "allowed_overrides": []}}"#,
            FileFormat::Json,
            Path::new("test.json"),
        )
        .unwrap();
        assert_eq!(layer.safety.max_files_modified, Some(3));
        assert_eq!(
            layer.safety.allowed_overrides,
            Some(ListLayer::Replace(BTreeSet::new()))
        );
    }

    #[test]
    fn rejects_unknown_keys_and_bad_types() {
        assert!(matches!(
            parse_toml("[safety]\nmax_lines = 5\n"),
            Err(ConfigError::UnknownKey { ref key, .. }) if key == "safety.max_lines"
        ));
        assert!(matches!(
            parse_toml("[safety]\nmax_files_modified = -1\n"),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "safety.max_files_modified"
        ));
        assert!(matches!(
            parse_toml("[session]\nbranch_prefix = \"  \"\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn project_layer_overrides_defaults_and_explicit_file_wins() {
        let _guard = test_config_lock().lock().unwrap_or_else(|e| e.into_inner());
        let repo = tempfile::TempDir::new().unwrap();
        let config_home = tempfile::TempDir::new().unwrap();
        unsafe {
            std::env::set_var(CONFIG_DIR_ENV, config_home.path());
            std::env::remove_var(CONFIG_FILE_ENV);
        }

        std::fs::create_dir_all(repo.path().join(".nova")).unwrap();
        std::fs::write(
            repo.path().join(".nova/config.toml"),
            "[safety]\nmax_lines_changed_total = 50\nmax_files_modified = 4\n",
        )
        .unwrap();
        let explicit = repo.path().join("strict.json");
        std::fs::write(&explicit, r#"{"safety": {"max_lines_changed_total": 10}}"#).unwrap();

        let project_only = load_config(repo.path(), None).unwrap();
        assert_eq!(project_only.safety.max_lines_changed_total, 50);
        assert_eq!(project_only.safety.max_files_modified, 4);

        let with_explicit = load_config(repo.path(), Some(&explicit)).unwrap();
        assert_eq!(with_explicit.safety.max_lines_changed_total, 10);
        assert_eq!(with_explicit.safety.max_files_modified, 4);

        unsafe {
            std::env::remove_var(CONFIG_DIR_ENV);
        }
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let _guard = test_config_lock().lock().unwrap_or_else(|e| e.into_inner());
        let repo = tempfile::TempDir::new().unwrap();
        let missing = repo.path().join("nope.toml");
        assert!(matches!(
            load_config(repo.path(), Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }
}
