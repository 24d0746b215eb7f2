use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as TOML: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for `{key}` in {path}: {message}")]
    InvalidValue {
        path: PathBuf,
        key: String,
        message: String,
    },
    #[error("unknown config key `{key}` in {path}")]
    UnknownKey { path: PathBuf, key: String },
}

/// Policy rules in their configured (uncompiled) form. Compile them with
/// [`crate::policy::SafetyPolicy::from_config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SafetyPolicyConfig {
    pub max_lines_changed_total: usize,
    pub max_files_modified: usize,
    pub denied_path_globs: BTreeSet<String>,
    pub denied_path_regexes: BTreeSet<String>,
    pub allowed_overrides: BTreeSet<String>,
    /// Turn duplicate-definition findings into violations instead of warnings.
    pub block_duplicate_definitions: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub branch_prefix: String,
    /// Start a session even when tracked files carry uncommitted edits.
    /// Failure cleanup hard-resets, so those edits would be lost.
    pub allow_dirty: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Relative paths are resolved against the repository root.
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub safety: SafetyPolicyConfig,
    pub session: SessionConfig,
    pub audit: AuditConfig,
}

/// How a layer's list replaces or extends the list below it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListLayer {
    Replace(BTreeSet<String>),
    Extend(BTreeSet<String>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SafetyLayer {
    pub max_lines_changed_total: Option<usize>,
    pub max_files_modified: Option<usize>,
    pub denied_path_globs: Option<ListLayer>,
    pub denied_path_regexes: Option<ListLayer>,
    pub allowed_overrides: Option<ListLayer>,
    pub block_duplicate_definitions: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionLayer {
    pub branch_prefix: Option<String>,
    pub allow_dirty: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditLayer {
    pub enabled: Option<bool>,
    pub path: Option<PathBuf>,
}

/// One config source with every field optional; merged over the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub safety: SafetyLayer,
    pub session: SessionLayer,
    pub audit: AuditLayer,
}
