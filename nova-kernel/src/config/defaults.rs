use std::collections::BTreeSet;
use std::path::PathBuf;

use super::*;

pub const DEFAULT_MAX_LINES_CHANGED_TOTAL: usize = 200;
pub const DEFAULT_MAX_FILES_MODIFIED: usize = 10;
pub const DEFAULT_BRANCH_PREFIX: &str = "nova-auto-fix";
pub const DEFAULT_AUDIT_PATH: &str = ".nova/audit.jsonl";

const DENIED_GLOBS: &[&str] = &[
    // repository internals and engine state
    ".git/**",
    ".nova/**",
    // CI
    ".github/workflows/**",
    ".gitlab-ci.yml",
    ".circleci/**",
    ".travis.yml",
    "Jenkinsfile",
    "azure-pipelines.yml",
    // deployment
    "**/Dockerfile",
    "**/docker-compose*.yml",
    "deploy/**",
    "k8s/**",
    "helm/**",
    "**/*.tf",
    // secrets
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
    "**/id_rsa*",
    "**/secrets/**",
    // lockfiles
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/poetry.lock",
    "**/Pipfile.lock",
    "**/Cargo.lock",
    "**/go.sum",
    "**/Gemfile.lock",
    "**/composer.lock",
];

const DENIED_REGEXES: &[&str] = &[r"(?i)(^|/)(credentials|secrets?)\.(json|ya?ml|toml)$"];

const ALLOWED_OVERRIDES: &[&str] = &[".github/workflows/nova.yml"];

fn to_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for SafetyPolicyConfig {
    fn default() -> Self {
        Self {
            max_lines_changed_total: DEFAULT_MAX_LINES_CHANGED_TOTAL,
            max_files_modified: DEFAULT_MAX_FILES_MODIFIED,
            denied_path_globs: to_set(DENIED_GLOBS),
            denied_path_regexes: to_set(DENIED_REGEXES),
            allowed_overrides: to_set(ALLOWED_OVERRIDES),
            block_duplicate_definitions: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            allow_dirty: false,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_AUDIT_PATH),
        }
    }
}
