use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use nova_kernel::audit::AuditEvent;
use nova_kernel::config::AuditConfig;
use nova_kernel::ports::{EventSink, NullSink};

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Appends one JSON object per event to a file. Failures to write are logged
/// and swallowed; the audit trail never blocks the engine.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let record = Record {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl EventSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Err(err) = self.append(event) {
            tracing::warn!(
                path = %self.path.display(),
                event = event.name(),
                error = %err,
                "failed to append audit record"
            );
        }
    }
}

/// The sink described by `config`, with relative paths anchored at `repo_root`.
pub fn open_audit_sink(repo_root: &Path, config: &AuditConfig) -> Arc<dyn EventSink> {
    if !config.enabled {
        return Arc::new(NullSink);
    }
    let path = if config.path.is_absolute() {
        config.path.clone()
    } else {
        repo_root.join(&config.path)
    };
    Arc::new(JsonlAuditSink::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_timestamped_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("nested/audit.jsonl"));
        sink.record(&AuditEvent::RepairRejected {
            patch: "abc".to_string(),
            reason: "no file diffs".to_string(),
        });
        sink.record(&AuditEvent::SessionFinalized {
            working_branch: "nova-auto-fix/x".to_string(),
            success: true,
            branch_kept: true,
            cleanup_error: None,
        });

        let contents = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "repair_rejected");
        assert!(lines[0]["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(lines[1]["branch_kept"], true);
    }

    #[test]
    fn disabled_config_yields_null_sink() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AuditConfig {
            enabled: false,
            path: PathBuf::from("audit.jsonl"),
        };
        let sink = open_audit_sink(dir.path(), &config);
        sink.record(&AuditEvent::RepairRejected {
            patch: "abc".to_string(),
            reason: "x".to_string(),
        });
        assert!(!dir.path().join("audit.jsonl").exists());
    }
}
