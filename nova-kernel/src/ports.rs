use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audit::AuditEvent;

/// Read-only view of a repository's files. Paths are relative to the
/// repository root; implementations decide what "root" means.
pub trait FsPort {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_to_string(&self, path: &Path) -> Result<String, Self::Error>;
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, Self::Error>;
    fn exists(&self, path: &Path) -> Result<bool, Self::Error>;
    fn is_dir(&self, path: &Path) -> Result<bool, Self::Error>;
}

/// Receives one event per engine decision. Storage format belongs to the sink.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Keeps events in memory; handy for callers that inspect decisions afterwards.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
