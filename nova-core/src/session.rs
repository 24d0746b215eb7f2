//! Session branch lifecycle: every patch lands on a disposable branch, and a
//! failed or interrupted session puts the repository back where it started.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use git2::Oid;
use serde::Serialize;
use signal_hook::SigId;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

use nova_kernel::audit::AuditEvent;
use nova_kernel::config::SessionConfig;
use nova_kernel::ports::{EventSink, NullSink};

use crate::errors::EngineError;
use crate::history::PatchHistory;
use crate::vcs;

/// State of one patch session, threaded explicitly through every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSession {
    pub repo_root: PathBuf,
    pub original_head: String,
    /// `None` only when HEAD was detached and no branch could be matched.
    pub original_branch_name: Option<String>,
    pub working_branch_name: String,
    pub history: PatchHistory,
}

impl BranchSession {
    fn original_oid(&self) -> Result<Oid, EngineError> {
        Ok(Oid::from_str(&self.original_head)?)
    }

    #[cfg(test)]
    pub(crate) fn detached_for_tests(repo_root: &Path, head: Oid) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            original_head: head.to_string(),
            original_branch_name: Some("main".to_string()),
            working_branch_name: "main".to_string(),
            history: PatchHistory::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    pub working_branch: String,
    pub success: bool,
    pub branch_kept: bool,
    /// Failure cleanup could not delete the session branch; the tree was still restored.
    pub branch_delete_error: Option<String>,
}

pub struct BranchLifecycle {
    config: SessionConfig,
    sink: Arc<dyn EventSink>,
}

impl BranchLifecycle {
    pub fn new(config: SessionConfig, sink: Arc<dyn EventSink>) -> Self {
        Self { config, sink }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default(), Arc::new(NullSink))
    }

    /// Record where the repository is, then create and check out a fresh
    /// session branch. Interrupts are trapped until the session is finalized.
    pub fn begin(&self, repo_path: &Path) -> Result<ActiveSession, EngineError> {
        let repo_root = vcs::repo_root_in(repo_path)?;
        let head = vcs::head_oid_in(&repo_root)?.ok_or(EngineError::UnbornHead)?;

        if !self.config.allow_dirty && vcs::has_tracked_changes_in(&repo_root)? {
            return Err(EngineError::DirtyWorktree);
        }

        let original_branch_name = match vcs::current_branch_name_in(&repo_root)? {
            Some(name) => Some(name),
            None => resolve_detached_branch(&repo_root, head, &self.config.branch_prefix)?,
        };

        let working_branch_name = unique_branch_name(&repo_root, &self.config.branch_prefix)?;
        vcs::create_branch_at_in(&repo_root, &working_branch_name, head)?;
        if let Err(err) = vcs::checkout_branch_in(&repo_root, &working_branch_name) {
            let _ = vcs::delete_branch_in(&repo_root, &working_branch_name);
            return Err(err.into());
        }

        let interrupts = InterruptGuard::install()?;

        tracing::info!(
            branch = %working_branch_name,
            original = original_branch_name.as_deref().unwrap_or("(detached)"),
            head = %head,
            "session started"
        );
        self.sink.record(&AuditEvent::SessionBegan {
            original_head: head.to_string(),
            original_branch: original_branch_name.clone(),
            working_branch: working_branch_name.clone(),
        });

        Ok(ActiveSession {
            session: BranchSession {
                repo_root,
                original_head: head.to_string(),
                original_branch_name,
                working_branch_name,
                history: PatchHistory::new(),
            },
            sink: Arc::clone(&self.sink),
            interrupts: Some(interrupts),
            finalized: false,
        })
    }
}

/// A begun session. Dropping it without calling [`ActiveSession::finalize`]
/// finalizes it as a failure.
pub struct ActiveSession {
    session: BranchSession,
    sink: Arc<dyn EventSink>,
    interrupts: Option<InterruptGuard>,
    finalized: bool,
}

impl ActiveSession {
    pub fn session(&self) -> &BranchSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BranchSession {
        &mut self.session
    }

    /// Whether SIGINT/SIGTERM arrived since `begin`. Callers poll this between
    /// steps and finalize as a failure when it is set.
    pub fn is_interrupted(&self) -> bool {
        self.interrupts
            .as_ref()
            .is_some_and(InterruptGuard::is_triggered)
    }

    /// On success the session branch stays checked out. Otherwise the original
    /// branch (or commit) is checked out, hard-reset to the original head, and
    /// the session branch deleted. Only a failed reset is an error.
    pub fn finalize(mut self, success: bool) -> Result<FinalizeReport, EngineError> {
        self.finish(success)
    }

    fn finish(&mut self, success: bool) -> Result<FinalizeReport, EngineError> {
        self.finalized = true;
        self.interrupts.take();

        let working_branch = self.session.working_branch_name.clone();
        let outcome = if success {
            tracing::info!(branch = %working_branch, steps = self.session.history.len(), "session kept");
            Ok(FinalizeReport {
                working_branch: working_branch.clone(),
                success: true,
                branch_kept: true,
                branch_delete_error: None,
            })
        } else {
            self.restore_original().map(|branch_delete_error| FinalizeReport {
                working_branch: working_branch.clone(),
                success: false,
                branch_kept: false,
                branch_delete_error,
            })
        };

        self.sink.record(&AuditEvent::SessionFinalized {
            working_branch,
            success,
            branch_kept: success,
            cleanup_error: outcome.as_ref().err().map(ToString::to_string),
        });
        outcome
    }

    fn restore_original(&self) -> Result<Option<String>, EngineError> {
        let session = &self.session;
        let root = session.repo_root.as_path();
        let original = session.original_oid()?;

        let checkout = match session.original_branch_name.as_deref() {
            Some(name) if vcs::branch_exists_in(root, name).unwrap_or(false) => {
                vcs::checkout_branch_in(root, name)
            }
            _ => vcs::checkout_detached_in(root, original),
        };
        if let Err(err) = checkout {
            tracing::warn!(error = %err, "could not check out the original branch; resetting in place");
        }

        if let Err(err) = vcs::reset_hard_in(root, original) {
            tracing::error!(
                original_head = %session.original_head,
                original_branch = session.original_branch_name.as_deref().unwrap_or("(detached)"),
                working_branch = %session.working_branch_name,
                error = %err,
                "hard reset during cleanup failed; the repository needs manual recovery"
            );
            return Err(EngineError::CleanupFailure {
                original_head: session.original_head.clone(),
                detail: err.message().to_string(),
            });
        }

        let delete_error = match vcs::delete_branch_in(root, &session.working_branch_name) {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    branch = %session.working_branch_name,
                    error = %err,
                    "could not delete session branch"
                );
                Some(err.message().to_string())
            }
        };
        tracing::info!(head = %session.original_head, "repository restored");
        Ok(delete_error)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if !self.finalized
            && let Err(err) = self.finish(false)
        {
            tracing::error!(error = %err, "session cleanup on drop failed");
        }
    }
}

/// For a detached HEAD, pick the branch the user was most likely on: one that
/// contains HEAD and is not a session branch, preferring main/master. Falls
/// back to the repository's primary branch when only session branches contain it.
fn resolve_detached_branch(
    root: &Path,
    head: Oid,
    session_prefix: &str,
) -> Result<Option<String>, EngineError> {
    let session_marker = format!("{session_prefix}/");
    let candidates: Vec<String> = vcs::branches_containing_in(root, head)?
        .into_iter()
        .filter(|name| !name.starts_with(&session_marker))
        .collect();

    for preferred in ["main", "master"] {
        if candidates.iter().any(|name| name == preferred) {
            return Ok(Some(preferred.to_string()));
        }
    }
    if let Some(first) = candidates.into_iter().next() {
        return Ok(Some(first));
    }
    Ok(vcs::detect_primary_branch_in(root).filter(|name| !name.starts_with(&session_marker)))
}

fn unique_branch_name(root: &Path, prefix: &str) -> Result<String, EngineError> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let base = format!("{prefix}/{stamp}");
    if !vcs::branch_exists_in(root, &base)? {
        return Ok(base);
    }
    for suffix in 2.. {
        let candidate = format!("{base}-{suffix}");
        if !vcs::branch_exists_in(root, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(EngineError::BranchExists(base))
}

/// Sessions currently holding interrupt registrations.
static ACTIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);
/// True while no session is active; drives the default-action fallback.
static IDLE: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(true)));
static IDLE_FALLBACK_INSTALLED: Mutex<bool> = Mutex::new(false);

/// Interrupt registrations for one session. The first SIGINT/SIGTERM sets a
/// flag; a second one while the flag is set terminates the process. Dropping
/// the guard removes the registrations.
struct InterruptGuard {
    triggered: Arc<AtomicBool>,
    ids: Vec<SigId>,
}

impl InterruptGuard {
    fn install() -> Result<Self, EngineError> {
        install_idle_fallback()?;

        let triggered = Arc::new(AtomicBool::new(false));
        let mut guard = Self {
            triggered: Arc::clone(&triggered),
            ids: Vec::new(),
        };
        if ACTIVE_SESSIONS.fetch_add(1, Ordering::SeqCst) == 0 {
            IDLE.store(false, Ordering::SeqCst);
        }
        for &signal in TERM_SIGNALS {
            guard
                .ids
                .push(flag::register_conditional_default(signal, Arc::clone(&triggered))?);
            guard.ids.push(flag::register(signal, Arc::clone(&triggered))?);
        }
        Ok(guard)
    }

    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
        if ACTIVE_SESSIONS.fetch_sub(1, Ordering::SeqCst) == 1 {
            IDLE.store(true, Ordering::SeqCst);
        }
    }
}

/// Outside a session, termination signals keep their default effect.
fn install_idle_fallback() -> Result<(), EngineError> {
    let mut installed = IDLE_FALLBACK_INSTALLED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !*installed {
        for &signal in TERM_SIGNALS {
            flag::register_conditional_default(signal, Arc::clone(&IDLE))?;
        }
        *installed = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::tests::TestRepo;
    use nova_kernel::ports::MemorySink;

    // Signal registrations are process-wide; tests holding a live session
    // take this so a raised SIGINT only reaches the session that expects it.
    static LIVE_SESSIONS: Mutex<()> = Mutex::new(());

    fn live_session_lock() -> std::sync::MutexGuard<'static, ()> {
        LIVE_SESSIONS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn begin_creates_prefixed_branch_and_records_origin() {
        let _live = live_session_lock();
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        let head = repo.head();
        let sink = Arc::new(MemorySink::new());
        let lifecycle = BranchLifecycle::new(SessionConfig::default(), sink.clone());

        let active = lifecycle.begin(repo.path()).unwrap();
        let session = active.session();
        assert_eq!(session.original_head, head.to_string());
        assert_eq!(session.original_branch_name.as_deref(), Some("main"));
        assert!(session.working_branch_name.starts_with("nova-auto-fix/"));
        assert_eq!(
            vcs::current_branch_name_in(repo.path()).unwrap().as_deref(),
            Some(session.working_branch_name.as_str())
        );
        assert!(!active.is_interrupted());

        let report = active.finalize(true).unwrap();
        assert!(report.branch_kept);
        assert!(vcs::branch_exists_in(repo.path(), &report.working_branch).unwrap());
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn refuses_dirty_tree_unless_allowed() {
        let _live = live_session_lock();
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        repo.write("a.txt", "edited\n");
        let strict = BranchLifecycle::with_defaults();
        assert!(matches!(
            strict.begin(repo.path()),
            Err(EngineError::DirtyWorktree)
        ));

        let lenient = BranchLifecycle::new(
            SessionConfig {
                allow_dirty: true,
                ..SessionConfig::default()
            },
            Arc::new(NullSink),
        );
        let active = lenient.begin(repo.path()).unwrap();
        active.finalize(true).unwrap();
    }

    #[test]
    fn unborn_repository_cannot_start_a_session() {
        let repo = TestRepo::new();
        assert!(matches!(
            BranchLifecycle::with_defaults().begin(repo.path()),
            Err(EngineError::UnbornHead)
        ));
    }

    #[test]
    fn detached_head_resolves_to_containing_branch() {
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        let head = repo.head();
        vcs::create_branch_at_in(repo.path(), "nova-auto-fix/older", head).unwrap();
        vcs::checkout_detached_in(repo.path(), head).unwrap();

        assert_eq!(
            resolve_detached_branch(repo.path(), head, "nova-auto-fix").unwrap(),
            Some("main".to_string())
        );
    }

    #[test]
    fn detached_head_on_session_only_commit_falls_back_to_primary() {
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        vcs::create_branch_at_in(repo.path(), "nova-auto-fix/old", repo.head()).unwrap();
        vcs::checkout_branch_in(repo.path(), "nova-auto-fix/old").unwrap();
        repo.write("a.txt", "b\n");
        let tip = repo.commit_all("nova: step 1");
        vcs::checkout_detached_in(repo.path(), tip).unwrap();

        assert_eq!(
            resolve_detached_branch(repo.path(), tip, "nova-auto-fix").unwrap(),
            Some("main".to_string())
        );
    }

    #[test]
    fn dropping_an_unfinalized_session_cleans_up() {
        let _live = live_session_lock();
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        let head = repo.head();
        let branch = {
            let active = BranchLifecycle::with_defaults().begin(repo.path()).unwrap();
            repo.write("a.txt", "half-applied\n");
            active.session().working_branch_name.clone()
        };
        assert_eq!(repo.read("a.txt"), "a\n");
        assert_eq!(repo.head(), head);
        assert!(!vcs::branch_exists_in(repo.path(), &branch).unwrap());
        assert_eq!(
            vcs::current_branch_name_in(repo.path()).unwrap().as_deref(),
            Some("main")
        );
    }

    #[test]
    fn sigint_marks_session_interrupted_and_failure_restores_origin() {
        let _live = live_session_lock();
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        let head = repo.head();
        let active = BranchLifecycle::with_defaults().begin(repo.path()).unwrap();
        let branch = active.session().working_branch_name.clone();
        repo.write("a.txt", "half-applied\n");
        assert!(!active.is_interrupted());

        signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
        assert!(active.is_interrupted());

        let report = active.finalize(false).unwrap();
        assert!(!report.branch_kept);
        assert_eq!(report.branch_delete_error, None);
        assert_eq!(repo.head(), head);
        assert_eq!(repo.read("a.txt"), "a\n");
        assert!(!vcs::branch_exists_in(repo.path(), &branch).unwrap());
        assert_eq!(
            vcs::current_branch_name_in(repo.path()).unwrap().as_deref(),
            Some("main")
        );
    }

    #[test]
    fn branch_names_are_unique_within_a_second() {
        let repo = TestRepo::with_files(&[("a.txt", "a\n")]);
        let first = unique_branch_name(repo.path(), "p").unwrap();
        vcs::create_branch_at_in(repo.path(), &first, repo.head()).unwrap();
        let second = unique_branch_name(repo.path(), "p").unwrap();
        assert_ne!(first, second);
        assert!(second.starts_with("p/"));
    }
}
