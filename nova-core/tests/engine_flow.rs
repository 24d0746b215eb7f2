use std::fs;
use std::path::Path;
use std::sync::Arc;

use git2::{IndexAddOption, Repository, Signature};
use nova_core::config::{Config, SessionConfig};
use nova_core::vcs;
use nova_core::{BranchLifecycle, ErrorKind, PatchEngine, PatchHistory, RollbackManager, SubmitOutcome};
use nova_kernel::audit::AuditEvent;
use nova_kernel::ports::{MemorySink, NullSink};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn init_repo(files: &[(&str, &str)]) -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let repo = Repository::init(dir.path())?;
    repo.set_head("refs/heads/main")?;
    for (rel, contents) in files {
        write(dir.path(), rel, contents)?;
    }
    let mut index = repo.index()?;
    index.add_all(["."], IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = Signature::now("Tester", "tester@example.com")?;
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])?;
    Ok(dir)
}

fn write(root: &Path, rel: &str, contents: &str) -> std::io::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn replace_line(path: &str, old: &str, new: &str, line: usize) -> String {
    format!("--- a/{path}\n+++ b/{path}\n@@ -{line} +{line} @@\n-{old}\n+{new}\n")
}

#[test]
fn applying_the_same_patch_twice_is_a_no_op() -> TestResult {
    let dir = init_repo(&[("app.py", "x = 1\ny = 2\n")])?;
    let engine = PatchEngine::with_defaults()?;
    let mut active = BranchLifecycle::with_defaults().begin(dir.path())?;
    let patch = replace_line("app.py", "x = 1", "x = 10", 1);

    let first = engine.submit(active.session_mut(), &patch, None);
    let SubmitOutcome::Applied { result, .. } = &first else {
        panic!("first submit was not applied: {first:?}");
    };
    assert!(result.success);
    assert_eq!(result.step.as_ref().map(|step| step.step_number), Some(1));

    let second = engine.submit(active.session_mut(), &patch, None);
    let SubmitOutcome::Applied { result, .. } = &second else {
        panic!("second submit was not applied: {second:?}");
    };
    assert!(result.success);
    assert!(result.step.is_none());
    assert_eq!(active.session().history.len(), 1);

    let report = active.finalize(true)?;
    assert!(report.branch_kept);
    Ok(())
}

#[test]
fn three_steps_then_two_reverts_leaves_one() -> TestResult {
    let dir = init_repo(&[("a.txt", "a0\n"), ("b.txt", "b0\n"), ("c.txt", "c0\n")])?;
    let engine = PatchEngine::with_defaults()?;
    let mut active = BranchLifecycle::with_defaults().begin(dir.path())?;

    for (file, old, new) in [("a.txt", "a0", "a1"), ("b.txt", "b0", "b1"), ("c.txt", "c0", "c1")] {
        let outcome = engine.submit(active.session_mut(), &replace_line(file, old, new, 1), None);
        assert!(outcome.is_success(), "{outcome:?}");
    }
    assert_eq!(active.session().history.len(), 3);

    let root = active.session().repo_root.clone();
    let mut history = active.session().history.clone();
    let mut manager = RollbackManager::new(&root, &mut history);
    let results = manager.rollback_many(2, true)?;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|result| result.success));
    assert_eq!(
        results.iter().map(|result| result.step_number).collect::<Vec<_>>(),
        vec![3, 2]
    );
    assert_eq!(manager.history().len(), 1);

    let log = vcs::first_parent_log_in(&root, 10)?;
    let reverts = log
        .iter()
        .filter(|commit| commit.subject.starts_with("Revert \""))
        .count();
    assert_eq!(reverts, 2);
    assert_eq!(fs::read_to_string(root.join("a.txt"))?, "a1\n");
    assert_eq!(fs::read_to_string(root.join("c.txt"))?, "c0\n");

    // The same picture comes back when history is rebuilt from the branch.
    let rebuilt = PatchHistory::from_branch_in(&root)?;
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt.steps()[0].changed_files, vec!["a.txt".to_string()]);

    active.finalize(true)?;
    Ok(())
}

#[test]
fn failed_session_restores_the_original_tree() -> TestResult {
    let dir = init_repo(&[("lib.rs", "fn one() {}\nfn two() {}\n")])?;
    let original = fs::read_to_string(dir.path().join("lib.rs"))?;
    let original_head = vcs::head_oid_in(dir.path())?;
    let engine = PatchEngine::with_defaults()?;
    let mut active = BranchLifecycle::with_defaults().begin(dir.path())?;
    let branch = active.session().working_branch_name.clone();

    let applied = engine.submit(
        active.session_mut(),
        &replace_line("lib.rs", "fn one() {}", "fn one() { todo!() }", 1),
        None,
    );
    assert!(applied.is_success());

    // Context that no longer matches the file fails the preflight.
    let stale = engine.submit(
        active.session_mut(),
        &replace_line("lib.rs", "fn two() { 2 }", "fn two() { 3 }", 2),
        None,
    );
    assert_eq!(stale.error_kind(), Some(ErrorKind::PreflightMismatch));

    let report = active.finalize(false)?;
    assert!(!report.branch_kept);
    assert_eq!(fs::read_to_string(dir.path().join("lib.rs"))?, original);
    assert_eq!(vcs::head_oid_in(dir.path())?, original_head);
    assert!(!vcs::branch_exists_in(dir.path(), &branch)?);
    assert_eq!(vcs::current_branch_name_in(dir.path())?.as_deref(), Some("main"));
    Ok(())
}

#[test]
fn workflow_edits_are_denied_unless_overridden() -> TestResult {
    let dir = init_repo(&[
        (".github/workflows/x.yml", "on: push\n"),
        (".github/workflows/nova.yml", "on: push\n"),
    ])?;
    let engine = PatchEngine::with_defaults()?;

    let denied = engine.review(
        dir.path(),
        &replace_line(".github/workflows/x.yml", "on: push", "on: [push]", 1),
    )?;
    assert!(!denied.report.is_safe);
    assert_eq!(denied.report.violations.len(), 1);
    assert!(denied.report.violations[0].contains(".github/workflows/x.yml"));

    let allowed = engine.review(
        dir.path(),
        &replace_line(".github/workflows/nova.yml", "on: push", "on: [push]", 1),
    )?;
    assert!(allowed.report.is_safe, "{:?}", allowed.report.violations);
    Ok(())
}

#[test]
fn oversized_patch_is_rejected_with_counts() -> TestResult {
    let body: String = (0..250).map(|i| format!("line {i}\n")).collect();
    let dir = init_repo(&[("README.md", "readme\n")])?;
    let added: String = body.lines().map(|line| format!("+{line}\n")).collect();
    let patch = format!("--- /dev/null\n+++ b/big.txt\n@@ -0,0 +1,250 @@\n{added}");

    let sink = Arc::new(MemorySink::new());
    let engine = PatchEngine::from_config(&Config::default(), sink.clone())?;
    let mut active = BranchLifecycle::new(SessionConfig::default(), Arc::new(NullSink)).begin(dir.path())?;
    let outcome = engine.submit(active.session_mut(), &patch, None);

    let SubmitOutcome::SafetyRejected { review } = &outcome else {
        panic!("expected rejection: {outcome:?}");
    };
    assert!(review.report.violations.iter().any(|violation| violation.contains("250 > 200")));
    assert!(!dir.path().join("big.txt").exists());
    assert!(sink.events().iter().any(|event| matches!(
        event,
        AuditEvent::SafetyEvaluated { is_safe: false, lines_added: 250, .. }
    )));

    active.finalize(false)?;
    Ok(())
}
