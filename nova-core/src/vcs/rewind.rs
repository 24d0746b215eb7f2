use git2::build::CheckoutBuilder;
use git2::{
    Error, ErrorCode, Index, MergeOptions, ObjectType, Oid, Repository, ResetType, RevertOptions,
    Signature,
};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    Committed(Oid),
    /// The revert conflicted and was aborted; the tree is back at HEAD.
    Conflicted(Vec<String>),
}

/// Revert `target` with a new commit on HEAD carrying `message`. Expects a
/// clean tree: a conflicting revert is aborted with a hard reset to HEAD.
pub fn revert_commit_in<P: AsRef<Path>>(
    repo_path: P,
    target: Oid,
    message: &str,
) -> Result<RevertOutcome, Error> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.find_commit(target)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.safe().allow_conflicts(true).conflict_style_merge(true);
    let mut merge_opts = MergeOptions::new();
    merge_opts.fail_on_conflict(false);
    let mut opts = RevertOptions::new();
    opts.checkout_builder(checkout);
    opts.merge_opts(merge_opts);

    if let Err(err) = repo.revert(&commit, Some(&mut opts))
        && err.code() != ErrorCode::MergeConflict
    {
        abort_in_progress(&repo)?;
        return Err(err);
    }

    let mut index = repo.index()?;
    if index.has_conflicts() {
        let files = conflicted_paths(&mut index);
        abort_in_progress(&repo)?;
        return Ok(RevertOutcome::Conflicted(files));
    }

    index.write()?;
    let tree = repo.find_tree(index.write_tree()?)?;
    let signature = repo
        .signature()
        .or_else(|_| Signature::now("nova", "nova@local"))?;
    let parent = repo.head()?.peel_to_commit()?;
    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?;

    repo.cleanup_state().ok();
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_head(Some(&mut checkout))?;
    Ok(RevertOutcome::Committed(oid))
}

/// Move the current branch, index and working tree to `target`.
pub fn reset_hard_in<P: AsRef<Path>>(repo_path: P, target: Oid) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let object = repo.find_object(target, Some(ObjectType::Commit))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(false);
    repo.reset(&object, ResetType::Hard, Some(&mut checkout))
}

fn abort_in_progress(repo: &Repository) -> Result<(), Error> {
    let head = repo.head()?.peel_to_commit()?;
    repo.reset(head.as_object(), ResetType::Hard, None)?;
    repo.cleanup_state()
}

fn conflicted_paths(index: &mut Index) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(conflicts) = index.conflicts() {
        for conflict in conflicts.flatten() {
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                files.push(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}
