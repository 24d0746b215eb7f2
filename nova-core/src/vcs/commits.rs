use git2::{DiffOptions, Error, ErrorCode, Index, Oid, Repository, Signature, Sort};
use std::path::Path;

use super::normalize_pathspec;

const FALLBACK_NAME: &str = "nova";
const FALLBACK_EMAIL: &str = "nova@local";

fn remove_path_allow_missing(index: &mut Index, path: &Path) -> Result<(), Error> {
    match index.remove_path(path) {
        Ok(()) => Ok(()),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Stage exactly `paths`: present files are added, missing ones are removed
/// from the index (a patch that deletes a file). Nothing else is touched.
pub fn stage_paths_allow_missing_in<P: AsRef<Path>>(
    repo_path: P,
    paths: &[&str],
) -> Result<(), Error> {
    if paths.is_empty() {
        return Ok(());
    }
    let repo = Repository::open(repo_path)?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| Error::from_str("repository has no working directory"))?
        .to_path_buf();
    let mut index = repo.index()?;

    for raw in paths {
        let norm = normalize_pathspec(raw);
        let rel = Path::new(&norm);
        if workdir.join(rel).is_file() {
            index.add_path(rel)?;
        } else {
            remove_path_allow_missing(&mut index, rel)?;
        }
    }

    index.write()
}

/// Whether the index differs from HEAD's tree.
pub fn has_staged_changes_in<P: AsRef<Path>>(repo_path: P) -> Result<bool, Error> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    match repo.head() {
        Ok(head) => Ok(head.peel_to_commit()?.tree_id() != tree_id),
        Err(err) if err.code() == ErrorCode::UnbornBranch => Ok(!index.is_empty()),
        Err(err) => Err(err),
    }
}

/// Commit the index on top of HEAD. Refuses to create an empty commit.
pub fn commit_staged_in<P: AsRef<Path>>(repo_path: P, message: &str) -> Result<Oid, Error> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let signature = repo
        .signature()
        .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))?;
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());

    match parent.as_ref() {
        Some(parent) if parent.tree_id() == tree_id => {
            return Err(Error::from_str("nothing to commit"));
        }
        None if index.is_empty() => return Err(Error::from_str("nothing to commit")),
        _ => {}
    }

    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: Oid,
    pub subject: String,
    pub message: String,
    pub parent: Option<Oid>,
    /// Paths changed relative to the first parent, sorted.
    pub files: Vec<String>,
}

pub fn commit_summary_in<P: AsRef<Path>>(repo_path: P, oid: Oid) -> Result<CommitSummary, Error> {
    let repo = Repository::open(repo_path)?;
    summarize(&repo, oid)
}

fn summarize(repo: &Repository, oid: Oid) -> Result<CommitSummary, Error> {
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent = match commit.parent(0) {
        Ok(parent) => Some(parent),
        Err(err) if err.code() == ErrorCode::NotFound => None,
        Err(err) => return Err(err),
    };
    let parent_tree = match &parent {
        Some(parent) => Some(parent.tree()?),
        None => None,
    };

    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
    let mut files: Vec<String> = diff
        .deltas()
        .filter_map(|delta| delta.new_file().path().or(delta.old_file().path()))
        .filter_map(|path| path.to_str())
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();

    let message = commit.message().unwrap_or_default().to_string();
    Ok(CommitSummary {
        id: oid,
        subject: commit.summary().unwrap_or_default().to_string(),
        message,
        parent: parent.map(|parent| parent.id()),
        files,
    })
}

/// Commits reachable from HEAD along first parents, newest first.
pub fn first_parent_log_in<P: AsRef<Path>>(
    repo_path: P,
    limit: usize,
) -> Result<Vec<CommitSummary>, Error> {
    let repo = Repository::open(repo_path)?;
    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL)?;
    walk.simplify_first_parent()?;
    match walk.push_head() {
        Ok(()) => {}
        Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(Vec::new()),
        Err(err) => return Err(err),
    }

    let mut out = Vec::new();
    for oid in walk.take(limit) {
        out.push(summarize(&repo, oid?)?);
    }
    Ok(out)
}

/// Whether `ancestor` is `descendant` or one of its ancestors.
pub fn is_ancestor_in<P: AsRef<Path>>(
    repo_path: P,
    ancestor: Oid,
    descendant: Oid,
) -> Result<bool, Error> {
    let repo = Repository::open(repo_path)?;
    Ok(ancestor == descendant || repo.graph_descendant_of(descendant, ancestor)?)
}
