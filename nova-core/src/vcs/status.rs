use git2::{
    ApplyLocation, ApplyOptions, BranchType, Diff, Error, Oid, Repository, RepositoryState,
    Status, StatusEntry, StatusOptions, StatusShow,
};
use std::path::{Path, PathBuf};

/// Engine state that lives inside the working tree but is never tracked.
const ENGINE_DIR: &str = ".nova";

/// Dry-run `patch` against the working tree; nothing is written.
pub fn check_patch_in<P: AsRef<Path>>(repo_path: P, patch: &[u8]) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let diff = Diff::from_buffer(patch)?;
    let mut opts = ApplyOptions::new();
    opts.check(true);
    repo.apply(&diff, ApplyLocation::WorkDir, Some(&mut opts))
}

/// Apply `patch` to working tree files only; staging is left to the caller.
pub fn apply_patch_to_workdir_in<P: AsRef<Path>>(repo_path: P, patch: &[u8]) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let diff = Diff::from_buffer(patch)?;
    repo.apply(&diff, ApplyLocation::WorkDir, None)
}

/// Resolve the working directory of the repository containing `path`.
pub fn repo_root_in<P: AsRef<Path>>(path: P) -> Result<PathBuf, Error> {
    let repo = Repository::discover(path)?;
    repo.workdir()
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::from_str("repository has no working directory"))
}

/// Whether tracked files carry staged or unstaged edits. Untracked files
/// and the engine's own directory do not count.
pub fn has_tracked_changes_in<P: AsRef<Path>>(repo_path: P) -> Result<bool, Error> {
    let repo = Repository::open(repo_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(false)
        .include_ignored(false)
        .exclude_submodules(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses.iter().any(|entry| {
        let status = entry.status();
        if status.is_empty() || status.contains(Status::WT_NEW) {
            return false;
        }
        entry.path().is_none_or(|path| !is_engine_path(path))
    }))
}

fn is_engine_path(path: &str) -> bool {
    path == ENGINE_DIR || path.starts_with(&format!("{ENGINE_DIR}/"))
}

fn repo_state_label(state: RepositoryState) -> Option<&'static str> {
    match state {
        RepositoryState::Clean => None,
        RepositoryState::Merge => Some("merge in progress"),
        RepositoryState::Revert | RepositoryState::RevertSequence => Some("revert in progress"),
        RepositoryState::CherryPick | RepositoryState::CherryPickSequence => {
            Some("cherry-pick in progress")
        }
        RepositoryState::Bisect => Some("bisecting"),
        RepositoryState::Rebase
        | RepositoryState::RebaseInteractive
        | RepositoryState::RebaseMerge => Some("rebase in progress"),
        RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => {
            Some("apply mailbox in progress")
        }
    }
}

fn short_oid(oid: Oid) -> String {
    oid.to_string().chars().take(7).collect()
}

fn branch_status_line(repo: &Repository) -> String {
    let mut line = match repo.head() {
        Ok(head) if head.is_branch() => {
            let name = head.shorthand().unwrap_or("HEAD");
            let mut out = format!("## {name}");
            if let Ok(branch) = repo.find_branch(name, BranchType::Local)
                && let Ok(upstream) = branch.upstream()
                && let Ok(Some(upstream_name)) = upstream.name()
            {
                out.push_str("...");
                out.push_str(upstream_name);
            }
            out
        }
        Ok(head) => match head.target() {
            Some(oid) => format!("## HEAD (detached {})", short_oid(oid)),
            None => "## HEAD (detached)".to_string(),
        },
        Err(_) => "## HEAD (no branch)".to_string(),
    };

    if let Some(label) = repo_state_label(repo.state()) {
        line.push_str(&format!(" ({label})"));
    }
    line
}

fn status_code(status: Status) -> (char, char) {
    let index = if status.contains(Status::INDEX_NEW) {
        'A'
    } else if status.contains(Status::INDEX_MODIFIED) {
        'M'
    } else if status.contains(Status::INDEX_DELETED) {
        'D'
    } else if status.contains(Status::INDEX_RENAMED) {
        'R'
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    };

    let worktree = if status.contains(Status::WT_NEW) {
        '?'
    } else if status.contains(Status::WT_MODIFIED) {
        'M'
    } else if status.contains(Status::WT_DELETED) {
        'D'
    } else if status.contains(Status::WT_RENAMED) {
        'R'
    } else if status.contains(Status::WT_TYPECHANGE) {
        'T'
    } else {
        ' '
    };

    (index, worktree)
}

fn format_status_entry(entry: StatusEntry) -> Option<String> {
    let status = entry.status();
    if status.contains(Status::IGNORED) || status.is_empty() {
        return None;
    }
    let path = entry.path()?.to_string();

    if status.contains(Status::CONFLICTED) {
        return Some(format!("UU {path}"));
    }
    if status.contains(Status::WT_NEW) && !status.intersects(Status::INDEX_NEW) {
        return Some(format!("?? {path}"));
    }

    let (index, worktree) = status_code(status);
    Some(format!("{index}{worktree} {path}"))
}

/// Summarize repository status in a `git status --short --branch`-style format.
pub fn status_with_branch<P: AsRef<Path>>(repo_path: P) -> Result<String, Error> {
    let repo = Repository::discover(repo_path)?;
    if repo.workdir().is_none() {
        return Ok("## status unavailable (bare repository)".to_string());
    }

    let mut opts = StatusOptions::new();
    opts.show(StatusShow::IndexAndWorkdir)
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_unmodified(false)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut entries: Vec<String> = statuses.iter().filter_map(format_status_entry).collect();
    entries.sort();

    let mut lines = vec![branch_status_line(&repo)];
    lines.extend(entries);
    Ok(lines.join("\n"))
}
