use git2::build::CheckoutBuilder;
use git2::{BranchType, Error, ErrorCode, Oid, Repository};
use std::path::Path;

/// Prefer origin/HEAD, then main/master, then the most recently updated local branch.
pub fn detect_primary_branch_in<P: AsRef<Path>>(repo_path: P) -> Option<String> {
    let repo = Repository::open(repo_path).ok()?;

    if let Ok(remote_head) = repo.find_reference("refs/remotes/origin/HEAD")
        && let Some(symbolic) = remote_head.symbolic_target()
        && let Some(name) = symbolic.strip_prefix("refs/remotes/origin/")
        && repo.find_branch(name, BranchType::Local).is_ok()
    {
        return Some(name.to_string());
    }

    for candidate in ["main", "master"] {
        if repo.find_branch(candidate, BranchType::Local).is_ok() {
            return Some(candidate.to_string());
        }
    }

    let mut newest: Option<(String, i64)> = None;
    for (branch, _) in repo.branches(Some(BranchType::Local)).ok()?.flatten() {
        if let Ok(commit) = branch.get().peel_to_commit()
            && let Ok(Some(name)) = branch.name()
        {
            let seconds = commit.time().seconds();
            if newest.as_ref().is_none_or(|(_, current)| seconds > *current) {
                newest = Some((name.to_string(), seconds));
            }
        }
    }
    newest.map(|(name, _)| name)
}

pub fn branch_exists_in<P: AsRef<Path>>(repo_path: P, name: &str) -> Result<bool, Error> {
    let repo = Repository::open(repo_path)?;
    match repo.find_branch(name, BranchType::Local) {
        Ok(_) => Ok(true),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Local branches whose tip is `oid` or a descendant of it, sorted by name.
pub fn branches_containing_in<P: AsRef<Path>>(repo_path: P, oid: Oid) -> Result<Vec<String>, Error> {
    let repo = Repository::open(repo_path)?;
    let mut names = Vec::new();
    for entry in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = entry?;
        let Some(tip) = branch.get().target() else {
            continue;
        };
        if (tip == oid || repo.graph_descendant_of(tip, oid)?)
            && let Some(name) = branch.name()?
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn create_branch_at_in<P: AsRef<Path>>(
    repo_path: P,
    new_branch: &str,
    target: Oid,
) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.find_commit(target)?;
    repo.branch(new_branch, &commit, false)?;
    Ok(())
}

pub fn delete_branch_in<P: AsRef<Path>>(repo_path: P, name: &str) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    match repo.find_branch(name, BranchType::Local) {
        Ok(mut branch) => branch.delete(),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn checkout_branch_in<P: AsRef<Path>>(repo_path: P, name: &str) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    repo.find_branch(name, BranchType::Local)?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
}

pub fn checkout_detached_in<P: AsRef<Path>>(repo_path: P, oid: Oid) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    repo.set_head_detached(oid)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
}

pub fn current_branch_name_in<P: AsRef<Path>>(repo_path: P) -> Result<Option<String>, Error> {
    let repo = Repository::open(repo_path)?;
    let head = repo.head()?;
    if !head.is_branch() {
        return Ok(None);
    }
    Ok(head
        .shorthand()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string))
}

/// The commit HEAD points at, or `None` on an unborn branch.
pub fn head_oid_in<P: AsRef<Path>>(repo_path: P) -> Result<Option<Oid>, Error> {
    let repo = Repository::open(repo_path)?;
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
        Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(err) => Err(err),
    }
}
