mod branches;
mod commits;
mod rewind;
mod status;

pub use branches::{
    branch_exists_in, branches_containing_in, checkout_branch_in, checkout_detached_in,
    create_branch_at_in, current_branch_name_in, delete_branch_in, detect_primary_branch_in,
    head_oid_in,
};
pub use commits::{
    CommitSummary, commit_staged_in, commit_summary_in, first_parent_log_in, has_staged_changes_in,
    is_ancestor_in, stage_paths_allow_missing_in,
};
pub use rewind::{RevertOutcome, reset_hard_in, revert_commit_in};
pub use status::{
    apply_patch_to_workdir_in, check_patch_in, has_tracked_changes_in, repo_root_in,
    status_with_branch,
};

fn normalize_pathspec(path: &str) -> String {
    let mut s = path
        .trim()
        .trim_end_matches('/')
        .trim_end_matches('\\')
        .replace('\\', "/");

    while let Some(stripped) = s.strip_prefix("./") {
        s = stripped.to_string();
    }
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    s
}
