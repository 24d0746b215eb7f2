mod defaults;
mod merge;
mod schema;

pub use defaults::{
    DEFAULT_AUDIT_PATH, DEFAULT_BRANCH_PREFIX, DEFAULT_MAX_FILES_MODIFIED,
    DEFAULT_MAX_LINES_CHANGED_TOTAL,
};
pub use schema::*;
