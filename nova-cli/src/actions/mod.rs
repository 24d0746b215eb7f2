mod apply;
mod review;
mod rollback;
mod shared;
mod status;

pub(crate) use apply::run_apply;
pub(crate) use review::run_review;
pub(crate) use rollback::run_rollback;
pub(crate) use shared::CommandContext;
pub(crate) use status::run_status;
