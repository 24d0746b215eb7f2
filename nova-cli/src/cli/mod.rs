pub(crate) mod args;
pub(crate) mod dispatch;
pub(crate) mod logging;
