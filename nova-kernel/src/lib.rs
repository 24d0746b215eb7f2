pub mod audit;
pub mod config;
pub mod diff;
pub mod duplicates;
pub mod policy;
pub mod ports;
pub mod repair;
pub mod resolver;

pub use diff::{Diff, DiffError};
pub use policy::{SafetyPolicy, SafetyReport, evaluate};
pub use repair::{DiffRepairer, RepairOptions, RepairOutcome, RepairWarning};
