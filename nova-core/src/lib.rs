pub mod applier;
pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod history;
pub mod rollback;
pub mod session;
pub mod vcs;

pub use applier::{ApplyResult, PatchApplier};
pub use engine::{PatchEngine, Review, SubmitOutcome};
pub use errors::{EngineError, ErrorKind};
pub use history::{PatchHistory, PatchStep};
pub use rollback::{RollbackManager, RollbackMode, RollbackResult, StepPreview};
pub use session::{ActiveSession, BranchLifecycle, BranchSession, FinalizeReport};
