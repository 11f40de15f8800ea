//! Phase-ordered build pipeline
//!
//! A pipeline holds stages attached to fixed phases. Running it walks the
//! stages in phase order, skipping the ones whose query reports them
//! already complete and executing the rest.

mod orchestrator;
mod phase;
mod stage;

pub use orchestrator::{BuildPipeline, PipelineError, RunReport, StageId};
pub use phase::Phase;
pub use stage::{BuildStage, StageContext, StageError, StageStatus};
