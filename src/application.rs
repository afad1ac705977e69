//! Application layer - pipeline orchestration
//!
//! The explicit context object, the command surface the external layer
//! consumes, and the independent-cadence scheduler that drives the pipeline
//! autonomously.

pub mod context;
pub mod pipeline;
pub mod scheduler;

pub use context::AppContext;
pub use pipeline::{AiPassResult, DescriptionRefreshResult, RateStatus, SourceScrapeResult};
pub use scheduler::{PipelineScheduler, StageExecutor, StageProgress};
