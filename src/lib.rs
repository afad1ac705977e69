//! Jobharvest - autonomous job listing aggregation and enrichment pipeline
//!
//! Aggregates postings from a fixed set of job sites into a deduplicated
//! SQLite store, backfills full descriptions over impersonated HTTP, and
//! enriches records with AI-extracted metadata, all on independent
//! schedules. The excluded presentation layer consumes the command surface
//! re-exported here.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod scrapers;

// Re-export the command surface for easier access
pub use application::{
    AppContext, AiPassResult, DescriptionRefreshResult, RateStatus, SourceScrapeResult,
};
pub use domain::{
    EmploymentType, JobRecord, JobStatus, SchedulerConfig, ScrapeLogEntry, SearchConfig, Stage,
    TaskState, TaskStatus,
};
pub use infrastructure::config::AppConfig;
