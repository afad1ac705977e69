//! Infrastructure module - external-world plumbing
//!
//! Browser-driven fetching, impersonated HTTP, persistence, AI client,
//! configuration and logging. Domain logic stays out of here; this layer
//! only knows how to talk to the outside world.

pub mod ai;
pub mod browser;
pub mod config;
pub mod database_connection;
pub mod description_fetcher;
pub mod job_repository;
pub mod logging;
pub mod stealth;

pub use browser::BrowserSession;
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use description_fetcher::DescriptionFetcher;
pub use job_repository::{BatchStats, InsertOutcome, JobRepository};
