//! Append-only scrape run log used for auditing and rate accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scrape run against one source. Never updated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeLogEntry {
    pub id: Option<i64>,
    pub source: String,
    pub search_config_id: Option<i64>,
    pub jobs_found: i64,
    pub jobs_added: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ScrapeLogEntry {
    /// A completed run, stamped now.
    pub fn completed(
        source: impl Into<String>,
        search_config_id: Option<i64>,
        jobs_found: i64,
        jobs_added: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            source: source.into(),
            search_config_id,
            jobs_found,
            jobs_added,
            started_at: now,
            completed_at: Some(now),
            success: true,
            error_message: None,
        }
    }

    /// A failed run carrying its error message.
    pub fn failed(
        source: impl Into<String>,
        search_config_id: Option<i64>,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            source: source.into(),
            search_config_id,
            jobs_found: 0,
            jobs_added: 0,
            started_at: now,
            completed_at: Some(now),
            success: false,
            error_message: Some(error.into()),
        }
    }
}
