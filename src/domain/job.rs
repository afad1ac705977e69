//! Job listing entity and its lifecycle flags
//!
//! A `JobRecord` is created by a site adapter, refreshed by the dedup engine,
//! backfilled by the description fetcher and enriched by the AI stage. Once a
//! user-facing mutation sets `is_edited`, scraper-origin writes must never
//! touch the row again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

/// Tracking status of a stored job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    New,
    Interested,
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Archived,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Interested => "interested",
            JobStatus::Applied => "applied",
            JobStatus::Interviewing => "interviewing",
            JobStatus::Offer => "offer",
            JobStatus::Rejected => "rejected",
            JobStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(JobStatus::New),
            "interested" => Some(JobStatus::Interested),
            "applied" => Some(JobStatus::Applied),
            "interviewing" => Some(JobStatus::Interviewing),
            "offer" => Some(JobStatus::Offer),
            "rejected" => Some(JobStatus::Rejected),
            "archived" => Some(JobStatus::Archived),
            _ => None,
        }
    }
}

impl Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        JobStatus::parse(&s).ok_or_else(|| format!("Invalid JobStatus: {s}").into())
    }
}

/// Canonical employment-type vocabulary used across all source adapters.
///
/// Each site speaks its own dialect (see the per-site profiles); this is the
/// neutral form search configs are written in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmploymentType {
    Permanent,
    Contract,
    Temporary,
    /// Work from home / remote
    Wfh,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::Permanent => "permanent",
            EmploymentType::Contract => "contract",
            EmploymentType::Temporary => "temporary",
            EmploymentType::Wfh => "wfh",
        }
    }

    /// Parse a user- or site-supplied label, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "permanent" | "perm" => Some(EmploymentType::Permanent),
            "contract" => Some(EmploymentType::Contract),
            "temporary" | "temp" => Some(EmploymentType::Temporary),
            "wfh" | "whf" | "remote" | "work-from-home" | "work from home" => {
                Some(EmploymentType::Wfh)
            }
            _ => None,
        }
    }
}

/// A job listing from any source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Database id; None until stored
    pub id: Option<i64>,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub posted_date: Option<String>,
    pub url: String,
    /// Adapter name that produced this record (reed, indeed, ...)
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    /// permanent / contract / temporary / WFH, when known
    pub employment_type: Option<String>,
    pub status: JobStatus,
    pub is_applied: bool,
    /// Set by any user-initiated mutation; activates edit protection
    pub is_edited: bool,
    pub has_full_description: bool,
    pub ai_processed: bool,
    pub cleaned_description: Option<String>,
    /// JSON array of tag strings, AI-derived
    pub tags: Option<String>,
    /// JSON object of extracted entities, AI-derived
    pub entities: Option<String>,
    pub notes: Option<String>,
}

impl JobRecord {
    /// Create a freshly scraped record with lifecycle flags at their defaults.
    pub fn scraped(
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            company: company.into(),
            location: location.into(),
            description: description.into(),
            salary: None,
            job_type: None,
            posted_date: None,
            url: url.into(),
            source: source.into(),
            scraped_at: Utc::now(),
            employment_type: None,
            status: JobStatus::New,
            is_applied: false,
            is_edited: false,
            has_full_description: false,
            ai_processed: false,
            cleaned_description: None,
            tags: None,
            entities: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_salary(mut self, salary: Option<String>) -> Self {
        self.salary = salary;
        self
    }

    #[must_use]
    pub fn with_job_type(mut self, job_type: Option<String>) -> Self {
        self.job_type = job_type;
        self
    }

    #[must_use]
    pub fn with_posted_date(mut self, posted_date: Option<String>) -> Self {
        self.posted_date = posted_date;
        self
    }

    #[must_use]
    pub fn with_employment_type(mut self, employment_type: Option<String>) -> Self {
        self.employment_type = employment_type;
        self
    }
}
