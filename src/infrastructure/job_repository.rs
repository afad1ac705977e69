//! Repository implementation for job storage and deduplication
//!
//! This module provides the persistence engine for scraped job records:
//! fuzzy-match deduplication with edit protection, batch inserts with
//! aggregated stats, the read surface consumed by the external CRUD layer,
//! scrape-log accounting and the durable scheduler configuration blob.

use anyhow::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::domain::{JobRecord, JobStatus, ScrapeLogEntry, SchedulerConfig, SearchConfig};

/// Title similarity above this ratio means "the same job"
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// Outcome of a single insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Updated,
    Skipped,
}

/// Aggregated outcome counts for a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchStats {
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl BatchStats {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Added => self.added += 1,
            InsertOutcome::Updated => self.updated += 1,
            InsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Optional field updates applied by the external CRUD layer.
///
/// Every field that is `Some` is written; any write through this struct marks
/// the row as user-edited.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub salary: Option<String>,
    pub employment_type: Option<String>,
    pub notes: Option<String>,
}

/// Filters for the job listing read surface.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub source: Option<String>,
    pub status: Option<JobStatus>,
    pub employment_type: Option<String>,
    pub is_applied: Option<bool>,
    /// Free-text match over title, description and company
    pub search: Option<String>,
}

/// Aggregate statistics over stored jobs.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub total: i64,
    pub sources: i64,
    pub companies: i64,
    pub applied: i64,
    pub edited: i64,
    pub interested: i64,
    pub interviewing: i64,
    pub contract: i64,
    pub permanent: i64,
    pub remote: i64,
    pub with_full_description: i64,
    pub ai_processed: i64,
}

/// Repository over the shared SQLite pool.
///
/// Cloning is cheap; each concurrent scrape task clones the repository and the
/// pool hands distinct connections to distinct tasks.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ===============================
    // DEDUP / INSERT
    // ===============================

    /// Normalized edit-distance ratio between two titles in [0, 1].
    fn title_similarity(a: &str, b: &str) -> f64 {
        let normalize = |s: &str| PUNCTUATION.replace_all(&s.to_lowercase(), "").to_string();
        strsim::normalized_levenshtein(&normalize(a), &normalize(b))
    }

    /// Find an existing row that is "the same job": exact company+location
    /// plus a fuzzy title match. Returns (id, is_edited).
    async fn find_duplicate(&self, job: &JobRecord) -> Result<Option<(i64, bool)>> {
        let rows = sqlx::query(
            "SELECT id, title, is_edited FROM jobs WHERE company = ? AND location = ?",
        )
        .bind(&job.company)
        .bind(&job.location)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let existing_title: String = row.get("title");
            let similarity = Self::title_similarity(&job.title, &existing_title);
            if similarity > TITLE_SIMILARITY_THRESHOLD {
                debug!(
                    "Duplicate candidate for '{}': '{}' (similarity {:.3})",
                    job.title, existing_title, similarity
                );
                return Ok(Some((row.get("id"), row.get("is_edited"))));
            }
        }
        Ok(None)
    }

    /// Insert a job with smart deduplication.
    ///
    /// A matching unedited row is refreshed in place; a matching user-edited
    /// row makes the incoming record be discarded entirely. The UNIQUE
    /// constraint on (company, title, location) backstops races between
    /// concurrent sources, collapsing them to a skipped duplicate.
    pub async fn insert_job(&self, job: &JobRecord) -> Result<(InsertOutcome, String)> {
        if let Some((existing_id, is_edited)) = self.find_duplicate(job).await? {
            if is_edited {
                // Scraper writes never clobber user edits
                return Ok((
                    InsertOutcome::Skipped,
                    "Skipped (duplicate of edited entry)".to_string(),
                ));
            }

            sqlx::query(
                r#"
                UPDATE jobs SET
                    title = ?,
                    description = ?,
                    salary = ?,
                    job_type = ?,
                    posted_date = ?,
                    url = ?,
                    source = ?,
                    scraped_at = ?,
                    employment_type = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&job.title)
            .bind(&job.description)
            .bind(&job.salary)
            .bind(&job.job_type)
            .bind(&job.posted_date)
            .bind(&job.url)
            .bind(&job.source)
            .bind(job.scraped_at)
            .bind(&job.employment_type)
            .bind(existing_id)
            .execute(&self.pool)
            .await?;

            return Ok((InsertOutcome::Updated, "Updated existing duplicate".to_string()));
        }

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs
            (title, company, location, description, salary, job_type,
             posted_date, url, source, scraped_at, employment_type, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind(&job.description)
        .bind(&job.salary)
        .bind(&job.job_type)
        .bind(&job.posted_date)
        .bind(&job.url)
        .bind(&job.source)
        .bind(job.scraped_at)
        .bind(&job.employment_type)
        .bind(job.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost a race against a sibling source inserting the exact key
            return Ok((InsertOutcome::Skipped, "Duplicate (exact match)".to_string()));
        }

        Ok((InsertOutcome::Added, "Added new job".to_string()))
    }

    /// Insert multiple jobs, aggregating per-item outcomes. A failure on one
    /// record never aborts the rest of the batch.
    pub async fn insert_jobs_batch(&self, jobs: &[JobRecord]) -> BatchStats {
        let mut stats = BatchStats::default();
        for job in jobs {
            match self.insert_job(job).await {
                Ok((outcome, _)) => stats.record(outcome),
                Err(e) => {
                    warn!("Error inserting job '{}': {}", job.title, e);
                    stats.errors += 1;
                }
            }
        }
        stats
    }

    // ===============================
    // READ SURFACE
    // ===============================

    fn map_job_row(row: &sqlx::sqlite::SqliteRow) -> JobRecord {
        JobRecord {
            id: Some(row.get("id")),
            title: row.get("title"),
            company: row.get("company"),
            location: row.get("location"),
            description: row.get("description"),
            salary: row.get("salary"),
            job_type: row.get("job_type"),
            posted_date: row.get("posted_date"),
            url: row.get("url"),
            source: row.get("source"),
            scraped_at: row.get("scraped_at"),
            employment_type: row.get("employment_type"),
            status: row.get("status"),
            is_applied: row.get("is_applied"),
            is_edited: row.get("is_edited"),
            has_full_description: row.get("has_full_description"),
            ai_processed: row.get("ai_processed"),
            cleaned_description: row.get("cleaned_description"),
            tags: row.get("tags"),
            entities: row.get("entities"),
            notes: row.get("notes"),
        }
    }

    const JOB_COLUMNS: &'static str = "id, title, company, location, description, salary, \
         job_type, posted_date, url, source, scraped_at, employment_type, status, \
         is_applied, is_edited, has_full_description, ai_processed, \
         cleaned_description, tags, entities, notes";

    pub async fn get_job(&self, job_id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            Self::JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::map_job_row))
    }

    fn filter_clauses(filter: &JobFilter) -> (String, Vec<String>) {
        let mut sql = String::new();
        let mut binds = Vec::new();

        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            binds.push(source.clone());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(employment_type) = &filter.employment_type {
            sql.push_str(" AND employment_type = ?");
            binds.push(employment_type.clone());
        }
        if let Some(applied) = filter.is_applied {
            sql.push_str(" AND is_applied = ?");
            binds.push(if applied { "1" } else { "0" }.to_string());
        }
        if let Some(search) = &filter.search {
            sql.push_str(" AND (title LIKE ? OR description LIKE ? OR company LIKE ?)");
            let term = format!("%{search}%");
            binds.push(term.clone());
            binds.push(term.clone());
            binds.push(term);
        }

        (sql, binds)
    }

    /// List jobs newest-first with optional filters and pagination.
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobRecord>> {
        let (clauses, binds) = Self::filter_clauses(filter);
        let sql = format!(
            "SELECT {} FROM jobs WHERE 1=1{} ORDER BY scraped_at DESC LIMIT ? OFFSET ?",
            Self::JOB_COLUMNS,
            clauses
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(Self::map_job_row).collect())
    }

    pub async fn count_jobs(&self, filter: &JobFilter) -> Result<i64> {
        let (clauses, binds) = Self::filter_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs WHERE 1=1{clauses}");

        let mut query = sqlx::query_scalar(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    pub async fn job_stats(&self) -> Result<JobStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(DISTINCT source) as sources,
                COUNT(DISTINCT company) as companies,
                COUNT(CASE WHEN is_applied = 1 THEN 1 END) as applied,
                COUNT(CASE WHEN is_edited = 1 THEN 1 END) as edited,
                COUNT(CASE WHEN status = 'interested' THEN 1 END) as interested,
                COUNT(CASE WHEN status = 'interviewing' THEN 1 END) as interviewing,
                COUNT(CASE WHEN employment_type = 'contract' THEN 1 END) as contract,
                COUNT(CASE WHEN employment_type = 'permanent' THEN 1 END) as permanent,
                COUNT(CASE WHEN employment_type = 'wfh' OR location LIKE '%Remote%' THEN 1 END) as remote,
                COUNT(CASE WHEN has_full_description = 1 THEN 1 END) as with_full_description,
                COUNT(CASE WHEN ai_processed = 1 THEN 1 END) as ai_processed
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(JobStats {
            total: row.get("total"),
            sources: row.get("sources"),
            companies: row.get("companies"),
            applied: row.get("applied"),
            edited: row.get("edited"),
            interested: row.get("interested"),
            interviewing: row.get("interviewing"),
            contract: row.get("contract"),
            permanent: row.get("permanent"),
            remote: row.get("remote"),
            with_full_description: row.get("with_full_description"),
            ai_processed: row.get("ai_processed"),
        })
    }

    // ===============================
    // USER MUTATIONS (set is_edited)
    // ===============================

    /// Apply user edits. Every write through here activates edit protection.
    pub async fn update_job_fields(&self, job_id: i64, update: &JobUpdate) -> Result<bool> {
        let mut sets = Vec::new();
        let mut binds = Vec::new();

        let pairs: [(&str, &Option<String>); 7] = [
            ("title", &update.title),
            ("company", &update.company),
            ("location", &update.location),
            ("description", &update.description),
            ("salary", &update.salary),
            ("employment_type", &update.employment_type),
            ("notes", &update.notes),
        ];
        for (column, value) in pairs {
            if let Some(value) = value {
                sets.push(format!("{column} = ?"));
                binds.push(value.clone());
            }
        }
        if sets.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE jobs SET {}, is_edited = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            sets.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let result = query.bind(job_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_status(&self, job_id: i64, status: JobStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, is_edited = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_applied(&self, job_id: i64, applied: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET is_applied = ?, is_edited = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(applied)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_notes(&self, job_id: i64, notes: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET notes = ?, is_edited = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(notes)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===============================
    // PIPELINE WRITE-BACKS
    // ===============================

    /// Jobs whose descriptions are card snippets rather than the full text.
    pub async fn jobs_needing_descriptions(
        &self,
        limit: i64,
        source: Option<&str>,
    ) -> Result<Vec<JobRecord>> {
        let mut sql = format!(
            "SELECT {} FROM jobs \
             WHERE has_full_description = 0 AND length(description) < 500 AND url != ''",
            Self::JOB_COLUMNS
        );
        if source.is_some() {
            sql.push_str(" AND source = ?");
        }
        sql.push_str(" ORDER BY scraped_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(source) = source {
            query = query.bind(source);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::map_job_row).collect())
    }

    /// Backfill a full description fetched from the job's own page.
    pub async fn update_job_description(&self, job_id: i64, description: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET description = ?, has_full_description = 1, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(description)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Jobs not yet run through the AI stage.
    pub async fn jobs_needing_ai(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE ai_processed = 0 ORDER BY scraped_at DESC LIMIT ?",
            Self::JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::map_job_row).collect())
    }

    /// Store AI enrichment. `location` / `salary` are only passed when the
    /// caller decided the entity backfill applies; they overwrite nothing
    /// when `None`.
    pub async fn store_ai_enrichment(
        &self,
        job_id: i64,
        cleaned_description: &str,
        tags: &str,
        entities: &str,
        location: Option<&str>,
        salary: Option<&str>,
    ) -> Result<bool> {
        let mut sql = String::from(
            "UPDATE jobs SET ai_processed = 1, cleaned_description = ?, tags = ?, entities = ?",
        );
        if location.is_some() {
            sql.push_str(", location = ?");
        }
        if salary.is_some() {
            sql.push_str(", salary = ?");
        }
        sql.push_str(", updated_at = CURRENT_TIMESTAMP WHERE id = ?");

        let mut query = sqlx::query(&sql)
            .bind(cleaned_description)
            .bind(tags)
            .bind(entities);
        if let Some(location) = location {
            query = query.bind(location);
        }
        if let Some(salary) = salary {
            query = query.bind(salary);
        }
        let result = query.bind(job_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ===============================
    // SEARCH CONFIGS
    // ===============================

    fn map_config_row(row: &sqlx::sqlite::SqliteRow) -> SearchConfig {
        SearchConfig {
            id: Some(row.get("id")),
            name: row.get("name"),
            keywords: row.get("keywords"),
            location: row.get("location"),
            radius: row.get::<i64, _>("radius") as u32,
            employment_types: row.get("employment_types"),
            enabled: row.get("enabled"),
        }
    }

    pub async fn search_configs(&self, enabled_only: bool) -> Result<Vec<SearchConfig>> {
        let mut sql = String::from(
            "SELECT id, name, keywords, location, radius, employment_types, enabled FROM search_configs",
        );
        if enabled_only {
            sql.push_str(" WHERE enabled = 1");
        }
        sql.push_str(" ORDER BY name");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::map_config_row).collect())
    }

    pub async fn search_config(&self, config_id: i64) -> Result<Option<SearchConfig>> {
        let row = sqlx::query(
            "SELECT id, name, keywords, location, radius, employment_types, enabled \
             FROM search_configs WHERE id = ?",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::map_config_row))
    }

    pub async fn create_search_config(&self, config: &SearchConfig) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO search_configs (name, keywords, location, radius, employment_types, enabled) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.name)
        .bind(&config.keywords)
        .bind(&config.location)
        .bind(config.radius as i64)
        .bind(&config.employment_types)
        .bind(config.enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_search_config(&self, config_id: i64, config: &SearchConfig) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE search_configs SET name = ?, keywords = ?, location = ?, radius = ?, \
             employment_types = ?, enabled = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&config.name)
        .bind(&config.keywords)
        .bind(&config.location)
        .bind(config.radius as i64)
        .bind(&config.employment_types)
        .bind(config.enabled)
        .bind(config_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_search_config(&self, config_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM search_configs WHERE id = ?")
            .bind(config_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ===============================
    // SCRAPE LOG / RATE ACCOUNTING
    // ===============================

    /// Append a scrape run to the log. The log is never updated afterwards.
    pub async fn log_scrape(&self, entry: &ScrapeLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO scrape_log \
             (source, search_config_id, jobs_found, jobs_added, started_at, completed_at, success, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.source)
        .bind(entry.search_config_id)
        .bind(entry.jobs_found)
        .bind(entry.jobs_added)
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .bind(entry.success)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_scrape_log(&self, limit: i64) -> Result<Vec<ScrapeLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, source, search_config_id, jobs_found, jobs_added, \
             started_at, completed_at, success, error_message \
             FROM scrape_log ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ScrapeLogEntry {
                id: Some(row.get("id")),
                source: row.get("source"),
                search_config_id: row.get("search_config_id"),
                jobs_found: row.get("jobs_found"),
                jobs_added: row.get("jobs_added"),
                started_at: row.get("started_at"),
                completed_at: row.get("completed_at"),
                success: row.get("success"),
                error_message: row.get("error_message"),
            })
            .collect())
    }

    /// How many scrape runs this source logged in the last hour.
    pub async fn scrape_count_last_hour(&self, source: &str) -> Result<i64> {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scrape_log WHERE source = ? AND started_at >= ?",
        )
        .bind(source)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Whether scraping this source should be blocked by rate accounting.
    ///
    /// The count above is informational only; fetch-layer pacing is the real
    /// site throttle, so no hard block is ever applied here. AI-key quota, in
    /// contrast, is strictly enforced in the key pool.
    pub async fn is_rate_limited(&self, _source: &str) -> Result<bool> {
        Ok(false)
    }

    /// Clear rate accounting for one source, or for all when `None`.
    pub async fn reset_rate_accounting(&self, source: Option<&str>) -> Result<u64> {
        let result = match source {
            Some(source) => {
                sqlx::query("DELETE FROM scrape_log WHERE source = ?")
                    .bind(source)
                    .execute(&self.pool)
                    .await?
            }
            None => sqlx::query("DELETE FROM scrape_log").execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    // ===============================
    // SCHEDULER CONFIG
    // ===============================

    /// Load the durable scheduler configuration, defaulting when absent or
    /// unreadable.
    pub async fn load_scheduler_config(&self) -> Result<SchedulerConfig> {
        let row = sqlx::query("SELECT config_json FROM scheduler_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("config_json");
                match serde_json::from_str(&raw) {
                    Ok(config) => Ok(config),
                    Err(e) => {
                        warn!("Unreadable scheduler config, using defaults: {}", e);
                        Ok(SchedulerConfig::default())
                    }
                }
            }
            None => Ok(SchedulerConfig::default()),
        }
    }

    pub async fn save_scheduler_config(&self, config: &SchedulerConfig) -> Result<()> {
        let raw = serde_json::to_string(config)?;
        sqlx::query(
            "INSERT OR REPLACE INTO scheduler_config (id, config_json, updated_at) \
             VALUES (1, ?, CURRENT_TIMESTAMP)",
        )
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Timestamp helper used when aggregating per-run log entries.
pub fn log_entry_for_run(
    source: &str,
    config_id: Option<i64>,
    started_at: DateTime<Utc>,
    found: i64,
    added: i64,
    error: Option<String>,
) -> ScrapeLogEntry {
    ScrapeLogEntry {
        id: None,
        source: source.to_string(),
        search_config_id: config_id,
        jobs_found: found,
        jobs_added: added,
        started_at,
        completed_at: Some(Utc::now()),
        success: error.is_none(),
        error_message: error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    async fn test_repo() -> (tempfile::TempDir, JobRepository) {
        let dir = tempdir().unwrap();
        let db = DatabaseConnection::new(&dir.path().join("test.db")).await.unwrap();
        db.migrate().await.unwrap();
        let repo = JobRepository::new(db.pool().clone());
        (dir, repo)
    }

    fn sample_job(title: &str) -> JobRecord {
        JobRecord::scraped(
            title,
            "Acme Ltd",
            "Manchester",
            "Build data pipelines in Python on Azure.",
            "https://example.com/jobs/1",
            "reed",
        )
    }

    #[test]
    fn similarity_is_case_and_punctuation_insensitive() {
        let s = JobRepository::title_similarity("Senior Python Developer!", "senior python developer");
        assert!(s > 0.99);
        let far = JobRepository::title_similarity("Python Developer", "Forklift Driver");
        assert!(far < 0.5);
    }

    #[tokio::test]
    async fn fuzzy_duplicate_collapses_to_one_row() {
        let (_dir, repo) = test_repo().await;

        let (outcome, _) = repo.insert_job(&sample_job("Senior Python Developer")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Added);

        // Near-identical title, same company+location: refreshes in place
        let (outcome, _) = repo.insert_job(&sample_job("Senior Python Developer!")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Updated);

        assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dissimilar_titles_stay_separate() {
        let (_dir, repo) = test_repo().await;

        repo.insert_job(&sample_job("Senior Python Developer")).await.unwrap();
        let (outcome, _) = repo.insert_job(&sample_job("DevOps Platform Engineer")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Added);

        assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reinserting_same_record_is_idempotent() {
        let (_dir, repo) = test_repo().await;

        let job = sample_job("Python Developer");
        let (first, _) = repo.insert_job(&job).await.unwrap();
        assert_eq!(first, InsertOutcome::Added);

        let (second, reason) = repo.insert_job(&job).await.unwrap();
        // A byte-identical re-insert is a refresh of the same row
        assert_eq!(second, InsertOutcome::Updated);
        assert!(reason.contains("duplicate"));
        assert_eq!(repo.count_jobs(&JobFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn edited_rows_are_never_clobbered() {
        let (_dir, repo) = test_repo().await;

        repo.insert_job(&sample_job("Python Developer")).await.unwrap();
        let stored = repo.list_jobs(&JobFilter::default(), 10, 0).await.unwrap();
        let id = stored[0].id.unwrap();

        repo.update_notes(id, "spoke to recruiter").await.unwrap();
        let before = repo.get_job(id).await.unwrap().unwrap();
        assert!(before.is_edited);

        let mut incoming = sample_job("Python Developer");
        incoming.description = "completely different scraped text".to_string();
        incoming.salary = Some("£90k".to_string());
        let (outcome, reason) = repo.insert_job(&incoming).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Skipped);
        assert!(reason.contains("edited"));

        let after = repo.get_job(id).await.unwrap().unwrap();
        assert_eq!(after.description, before.description);
        assert_eq!(after.salary, before.salary);
        assert_eq!(after.notes, before.notes);
        assert_eq!(after.scraped_at, before.scraped_at);
    }

    #[tokio::test]
    async fn exact_key_race_maps_to_skipped() {
        let (_dir, repo) = test_repo().await;

        // Same (company, title, location) but a title the similarity check
        // would pass anyway; simulate the race by deleting candidates from
        // the fuzzy path: insert directly twice.
        let job = sample_job("Python Developer");
        repo.insert_job(&job).await.unwrap();

        // Force the raw INSERT path: different location first so the fuzzy
        // lookup misses, then collide on the unique key.
        let mut other = job.clone();
        other.location = "Leeds".to_string();
        repo.insert_job(&other).await.unwrap();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO jobs (title, company, location, description, url, source, scraped_at, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'new')",
        )
        .bind(&job.title)
        .bind(&job.company)
        .bind(&job.location)
        .bind("x")
        .bind("u")
        .bind("reed")
        .bind(job.scraped_at)
        .execute(&repo.pool)
        .await
        .unwrap();
        assert_eq!(result.rows_affected(), 0);
    }

    #[tokio::test]
    async fn batch_insert_aggregates_outcomes() {
        let (_dir, repo) = test_repo().await;

        let jobs = vec![
            sample_job("Python Developer"),
            sample_job("Python Developer"),
            sample_job("Cloud Architect"),
        ];
        let stats = repo.insert_jobs_batch(&jobs).await;
        assert_eq!(stats.added, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn description_backfill_targets_short_unfilled_rows() {
        let (_dir, repo) = test_repo().await;

        repo.insert_job(&sample_job("Python Developer")).await.unwrap();
        let pending = repo.jobs_needing_descriptions(10, None).await.unwrap();
        assert_eq!(pending.len(), 1);

        let id = pending[0].id.unwrap();
        repo.update_job_description(id, &"long text ".repeat(100)).await.unwrap();

        assert!(repo.jobs_needing_descriptions(10, None).await.unwrap().is_empty());
        let job = repo.get_job(id).await.unwrap().unwrap();
        assert!(job.has_full_description);
        // A pipeline write-back is not a user edit
        assert!(!job.is_edited);
    }

    #[tokio::test]
    async fn ai_enrichment_marks_processed_and_backfills() {
        let (_dir, repo) = test_repo().await;

        let mut job = sample_job("Python Developer");
        job.location = "Unknown".to_string();
        repo.insert_job(&job).await.unwrap();
        let id = repo.list_jobs(&JobFilter::default(), 1, 0).await.unwrap()[0].id.unwrap();

        repo.store_ai_enrichment(
            id,
            "# Cleaned",
            r#"["Python","Remote"]"#,
            r#"{"locations":["Manchester"]}"#,
            Some("Manchester"),
            None,
        )
        .await
        .unwrap();

        let job = repo.get_job(id).await.unwrap().unwrap();
        assert!(job.ai_processed);
        assert_eq!(job.location, "Manchester");
        assert!(repo.jobs_needing_ai(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_accounting_counts_and_resets() {
        let (_dir, repo) = test_repo().await;

        repo.log_scrape(&ScrapeLogEntry::completed("reed", None, 10, 5)).await.unwrap();
        repo.log_scrape(&ScrapeLogEntry::failed("reed", None, "blocked")).await.unwrap();
        repo.log_scrape(&ScrapeLogEntry::completed("indeed", None, 3, 3)).await.unwrap();

        assert_eq!(repo.scrape_count_last_hour("reed").await.unwrap(), 2);
        // Site-side rate limiting is informational only
        assert!(!repo.is_rate_limited("reed").await.unwrap());

        assert_eq!(repo.reset_rate_accounting(Some("reed")).await.unwrap(), 2);
        assert_eq!(repo.scrape_count_last_hour("reed").await.unwrap(), 0);
        assert_eq!(repo.scrape_count_last_hour("indeed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scheduler_config_round_trips() {
        let (_dir, repo) = test_repo().await;

        assert_eq!(repo.load_scheduler_config().await.unwrap(), SchedulerConfig::default());

        let config = SchedulerConfig {
            enabled: true,
            ai_interval_minutes: 5,
            ..SchedulerConfig::default()
        };
        repo.save_scheduler_config(&config).await.unwrap();
        assert_eq!(repo.load_scheduler_config().await.unwrap(), config);
    }
}
