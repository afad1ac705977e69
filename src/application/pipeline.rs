//! Pipeline command surface
//!
//! The verbs the external orchestration/CRUD layer issues against the core:
//! trigger a scrape, refresh descriptions, run an AI pass, plus the small
//! read/reset operations around them. Every command returns a structured
//! result; no fault inside one source or job aborts its siblings.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::context::AppContext;
use crate::application::scheduler::StageProgress;
use crate::domain::SearchConfig;
use crate::infrastructure::ai::ProgressCallback;
use crate::infrastructure::browser::BrowserSession;
use crate::infrastructure::config::{FetchConfig, ScrapingConfig};
use crate::infrastructure::description_fetcher::DescriptionFetcher;
use crate::infrastructure::job_repository::{log_entry_for_run, JobRepository};
use crate::scrapers::{profile_for, SiteProfile, SiteScraper};

pub use crate::infrastructure::ai::AiBatchStats as AiPassResult;

/// Per-source outcome of one scrape trigger.
#[derive(Debug, Clone, Serialize)]
pub struct SourceScrapeResult {
    pub source: String,
    pub found: u32,
    pub added: u32,
    pub error: Option<String>,
}

/// Outcome of one description-refresh trigger.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DescriptionRefreshResult {
    pub updated: u32,
    pub failed: u32,
}

/// Informational rate-accounting snapshot for one source.
#[derive(Debug, Clone, Serialize)]
pub struct RateStatus {
    pub source: String,
    pub scrapes_last_hour: i64,
    pub limited: bool,
}

impl AppContext {
    /// Scrape the given sources against the enabled search configs
    /// (optionally narrowed to specific config ids). Sources run
    /// concurrently, each with its own browser session and store connection;
    /// results interleave and reconcile only through the dedup engine.
    pub async fn run_scrape(
        &self,
        sources: &[String],
        config_ids: Option<&[i64]>,
        max_pages: Option<usize>,
    ) -> Result<Vec<SourceScrapeResult>> {
        let mut configs = self.repository().search_configs(true).await?;
        if let Some(ids) = config_ids {
            configs.retain(|config| config.id.is_some_and(|id| ids.contains(&id)));
        }
        if configs.is_empty() {
            return Err(anyhow!("no enabled search configurations"));
        }

        let mut scraping = self.config().scraping.clone();
        if let Some(max_pages) = max_pages {
            scraping.max_pages = max_pages;
        }

        let mut results = Vec::with_capacity(sources.len());
        let mut handles = Vec::new();

        for source in sources {
            match profile_for(source) {
                Some(profile) => {
                    let handle = tokio::spawn(scrape_source(
                        profile,
                        configs.clone(),
                        self.repository().clone(),
                        self.config().fetch.clone(),
                        scraping.clone(),
                    ));
                    handles.push((source.clone(), handle));
                }
                None => {
                    warn!("Unknown source requested: {}", source);
                    results.push(SourceScrapeResult {
                        source: source.clone(),
                        found: 0,
                        added: 0,
                        error: Some("unknown source".to_string()),
                    });
                }
            }
        }

        for (source, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(SourceScrapeResult {
                    source,
                    found: 0,
                    added: 0,
                    error: Some(format!("scrape task aborted: {e}")),
                }),
            }
        }

        Ok(results)
    }

    /// Backfill full descriptions, newest first. `job_id` narrows the pass to
    /// a single record; otherwise up to `limit` short-description jobs from
    /// `source` (or all sources) are refreshed.
    pub async fn refresh_descriptions(
        &self,
        source: Option<&str>,
        limit: Option<i64>,
        job_id: Option<i64>,
        progress: Option<&StageProgress>,
    ) -> Result<DescriptionRefreshResult> {
        let jobs = match job_id {
            Some(id) => self.repository().get_job(id).await?.into_iter().collect(),
            None => {
                let limit = limit.unwrap_or(self.config().descriptions.batch_limit);
                self.repository().jobs_needing_descriptions(limit, source).await?
            }
        };

        let total = jobs.len() as u32;
        info!("📄 Refreshing descriptions for {} job(s)", total);
        let fetcher = DescriptionFetcher::new(&self.config().descriptions);
        let mut result = DescriptionRefreshResult::default();

        for (index, job) in jobs.into_iter().enumerate() {
            let Some(id) = job.id else { continue };

            if job.url.is_empty() {
                warn!("Skipping '{}' - no URL", job.title);
                result.failed += 1;
                continue;
            }

            match fetcher.fetch_description(&job.url, Some(&job.source)).await {
                Some(description) => {
                    match self.repository().update_job_description(id, &description).await {
                        Ok(_) => result.updated += 1,
                        Err(e) => {
                            warn!("Could not store description for '{}': {}", job.title, e);
                            result.failed += 1;
                        }
                    }
                }
                None => result.failed += 1,
            }

            if let Some(progress) = progress {
                progress.update(index as u32 + 1, total, &job.title).await;
            }
        }

        info!(
            "📄 Description refresh done: {} updated, {} failed",
            result.updated, result.failed
        );
        Ok(result)
    }

    /// Run the AI enrichment pass over unprocessed jobs, or one specific job.
    pub async fn run_ai_pass(
        &self,
        limit: Option<i64>,
        job_id: Option<i64>,
        progress: Option<&StageProgress>,
    ) -> Result<AiPassResult> {
        let jobs = match job_id {
            Some(id) => self.repository().get_job(id).await?.into_iter().collect(),
            None => {
                let limit = limit.unwrap_or(self.config().ai.batch_limit);
                self.repository().jobs_needing_ai(limit).await?
            }
        };

        let callback = progress.cloned().map(|handle| -> ProgressCallback {
            Arc::new(move |done, total, title| handle.update_sync(done, total, title))
        });

        Ok(self.ai().process_batch(self.repository(), jobs, callback).await)
    }

    /// Informational rate-accounting snapshot. The shipped policy never
    /// reports a hard limit for site scraping; fetch-layer pacing is the only
    /// real throttle.
    pub async fn rate_status(&self, source: &str) -> Result<RateStatus> {
        Ok(RateStatus {
            source: source.to_string(),
            scrapes_last_hour: self.repository().scrape_count_last_hour(source).await?,
            limited: self.repository().is_rate_limited(source).await?,
        })
    }

    /// Clear rate accounting for one source or all of them.
    pub async fn reset_rate_accounting(&self, source: Option<&str>) -> Result<u64> {
        self.repository().reset_rate_accounting(source).await
    }
}

/// One source's scrape run: its own browser session, its own pooled store
/// connection, every enabled config in sequence. Never panics out; every
/// failure folds into the result and the scrape log.
async fn scrape_source(
    profile: &'static SiteProfile,
    configs: Vec<SearchConfig>,
    repository: JobRepository,
    fetch: FetchConfig,
    scraping: ScrapingConfig,
) -> SourceScrapeResult {
    let mut result = SourceScrapeResult {
        source: profile.name.to_string(),
        found: 0,
        added: 0,
        error: None,
    };

    let selector_timeout = Duration::from_secs(fetch.selector_timeout_secs);
    let mut session = match BrowserSession::launch(fetch).await {
        Ok(session) => session,
        Err(e) => {
            warn!("[{}] Browser launch failed: {}", profile.name, e);
            result.error = Some(format!("browser launch failed: {e}"));
            return result;
        }
    };

    for config in &configs {
        let started_at = Utc::now();
        info!(
            "[{}] Scraping config '{}' ({} in {})",
            profile.name, config.name, config.keywords, config.location
        );

        let incremental = scraping.save_incrementally.then_some(&repository);
        let mut scraper = SiteScraper::new(&mut session, profile, incremental, selector_timeout);
        let outcome = scraper
            .search_jobs(
                &config.keywords,
                &config.location,
                config.radius,
                &config.employment_type_list(),
                scraping.max_pages,
            )
            .await;

        let log_entry = match outcome {
            Ok(outcome) => {
                let found = outcome.jobs.len() as i64;
                let stats = if scraping.save_incrementally {
                    outcome.stats
                } else {
                    repository.insert_jobs_batch(&outcome.jobs).await
                };
                result.found += found as u32;
                result.added += stats.added;
                log_entry_for_run(
                    profile.name,
                    config.id,
                    started_at,
                    found,
                    stats.added as i64,
                    None,
                )
            }
            Err(e) => {
                warn!("[{}] Config '{}' failed: {}", profile.name, config.name, e);
                result.error = Some(e.to_string());
                log_entry_for_run(profile.name, config.id, started_at, 0, 0, Some(e.to_string()))
            }
        };

        if let Err(e) = repository.log_scrape(&log_entry).await {
            warn!("[{}] Could not write scrape log: {}", profile.name, e);
        }
    }

    session.close().await;
    result
}
