//! Pagination engine shared by every source adapter
//!
//! One engine runs the same loop over any [`SiteProfile`]: navigate the
//! search URL, wait for cards, extract them with first-match-wins selector
//! cascades, optionally persist each record immediately, then walk the
//! next-page control until the cap or a benign termination. All HTML parsing
//! is pure over `scraper::Html` so fixture documents drive the tests, and is
//! kept in synchronous scopes (parsed documents never cross an await).

use std::time::Duration;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::domain::{EmploymentType, JobRecord};
use crate::infrastructure::browser::Navigator;
use crate::infrastructure::job_repository::{BatchStats, JobRepository};
use crate::scrapers::profile::SiteProfile;

/// What one search run produced.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub jobs: Vec<JobRecord>,
    /// Populated when saving incrementally
    pub stats: BatchStats,
}

/// Next-page control state found on the current page.
#[derive(Debug, PartialEq, Eq)]
enum NextControl {
    Missing,
    Disabled,
    Enabled {
        selector: &'static str,
        href: Option<String>,
    },
}

/// Everything extracted from one rendered listing page in a single
/// synchronous pass.
struct PageExtract {
    jobs: Vec<JobRecord>,
    next: NextControl,
}

/// The shared pagination engine.
pub struct SiteScraper<'a, N: Navigator> {
    navigator: &'a mut N,
    profile: &'static SiteProfile,
    /// When set, each record is persisted as it is extracted
    repository: Option<&'a JobRepository>,
    selector_timeout: Duration,
}

impl<'a, N: Navigator> SiteScraper<'a, N> {
    pub fn new(
        navigator: &'a mut N,
        profile: &'static SiteProfile,
        repository: Option<&'a JobRepository>,
        selector_timeout: Duration,
    ) -> Self {
        Self {
            navigator,
            profile,
            repository,
            selector_timeout,
        }
    }

    pub fn site_name(&self) -> &'static str {
        self.profile.name
    }

    /// Run one search across up to `max_pages` result pages.
    ///
    /// Failing to load the first page is an error for this source; anything
    /// that goes wrong during pagination afterwards terminates the loop
    /// benignly, since transient errors there conflate with anti-bot
    /// throttling organically ending the session.
    pub async fn search_jobs(
        &mut self,
        keywords: &str,
        location: &str,
        radius: u32,
        employment_types: &[EmploymentType],
        max_pages: usize,
    ) -> Result<ScrapeOutcome> {
        let mut outcome = ScrapeOutcome::default();

        let search_url = self
            .profile
            .search_url(keywords, location, radius, employment_types);
        info!(
            "🔍 [{}] Searching '{}' in {}",
            self.profile.name, keywords, location
        );

        if !self.navigator.navigate(&search_url).await {
            return Err(anyhow!("failed to load search page for {}", self.profile.name));
        }

        for page_num in 1..=max_pages {
            if !self
                .navigator
                .wait_for_any(self.profile.card_selectors, self.selector_timeout)
                .await
            {
                info!("[{}] No more jobs found on page {}", self.profile.name, page_num);
                break;
            }

            let html = match self.navigator.content().await {
                Ok(html) => html,
                Err(e) => {
                    warn!("[{}] Could not read page {}: {}", self.profile.name, page_num, e);
                    break;
                }
            };

            // Parse in a sync scope; the document must not cross an await
            let extract = {
                let document = Html::parse_document(&html);
                PageExtract {
                    jobs: extract_cards(&document, self.profile),
                    next: find_next_page(&document, self.profile),
                }
            };

            info!(
                "[{}] Found {} job cards on page {}",
                self.profile.name,
                extract.jobs.len(),
                page_num
            );
            if extract.jobs.is_empty() {
                break;
            }

            for job in extract.jobs {
                if let Some(repository) = self.repository {
                    match repository.insert_job(&job).await {
                        Ok((insert_outcome, _)) => {
                            outcome.stats.record(insert_outcome);
                            debug!("[{}] {:?}: {} at {}", self.profile.name, insert_outcome, job.title, job.company);
                        }
                        Err(e) => {
                            warn!("[{}] Error saving '{}': {}", self.profile.name, job.title, e);
                            outcome.stats.errors += 1;
                        }
                    }
                }
                outcome.jobs.push(job);
            }

            match extract.next {
                NextControl::Missing => {
                    info!("[{}] No next page control, stopping at page {}", self.profile.name, page_num);
                    break;
                }
                NextControl::Disabled => {
                    info!("[{}] Next control disabled, stopping at page {}", self.profile.name, page_num);
                    break;
                }
                NextControl::Enabled { selector, href } => {
                    if page_num == max_pages {
                        info!("[{}] Page cap reached at {}", self.profile.name, page_num);
                        break;
                    }
                    debug!("[{}] Moving to page {}", self.profile.name, page_num + 1);
                    let moved = match href {
                        Some(href) => {
                            let absolute = self.profile.absolutize(&href);
                            self.navigator.navigate(&absolute).await
                        }
                        // No href: fall back to clicking the control
                        None => self.navigator.click(selector).await.is_ok(),
                    };
                    if !moved {
                        info!(
                            "[{}] Pagination ended at page {} (navigation declined)",
                            self.profile.name, page_num
                        );
                        break;
                    }
                }
            }
        }

        info!(
            "[{}] Scrape complete: {} jobs ({} added, {} updated, {} skipped)",
            self.profile.name,
            outcome.jobs.len(),
            outcome.stats.added,
            outcome.stats.updated,
            outcome.stats.skipped
        );
        Ok(outcome)
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

/// First matching element for any candidate selector.
fn select_first<'h>(scope: ElementRef<'h>, candidates: &[&str]) -> Option<ElementRef<'h>> {
    for candidate in candidates {
        if let Some(selector) = parse_selector(candidate) {
            if let Some(element) = scope.select(&selector).next() {
                return Some(element);
            }
        }
    }
    None
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first matching candidate, if non-empty.
fn select_text(scope: ElementRef<'_>, candidates: &[&str]) -> Option<String> {
    select_first(scope, candidates)
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Infer the canonical employment type from explicit type text, then from
/// location wording. Absence is fine; inference is best effort.
fn infer_employment_type(type_text: Option<&str>, location: &str) -> Option<String> {
    if let Some(text) = type_text {
        let lower = text.to_lowercase();
        if lower.contains("contract") {
            return Some("contract".to_string());
        }
        if lower.contains("permanent") || lower.contains("perm") {
            return Some("permanent".to_string());
        }
        if lower.contains("temp") {
            return Some("temporary".to_string());
        }
    }

    let location_lower = location.to_lowercase();
    if location_lower.contains("remote")
        || location_lower.contains("home")
        || location_lower.contains("wfh")
        || location_lower.contains("hybrid")
    {
        return Some("wfh".to_string());
    }

    None
}

/// Salary fields sometimes match generic metadata snippets; require at least
/// one digit or a currency marker before trusting them.
fn looks_like_salary(text: &str) -> bool {
    text.contains('£') || text.chars().any(|c| c.is_ascii_digit())
}

/// Extract every card on the page. A card with no recognizable title is
/// dropped silently; other missing fields degrade to sentinels.
fn extract_cards(document: &Html, profile: &SiteProfile) -> Vec<JobRecord> {
    let mut jobs = Vec::new();

    for card_selector in profile.card_selectors {
        let Some(selector) = parse_selector(card_selector) else {
            continue;
        };

        for card in document.select(&selector) {
            if let Some(job) = extract_card(card, profile) {
                jobs.push(job);
            }
        }

        // Card candidates are alternatives for differing templates, not
        // additive: the first selector that yields anything wins.
        if !jobs.is_empty() {
            break;
        }
    }

    jobs
}

fn extract_card(card: ElementRef<'_>, profile: &SiteProfile) -> Option<JobRecord> {
    let title_element = select_first(card, profile.title_selectors)?;
    let title = element_text(title_element);
    if title.is_empty() {
        return None;
    }

    let href = title_element
        .value()
        .attr("href")
        .map(|href| profile.absolutize(href))
        .unwrap_or_default();

    let company =
        select_text(card, profile.company_selectors).unwrap_or_else(|| "Unknown".to_string());
    let location =
        select_text(card, profile.location_selectors).unwrap_or_else(|| "Unknown".to_string());
    let salary = select_text(card, profile.salary_selectors)
        .filter(|text| looks_like_salary(text));
    let description = select_text(card, profile.snippet_selectors).unwrap_or_default();
    let posted_date = select_text(card, profile.posted_selectors);
    let job_type = select_text(card, profile.job_type_selectors);

    let employment_type = infer_employment_type(job_type.as_deref(), &location);

    Some(
        JobRecord::scraped(title, company, location, description, href, profile.name)
            .with_salary(salary)
            .with_job_type(job_type)
            .with_posted_date(posted_date)
            .with_employment_type(employment_type),
    )
}

/// Locate the next-page control and work out whether it is usable.
fn find_next_page(document: &Html, profile: &SiteProfile) -> NextControl {
    for &candidate in profile.next_page_selectors {
        let Some(selector) = parse_selector(candidate) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let aria_disabled = element.value().attr("aria-disabled") == Some("true");
            let class_disabled = element
                .value()
                .attr("class")
                .map(|classes| classes.to_lowercase().contains("disabled"))
                .unwrap_or(false);
            if aria_disabled || class_disabled {
                return NextControl::Disabled;
            }

            return NextControl::Enabled {
                selector: candidate,
                href: element.value().attr("href").map(str::to_string),
            };
        }
    }
    NextControl::Missing
}
