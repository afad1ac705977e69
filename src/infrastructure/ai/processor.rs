//! Parallel AI enrichment over the chat-completions endpoint
//!
//! A semaphore-bounded worker pool keeps several jobs in flight while the
//! key pool serializes each credential against its quota; pool width is
//! deliberately decoupled from the key count since network latency dominates.
//! Results are written back per job as they land, and no job's failure ever
//! aborts its siblings.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::domain::JobRecord;
use crate::infrastructure::ai::key_pool::{AiError, KeyPool};
use crate::infrastructure::ai::prompts;
use crate::infrastructure::config::AiConfig;
use crate::infrastructure::job_repository::JobRepository;

/// A description shorter than this carries too little signal to enrich.
const MIN_DESCRIPTION_CHARS: usize = 50;

/// Aggregated outcome of one AI pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AiBatchStats {
    pub processed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Progress hook: (done, total, current job title).
pub type ProgressCallback = Arc<dyn Fn(u32, u32, &str) + Send + Sync>;

#[derive(Debug, PartialEq, Eq)]
enum JobOutcome {
    Processed,
    Skipped,
    Failed,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

/// The structured payload the model is asked for.
#[derive(Debug, Deserialize)]
struct Enrichment {
    cleaned_description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    entities: serde_json::Map<String, serde_json::Value>,
}

/// The AI enrichment engine.
#[derive(Clone)]
pub struct AiProcessor {
    client: reqwest::Client,
    config: Arc<AiConfig>,
    key_pool: Arc<KeyPool>,
}

impl AiProcessor {
    pub fn new(config: AiConfig) -> Self {
        let window = Duration::from_secs(60);
        let key_pool = if config.api_keys.is_empty() {
            KeyPool::from_env(config.requests_per_key_per_minute, window)
        } else {
            KeyPool::new(
                config.api_keys.clone(),
                config.requests_per_key_per_minute,
                window,
            )
        };

        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
            key_pool: Arc::new(key_pool),
        }
    }

    pub fn key_pool(&self) -> &KeyPool {
        &self.key_pool
    }

    /// Enrich a batch on the worker pool, persisting each result as it
    /// completes. Per-job failures are folded into the stats, never raised.
    pub async fn process_batch(
        &self,
        repository: &JobRepository,
        jobs: Vec<JobRecord>,
        progress: Option<ProgressCallback>,
    ) -> AiBatchStats {
        let total = jobs.len() as u32;
        if total == 0 {
            return AiBatchStats::default();
        }
        info!("🤖 AI pass over {} job(s)", total);

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let processed = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));
        let skipped = Arc::new(AtomicU32::new(0));
        let done = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let permit = semaphore.clone().acquire_owned();
            let this = self.clone();
            let repository = repository.clone();
            let progress = progress.clone();
            let processed = processed.clone();
            let failed = failed.clone();
            let skipped = skipped.clone();
            let done = done.clone();

            let handle = tokio::spawn(async move {
                let _permit = match permit.await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let outcome = this.process_job(&repository, &job).await;
                match outcome {
                    JobOutcome::Processed => processed.fetch_add(1, Ordering::Relaxed),
                    JobOutcome::Skipped => skipped.fetch_add(1, Ordering::Relaxed),
                    JobOutcome::Failed => failed.fetch_add(1, Ordering::Relaxed),
                };

                let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(callback) = &progress {
                    callback(count, total, &job.title);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        let stats = AiBatchStats {
            processed: processed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
        };
        info!(
            "🤖 AI pass done: {} processed, {} failed, {} skipped",
            stats.processed, stats.failed, stats.skipped
        );
        stats
    }

    async fn process_job(&self, repository: &JobRepository, job: &JobRecord) -> JobOutcome {
        let Some(job_id) = job.id else {
            warn!("AI pass handed an unstored job: {}", job.title);
            return JobOutcome::Failed;
        };

        if job.description.len() < MIN_DESCRIPTION_CHARS {
            debug!("Skipping job {} - description too short", job_id);
            return JobOutcome::Skipped;
        }

        let enrichment = match self.call_model(job).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!("AI enrichment failed for job {}: {}", job_id, e);
                return JobOutcome::Failed;
            }
        };

        let cleaned = enrichment
            .cleaned_description
            .unwrap_or_else(|| job.description.clone());
        let tags = serde_json::to_string(&enrichment.tags).unwrap_or_else(|_| "[]".to_string());
        let entities = serde_json::Value::Object(enrichment.entities.clone());

        let location_backfill = entity_location(&enrichment.entities)
            .filter(|_| should_backfill(&job.location));
        let salary_backfill = entity_salary(&enrichment.entities).filter(|_| {
            job.salary
                .as_deref()
                .map(should_backfill)
                .unwrap_or(true)
        });

        match repository
            .store_ai_enrichment(
                job_id,
                &cleaned,
                &tags,
                &entities.to_string(),
                location_backfill.as_deref(),
                salary_backfill.as_deref(),
            )
            .await
        {
            Ok(_) => JobOutcome::Processed,
            Err(e) => {
                warn!("Failed to store AI enrichment for job {}: {}", job_id, e);
                JobOutcome::Failed
            }
        }
    }

    async fn call_model(&self, job: &JobRecord) -> Result<Enrichment, AiError> {
        let key = self
            .key_pool
            .acquire(Duration::from_secs(self.config.max_key_wait_secs))
            .await?;

        let user = prompts::user_prompt(&job.title, &job.company, &job.description);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompts::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AiError::Request(format!("status {}", response.status())));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| AiError::Request("empty choices".to_string()))?;

        parse_enrichment(content)
    }
}

/// Strip a ``` / ```json fence if the model wrapped its output anyway.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse the model output. Malformed JSON fails the job; the raw response is
/// kept in the logs for diagnosis, never surfaced to the user.
fn parse_enrichment(raw: &str) -> Result<Enrichment, AiError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|e| {
        warn!("Unparseable AI response ({}): {}", e, raw);
        AiError::MalformedResponse(e.to_string())
    })
}

/// A field qualifies for backfill only when it carries no real value.
fn should_backfill(current: &str) -> bool {
    let trimmed = current.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown")
}

fn entity_location(entities: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    entities
        .get("locations")?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
        .filter(|location| !location.is_empty())
}

fn entity_salary(entities: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    match entities.get("salary_info")? {
        serde_json::Value::String(salary) if !salary.is_empty() => Some(salary.clone()),
        serde_json::Value::Array(values) => values
            .first()
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .filter(|salary| !salary.is_empty()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parses_full_enrichment() {
        let raw = r#"{
            "cleaned_description": "# Role",
            "tags": ["Python", "Remote"],
            "entities": {"locations": ["Leeds"], "salary_info": "£60k"}
        }"#;
        let enrichment = parse_enrichment(raw).unwrap();
        assert_eq!(enrichment.cleaned_description.as_deref(), Some("# Role"));
        assert_eq!(enrichment.tags, vec!["Python", "Remote"]);
        assert_eq!(entity_location(&enrichment.entities).as_deref(), Some("Leeds"));
        assert_eq!(entity_salary(&enrichment.entities).as_deref(), Some("£60k"));
    }

    #[test]
    fn missing_fields_default_instead_of_failing() {
        let enrichment = parse_enrichment(r#"{"cleaned_description": "x"}"#).unwrap();
        assert!(enrichment.tags.is_empty());
        assert!(enrichment.entities.is_empty());
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(matches!(
            parse_enrichment("The job looks great!"),
            Err(AiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn backfill_only_fills_unknown_fields() {
        assert!(should_backfill(""));
        assert!(should_backfill("  "));
        assert!(should_backfill("Unknown"));
        assert!(should_backfill("unknown"));
        assert!(!should_backfill("Manchester"));
    }

    #[test]
    fn salary_entity_accepts_string_or_array() {
        let parse = |raw: &str| {
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw).unwrap()
        };
        assert_eq!(
            entity_salary(&parse(r#"{"salary_info": "£500/day"}"#)).as_deref(),
            Some("£500/day")
        );
        assert_eq!(
            entity_salary(&parse(r#"{"salary_info": ["£70k", "£80k"]}"#)).as_deref(),
            Some("£70k")
        );
        assert_eq!(entity_salary(&parse(r#"{"salary_info": null}"#)), None);
        assert_eq!(entity_salary(&parse(r#"{}"#)), None);
    }

    async fn repo_with_job(description: &str) -> (tempfile::TempDir, JobRepository, JobRecord) {
        let dir = tempdir().unwrap();
        let db = DatabaseConnection::new(&dir.path().join("ai.db")).await.unwrap();
        db.migrate().await.unwrap();
        let repo = JobRepository::new(db.pool().clone());

        let job = JobRecord::scraped("Dev", "Acme", "Leeds", description, "https://x", "reed");
        repo.insert_job(&job).await.unwrap();
        let stored = repo
            .list_jobs(&Default::default(), 1, 0)
            .await
            .unwrap()
            .remove(0);
        (dir, repo, stored)
    }

    #[tokio::test]
    async fn short_descriptions_are_skipped_not_failed() {
        let (_dir, repo, job) = repo_with_job("too short").await;
        let processor = AiProcessor::new(AiConfig {
            api_keys: vec!["sk-test".to_string()],
            ..AiConfig::default()
        });

        let stats = processor.process_batch(&repo, vec![job], None).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn no_credentials_fails_the_job_without_blocking() {
        let (_dir, repo, job) =
            repo_with_job(&"a long enough description to qualify for enrichment ".repeat(3)).await;
        // Empty key list and no env keys: acquire fails immediately instead
        // of blocking for the full wait bound
        let processor = AiProcessor::new(AiConfig {
            api_keys: Vec::new(),
            base_url: "http://127.0.0.1:1".to_string(),
            ..AiConfig::default()
        });
        if processor.key_pool().is_empty() {
            let stats = processor.process_batch(&repo, vec![job], None).await;
            assert_eq!(stats.failed, 1);
        }
    }

    #[tokio::test]
    async fn progress_callback_sees_every_job() {
        let (_dir, repo, job) = repo_with_job("short").await;
        let seen = Arc::new(AtomicU32::new(0));
        let seen_cb = seen.clone();
        let processor = AiProcessor::new(AiConfig {
            api_keys: vec!["sk-test".to_string()],
            ..AiConfig::default()
        });

        let callback: ProgressCallback = Arc::new(move |done, total, _title| {
            assert!(done <= total);
            seen_cb.fetch_add(1, Ordering::Relaxed);
        });
        processor.process_batch(&repo, vec![job], Some(callback)).await;
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
