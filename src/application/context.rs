//! Application context
//!
//! One explicit context object constructed at process start and passed to
//! everything that needs it. It owns the store, the repository, the AI
//! processor and the scheduler; lifecycle (init / shutdown) is explicit.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::application::scheduler::{PipelineScheduler, StageExecutor, StageProgress};
use crate::domain::{SchedulerConfig, Stage, TaskState};
use crate::infrastructure::ai::AiProcessor;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::job_repository::JobRepository;
use crate::scrapers::all_profiles;

/// Shared state for the whole pipeline.
pub struct AppContext {
    config: AppConfig,
    db: DatabaseConnection,
    repository: JobRepository,
    ai: AiProcessor,
    scheduler: Arc<PipelineScheduler>,
}

impl AppContext {
    /// Open the store, wire every component and start the scheduler loop.
    pub async fn init(config: AppConfig) -> Result<Arc<Self>> {
        let db = DatabaseConnection::new(&config.database.path)
            .await
            .context("Failed to open job store")?;
        db.migrate().await.context("Migration failed")?;

        let repository = JobRepository::new(db.pool().clone());
        let scheduler_config = repository.load_scheduler_config().await?;
        let scheduler = Arc::new(PipelineScheduler::new(repository.clone(), scheduler_config));
        let ai = AiProcessor::new(config.ai.clone());

        let context = Arc::new(Self {
            config,
            db,
            repository,
            ai,
            scheduler,
        });

        Self::register_stage_executors(&context).await;
        context.scheduler.clone().start().await;

        info!("🚀 Application context initialized");
        Ok(context)
    }

    async fn register_stage_executors(context: &Arc<Self>) {
        let scheduler = &context.scheduler;
        scheduler
            .register_executor(
                Stage::Scrape,
                Arc::new(ScrapeStage {
                    context: Arc::downgrade(context),
                }),
            )
            .await;
        scheduler
            .register_executor(
                Stage::Descriptions,
                Arc::new(DescriptionStage {
                    context: Arc::downgrade(context),
                }),
            )
            .await;
        scheduler
            .register_executor(
                Stage::Ai,
                Arc::new(AiStage {
                    context: Arc::downgrade(context),
                }),
            )
            .await;
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repository
    }

    pub fn ai(&self) -> &AiProcessor {
        &self.ai
    }

    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    /// Manually trigger a stage; `false` when it is already running.
    pub async fn trigger_stage(&self, stage: Stage) -> bool {
        self.scheduler.run_now(stage).await
    }

    pub async fn task_states(&self) -> HashMap<Stage, TaskState> {
        self.scheduler.task_states().await
    }

    pub async fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.scheduler_config().await
    }

    pub async fn update_scheduler_config(&self, config: SchedulerConfig) -> Result<()> {
        self.scheduler.update_config(config).await
    }

    /// Stop the scheduler loop and close the store.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.db.close().await;
        info!("👋 Application context shut down");
    }
}

// Stage executors: thin adapters from the scheduler onto the pipeline
// commands. They hold the context weakly so shutdown is not kept alive by a
// registered executor.

struct ScrapeStage {
    context: Weak<AppContext>,
}

#[async_trait]
impl StageExecutor for ScrapeStage {
    async fn run(&self, progress: StageProgress) -> Result<String> {
        let context = self.context.upgrade().context("context dropped")?;

        let sources: Vec<String> = all_profiles()
            .iter()
            .map(|profile| profile.name.to_string())
            .collect();
        progress.update(0, sources.len() as u32, "Scraping all sources").await;

        let results = context.run_scrape(&sources, None, None).await?;

        let found: u32 = results.iter().map(|result| result.found).sum();
        let added: u32 = results.iter().map(|result| result.added).sum();
        let errors = results.iter().filter(|result| result.error.is_some()).count();
        progress
            .update(sources.len() as u32, sources.len() as u32, "Scrape finished")
            .await;

        Ok(format!(
            "{found} found, {added} added across {} sources ({errors} errored)",
            results.len()
        ))
    }
}

struct DescriptionStage {
    context: Weak<AppContext>,
}

#[async_trait]
impl StageExecutor for DescriptionStage {
    async fn run(&self, progress: StageProgress) -> Result<String> {
        let context = self.context.upgrade().context("context dropped")?;
        let result = context
            .refresh_descriptions(None, None, None, Some(&progress))
            .await?;
        Ok(format!("{} updated, {} failed", result.updated, result.failed))
    }
}

struct AiStage {
    context: Weak<AppContext>,
}

#[async_trait]
impl StageExecutor for AiStage {
    async fn run(&self, progress: StageProgress) -> Result<String> {
        let context = self.context.upgrade().context("context dropped")?;
        let stats = context.run_ai_pass(None, None, Some(&progress)).await?;
        Ok(format!(
            "{} processed, {} failed, {} skipped",
            stats.processed, stats.failed, stats.skipped
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_wires_store_and_scheduler() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("ctx.db");

        let context = AppContext::init(config).await.unwrap();

        // Seeded search configs are visible through the repository
        let configs = context.repository().search_configs(true).await.unwrap();
        assert!(!configs.is_empty());

        // All three stages start idle
        let states = context.task_states().await;
        assert_eq!(states.len(), 3);
        for stage in Stage::ALL {
            assert_eq!(states[&stage].status, TaskStatus::Idle);
        }

        // Scheduler config round-trips through the context surface
        let mut scheduler_config = context.scheduler_config().await;
        scheduler_config.ai_interval_minutes = 7;
        context.update_scheduler_config(scheduler_config.clone()).await.unwrap();
        assert_eq!(context.scheduler_config().await, scheduler_config);

        context.shutdown().await;
    }
}
