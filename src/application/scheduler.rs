//! Independent-cadence pipeline scheduler
//!
//! A 10-second polling loop checks each enabled stage against its own
//! interval and dispatches due stages onto separate tasks. Stages never block
//! each other: a long-running scrape must not delay a descriptions or AI
//! cycle becoming due. Each stage owns one `TaskState` that is overwritten on
//! every run; the external layer only reads snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{SchedulerConfig, Stage, TaskState, TaskStatus};
use crate::infrastructure::job_repository::JobRepository;

/// Poll cadence of the scheduler loop.
const TICK: Duration = Duration::from_secs(10);

/// One pipeline stage's work, registered with the scheduler.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run the stage to completion. The returned string becomes the
    /// completion message in the stage's task state.
    async fn run(&self, progress: StageProgress) -> Result<String>;
}

/// Handle an executor uses to report progress into its stage's task state.
#[derive(Clone)]
pub struct StageProgress {
    states: Arc<RwLock<HashMap<Stage, TaskState>>>,
    stage: Stage,
}

impl StageProgress {
    pub async fn update(&self, progress: u32, total: u32, message: impl Into<String>) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&self.stage) {
            state.progress = progress;
            state.total = total;
            state.message = message.into();
        }
    }

    /// Best-effort variant for synchronous callbacks. Progress updates that
    /// lose the race are dropped, not queued.
    pub fn update_sync(&self, progress: u32, total: u32, message: &str) {
        if let Ok(mut states) = self.states.try_write() {
            if let Some(state) = states.get_mut(&self.stage) {
                state.progress = progress;
                state.total = total;
                state.message = message.to_string();
            }
        }
    }
}

/// The autonomous pipeline driver.
pub struct PipelineScheduler {
    states: Arc<RwLock<HashMap<Stage, TaskState>>>,
    last_runs: Arc<RwLock<HashMap<Stage, Instant>>>,
    executors: RwLock<HashMap<Stage, Arc<dyn StageExecutor>>>,
    config: Arc<RwLock<SchedulerConfig>>,
    repository: JobRepository,
    cancel: CancellationToken,
}

impl PipelineScheduler {
    pub fn new(repository: JobRepository, config: SchedulerConfig) -> Self {
        let states = Stage::ALL
            .into_iter()
            .map(|stage| (stage, TaskState::default()))
            .collect();

        Self {
            states: Arc::new(RwLock::new(states)),
            last_runs: Arc::new(RwLock::new(HashMap::new())),
            executors: RwLock::new(HashMap::new()),
            config: Arc::new(RwLock::new(config)),
            repository,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn register_executor(&self, stage: Stage, executor: Arc<dyn StageExecutor>) {
        self.executors.write().await.insert(stage, executor);
    }

    /// Start the polling loop. Last-run clocks are baselined to now, so each
    /// stage first becomes due one full interval after start-up.
    pub async fn start(self: Arc<Self>) {
        {
            let mut last_runs = self.last_runs.write().await;
            let now = Instant::now();
            for stage in Stage::ALL {
                last_runs.insert(stage, now);
            }
        }

        let scheduler = self;
        tokio::spawn(async move {
            info!("⏱️ Scheduler loop started (tick {:?})", TICK);
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    _ = tokio::time::sleep(TICK) => {}
                }

                let config = scheduler.config.read().await.clone();
                if !config.enabled {
                    continue;
                }

                for stage in Stage::ALL {
                    if scheduler.is_due(stage, &config).await {
                        info!("⏱️ Stage due: {}", stage);
                        scheduler.dispatch(stage).await;
                    }
                }
            }
            info!("⏱️ Scheduler loop stopped");
        });
    }

    async fn is_due(&self, stage: Stage, config: &SchedulerConfig) -> bool {
        if !config.stage_enabled(stage) {
            return false;
        }
        if self.states.read().await.get(&stage).is_some_and(TaskState::is_running) {
            return false;
        }

        let interval = Duration::from_secs(config.interval_minutes(stage) * 60);
        let last_runs = self.last_runs.read().await;
        match last_runs.get(&stage) {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }

    /// Mark the stage Running and spawn its executor. The Running transition
    /// happens before the spawn so a concurrent trigger cannot double-start.
    async fn dispatch(&self, stage: Stage) {
        let Some(executor) = self.executors.read().await.get(&stage).cloned() else {
            warn!("No executor registered for stage {}", stage);
            return;
        };

        {
            let mut states = self.states.write().await;
            let state = states.entry(stage).or_default();
            *state = TaskState {
                status: TaskStatus::Running,
                started_at: Some(Utc::now()),
                completed_at: None,
                progress: 0,
                total: 0,
                message: format!("Starting {stage}..."),
                error: None,
            };
        }

        let states = self.states.clone();
        let last_runs = self.last_runs.clone();
        let progress = StageProgress {
            states: states.clone(),
            stage,
        };

        tokio::spawn(async move {
            let result = executor.run(progress).await;

            // An executed run records its last-run time whether it completed
            // or failed; only skipped checks leave the interval clock alone.
            last_runs.write().await.insert(stage, Instant::now());

            let mut states = states.write().await;
            let state = states.entry(stage).or_default();
            state.completed_at = Some(Utc::now());
            match result {
                Ok(message) => {
                    state.status = TaskStatus::Completed;
                    state.message = message;
                    info!("✅ Stage {} completed", stage);
                }
                Err(e) => {
                    state.status = TaskStatus::Failed;
                    state.error = Some(e.to_string());
                    state.message = format!("Failed: {e}");
                    error!("❌ Stage {} failed: {}", stage, e);
                }
            }
        });
    }

    /// Manual trigger: bypasses the interval check but still respects the
    /// not-already-running guard. Returns whether the trigger was accepted.
    pub async fn run_now(&self, stage: Stage) -> bool {
        if self.executors.read().await.get(&stage).is_none() {
            return false;
        }
        if self.states.read().await.get(&stage).is_some_and(TaskState::is_running) {
            return false;
        }
        self.dispatch(stage).await;
        true
    }

    pub async fn task_state(&self, stage: Stage) -> TaskState {
        self.states.read().await.get(&stage).cloned().unwrap_or_default()
    }

    pub async fn task_states(&self) -> HashMap<Stage, TaskState> {
        self.states.read().await.clone()
    }

    pub async fn scheduler_config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    /// Apply and persist a new configuration; the loop picks it up on its
    /// next tick.
    pub async fn update_config(&self, config: SchedulerConfig) -> Result<()> {
        self.repository.save_scheduler_config(&config).await?;
        *self.config.write().await = config;
        info!("⏱️ Scheduler config updated");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    struct CountingExecutor {
        runs: Arc<AtomicU32>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl StageExecutor for CountingExecutor {
        async fn run(&self, progress: StageProgress) -> Result<String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            progress.update(1, 1, "working").await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                anyhow::bail!("executor exploded");
            }
            Ok("done".to_string())
        }
    }

    async fn test_scheduler(config: SchedulerConfig) -> (tempfile::TempDir, Arc<PipelineScheduler>) {
        let dir = tempdir().unwrap();
        let db = DatabaseConnection::new(&dir.path().join("sched.db")).await.unwrap();
        db.migrate().await.unwrap();
        let repository = JobRepository::new(db.pool().clone());
        (dir, Arc::new(PipelineScheduler::new(repository, config)))
    }

    fn executor(runs: &Arc<AtomicU32>) -> Arc<CountingExecutor> {
        Arc::new(CountingExecutor {
            runs: runs.clone(),
            delay: Duration::ZERO,
            fail: false,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn stages_fire_on_independent_cadences() {
        let config = SchedulerConfig {
            enabled: true,
            scrape_interval_minutes: 60,
            description_interval_minutes: 60,
            ai_interval_minutes: 10,
            ..SchedulerConfig::default()
        };
        let (_dir, scheduler) = test_scheduler(config).await;

        let scrape_runs = Arc::new(AtomicU32::new(0));
        let description_runs = Arc::new(AtomicU32::new(0));
        let ai_runs = Arc::new(AtomicU32::new(0));
        scheduler.register_executor(Stage::Scrape, executor(&scrape_runs)).await;
        scheduler.register_executor(Stage::Descriptions, executor(&description_runs)).await;
        scheduler.register_executor(Stage::Ai, executor(&ai_runs)).await;

        scheduler.clone().start().await;

        // Ten simulated minutes: only the AI stage becomes due
        tokio::time::sleep(Duration::from_secs(10 * 60 + 15)).await;

        assert_eq!(ai_runs.load(Ordering::SeqCst), 1);
        assert_eq!(scrape_runs.load(Ordering::SeqCst), 0);
        assert_eq!(description_runs.load(Ordering::SeqCst), 0);

        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_scheduler_never_fires() {
        let config = SchedulerConfig {
            enabled: false,
            ai_interval_minutes: 1,
            ..SchedulerConfig::default()
        };
        let (_dir, scheduler) = test_scheduler(config).await;

        let runs = Arc::new(AtomicU32::new(0));
        scheduler.register_executor(Stage::Ai, executor(&runs)).await;
        scheduler.clone().start().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_bypasses_interval_but_respects_running_guard() {
        let (_dir, scheduler) = test_scheduler(SchedulerConfig::default()).await;

        let runs = Arc::new(AtomicU32::new(0));
        scheduler
            .register_executor(
                Stage::Scrape,
                Arc::new(CountingExecutor {
                    runs: runs.clone(),
                    delay: Duration::from_secs(300),
                    fail: false,
                }),
            )
            .await;

        // No loop started, interval irrelevant: manual trigger accepted
        assert!(scheduler.run_now(Stage::Scrape).await);

        // Still running: second trigger refused
        tokio::task::yield_now().await;
        assert!(scheduler.task_state(Stage::Scrape).await.is_running());
        assert!(!scheduler.run_now(Stage::Scrape).await);

        // After it finishes, a new trigger is accepted again
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(scheduler.task_state(Stage::Scrape).await.status, TaskStatus::Completed);
        assert!(scheduler.run_now(Stage::Scrape).await);
    }

    #[tokio::test(start_paused = true)]
    async fn run_now_without_executor_is_refused() {
        let (_dir, scheduler) = test_scheduler(SchedulerConfig::default()).await;
        assert!(!scheduler.run_now(Stage::Ai).await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_records_state_and_interval_clock() {
        let config = SchedulerConfig {
            enabled: true,
            ai_interval_minutes: 10,
            ..SchedulerConfig::default()
        };
        let (_dir, scheduler) = test_scheduler(config).await;

        let runs = Arc::new(AtomicU32::new(0));
        scheduler
            .register_executor(
                Stage::Ai,
                Arc::new(CountingExecutor {
                    runs: runs.clone(),
                    delay: Duration::ZERO,
                    fail: true,
                }),
            )
            .await;
        scheduler.clone().start().await;

        tokio::time::sleep(Duration::from_secs(10 * 60 + 15)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let state = scheduler.task_state(Stage::Ai).await;
        assert_eq!(state.status, TaskStatus::Failed);
        assert!(state.error.as_deref().unwrap_or("").contains("exploded"));

        // A failed run still resets the interval clock: no immediate re-run
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn config_update_persists_and_applies() {
        let (_dir, scheduler) = test_scheduler(SchedulerConfig::default()).await;

        let updated = SchedulerConfig {
            enabled: true,
            ai_interval_minutes: 3,
            ..SchedulerConfig::default()
        };
        scheduler.update_config(updated.clone()).await.unwrap();

        assert_eq!(scheduler.scheduler_config().await, updated);
        assert_eq!(
            scheduler.repository.load_scheduler_config().await.unwrap(),
            updated
        );
    }
}
