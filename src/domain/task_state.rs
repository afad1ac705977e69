//! Per-stage task state and scheduler configuration
//!
//! The scheduler owns one `TaskState` per pipeline stage and overwrites it on
//! every run; the external layer only ever reads snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three independent pipeline stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scrape,
    Descriptions,
    Ai,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Scrape, Stage::Descriptions, Stage::Ai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Descriptions => "descriptions",
            Stage::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one stage run: Idle -> Running -> Completed | Failed -> Idle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Snapshot of a stage's most recent (or current) run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskState {
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u32,
    pub total: u32,
    pub message: String,
    pub error: Option<String>,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }
}

/// Durable scheduler configuration (single-row JSON blob in the store).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Master switch; individual stages stay dormant while false
    pub enabled: bool,
    pub scrape_interval_minutes: u64,
    pub description_interval_minutes: u64,
    pub ai_interval_minutes: u64,
    pub scrape_enabled: bool,
    pub description_enabled: bool,
    pub ai_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scrape_interval_minutes: 60,
            description_interval_minutes: 15,
            ai_interval_minutes: 10,
            scrape_enabled: true,
            description_enabled: true,
            ai_enabled: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval_minutes(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Scrape => self.scrape_interval_minutes,
            Stage::Descriptions => self.description_interval_minutes,
            Stage::Ai => self.ai_interval_minutes,
        }
    }

    pub fn stage_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Scrape => self.scrape_enabled,
            Stage::Descriptions => self.description_enabled,
            Stage::Ai => self.ai_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadences_match_shipped_policy() {
        let config = SchedulerConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_minutes(Stage::Scrape), 60);
        assert_eq!(config.interval_minutes(Stage::Descriptions), 15);
        assert_eq!(config.interval_minutes(Stage::Ai), 10);
        for stage in Stage::ALL {
            assert!(config.stage_enabled(stage));
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SchedulerConfig {
            enabled: true,
            scrape_interval_minutes: 30,
            ..SchedulerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
