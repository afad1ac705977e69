//! Credential pool with per-key sliding-window quotas
//!
//! Each credential tracks the instants of its recent grants; a grant is only
//! handed out while the window holds fewer than the quota. Read, evict and
//! append happen as one atomic step under a single mutex, since a race there
//! would overrun the provider's quota.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Failures surfaced by the AI stage.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("no API credentials configured")]
    NoCredentials,
    #[error("timed out waiting for an available API key")]
    KeyWaitTimeout,
    #[error("API request failed: {0}")]
    Request(String),
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

struct ApiKey {
    key: String,
    name: String,
    grants: VecDeque<Instant>,
}

/// Per-key usage snapshot for status display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyStatus {
    pub name: String,
    pub used: usize,
    pub limit: usize,
}

/// Rotating pool of API credentials.
pub struct KeyPool {
    keys: Mutex<Vec<ApiKey>>,
    quota_per_window: usize,
    window: Duration,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, quota_per_window: usize, window: Duration) -> Self {
        let keys = keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| ApiKey {
                key,
                name: format!("key{}", index + 1),
                grants: VecDeque::new(),
            })
            .collect::<Vec<_>>();
        if keys.is_empty() {
            warn!("AI key pool is empty; every enrichment will fail fast");
        } else {
            info!("🔑 Loaded {} AI API credential(s)", keys.len());
        }
        Self {
            keys: Mutex::new(keys),
            quota_per_window,
            window,
        }
    }

    /// Load credentials from AI_API_KEY / AI_API_KEY2 / AI_API_KEY3.
    pub fn from_env(quota_per_window: usize, window: Duration) -> Self {
        let keys = ["AI_API_KEY", "AI_API_KEY2", "AI_API_KEY3"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
            .collect();
        Self::new(keys, quota_per_window, window)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().map(|keys| keys.is_empty()).unwrap_or(true)
    }

    fn evict(window: Duration, now: Instant, key: &mut ApiKey) {
        while let Some(oldest) = key.grants.front() {
            if now.duration_since(*oldest) > window {
                key.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Grant a key if any is under quota, recording the grant atomically.
    pub fn try_acquire(&self) -> Option<String> {
        let mut keys = self.keys.lock().ok()?;
        let now = Instant::now();

        for key in keys.iter_mut() {
            Self::evict(self.window, now, key);
            if key.grants.len() < self.quota_per_window {
                key.grants.push_back(now);
                debug!("Granted {} ({}/{})", key.name, key.grants.len(), self.quota_per_window);
                return Some(key.key.clone());
            }
        }
        None
    }

    /// Minimum time until any key frees a slot. Zero when a key is already
    /// free; `None` when the pool is empty.
    pub fn wait_hint(&self) -> Option<Duration> {
        let mut keys = self.keys.lock().ok()?;
        if keys.is_empty() {
            return None;
        }

        let now = Instant::now();
        let mut min_wait: Option<Duration> = None;
        for key in keys.iter_mut() {
            Self::evict(self.window, now, key);
            if key.grants.len() < self.quota_per_window {
                return Some(Duration::ZERO);
            }
            if let Some(oldest) = key.grants.front() {
                let elapsed = now.duration_since(*oldest);
                let wait = self.window.saturating_sub(elapsed);
                min_wait = Some(match min_wait {
                    Some(current) => current.min(wait),
                    None => wait,
                });
            }
        }
        min_wait.or(Some(Duration::from_secs(1)))
    }

    /// Acquire a key, sleeping until one frees, bounded by `max_wait`.
    pub async fn acquire(&self, max_wait: Duration) -> Result<String, AiError> {
        if self.is_empty() {
            return Err(AiError::NoCredentials);
        }

        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(key) = self.try_acquire() {
                return Ok(key);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AiError::KeyWaitTimeout);
            }

            let hint = self.wait_hint().unwrap_or(Duration::from_secs(1));
            let sleep_for = hint
                .max(Duration::from_millis(50))
                .min(deadline.duration_since(now));
            tokio::time::sleep(sleep_for).await;
        }
    }

    pub fn status(&self) -> Vec<KeyStatus> {
        let Ok(mut keys) = self.keys.lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        keys.iter_mut()
            .map(|key| {
                Self::evict(self.window, now, key);
                KeyStatus {
                    name: key.name.clone(),
                    used: key.grants.len(),
                    limit: self.quota_per_window,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(keys: usize, quota: usize) -> KeyPool {
        KeyPool::new(
            (0..keys).map(|i| format!("sk-test-{i}")).collect(),
            quota,
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn quota_grants_then_blocks_then_frees() {
        let pool = pool(1, 2);

        // Two immediate grants under a 2/60s quota
        assert!(pool.try_acquire().is_some());
        assert!(pool.try_acquire().is_some());

        // Third is refused with a positive wait
        assert!(pool.try_acquire().is_none());
        let hint = pool.wait_hint().unwrap();
        assert!(hint > Duration::ZERO && hint <= Duration::from_secs(60));

        // Once the window elapses, a fourth succeeds immediately
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_rotate_when_first_is_saturated() {
        let pool = pool(2, 1);
        assert_eq!(pool.try_acquire().as_deref(), Some("sk-test-0"));
        assert_eq!(pool.try_acquire().as_deref(), Some("sk-test-1"));
        assert!(pool.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_until_a_slot_frees() {
        let pool = pool(1, 1);
        assert!(pool.try_acquire().is_some());

        let acquired = pool.acquire(Duration::from_secs(120)).await;
        assert!(acquired.is_ok());
        // The paused clock only advances through the acquire's own sleeps,
        // so getting here proves it waited out the window rather than spun.
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_past_the_bound() {
        let pool = pool(1, 1);
        assert!(pool.try_acquire().is_some());

        let result = pool.acquire(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AiError::KeyWaitTimeout)));
    }

    #[tokio::test]
    async fn empty_pool_fails_fast() {
        let pool = KeyPool::new(Vec::new(), 40, Duration::from_secs(60));
        let result = pool.acquire(Duration::from_secs(120)).await;
        assert!(matches!(result, Err(AiError::NoCredentials)));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_usage() {
        let pool = pool(1, 3);
        pool.try_acquire();
        pool.try_acquire();
        let status = pool.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].used, 2);
        assert_eq!(status[0].limit, 3);
    }
}
