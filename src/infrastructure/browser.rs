//! Browser-driven fetch layer
//!
//! One Chromium session per scrape task, driven over CDP. The session applies
//! its stealth fingerprint once at launch, paces navigations with a jittered
//! minimum delay, classifies the document response status to drive
//! retry/backoff, and performs best-effort humanization after successful
//! loads. Adapters talk to the session through the [`Navigator`] trait so
//! they stay testable without a browser.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventResponseReceived};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::stealth::{Fingerprint, STEALTH_SCRIPT};

/// How long to watch CDP response events for the document status after a
/// navigation settles.
const STATUS_OBSERVE_WINDOW: Duration = Duration::from_secs(8);

/// Fixed sleep before retrying an unclassified non-200 response.
const RETRY_SLEEP: Duration = Duration::from_secs(5);

/// Seam between the site adapters and the browser session.
///
/// The production implementation is [`BrowserSession`]; tests drive the
/// pagination engine with a scripted navigator instead.
#[async_trait]
pub trait Navigator: Send {
    /// Navigate with pacing and retry. `false` means the source should be
    /// abandoned; it is never an error.
    async fn navigate(&mut self, url: &str) -> bool;

    /// Wait until any of `selectors` matches, up to `timeout`. Absence is a
    /// normal "no more results" signal, so this returns a bool, not an error.
    async fn wait_for_any(&mut self, selectors: &[&str], timeout: Duration) -> bool;

    /// Rendered HTML of the current page.
    async fn content(&mut self) -> Result<String>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<()>;
}

/// Classification of a navigation attempt's document response.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NavigationOutcome {
    /// 2xx, or no status observed in time (soft success)
    Loaded,
    /// 429: back off hard, then retry
    Throttled,
    /// 403: hard block, abandon immediately
    Blocked,
    /// Any other status
    Other(u16),
    /// Timeout / connection-level failure before a response
    Transport(String),
}

fn classify_status(status: Option<u16>) -> NavigationOutcome {
    match status {
        // No document event observed: the page fired its load events, so
        // treat the attempt as a soft success rather than conflate it with a
        // block.
        None => NavigationOutcome::Loaded,
        Some(code) if (200..300).contains(&code) => NavigationOutcome::Loaded,
        Some(429) => NavigationOutcome::Throttled,
        Some(403) => NavigationOutcome::Blocked,
        Some(code) => NavigationOutcome::Other(code),
    }
}

/// One stealth Chromium session.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    fingerprint: Fingerprint,
    config: FetchConfig,
    last_request_at: Option<Instant>,
}

impl BrowserSession {
    /// Launch Chromium with anti-detection arguments and apply a randomized
    /// fingerprint to the context. The stealth script is registered before
    /// any page load and applies to every subsequent navigation.
    pub async fn launch(config: FetchConfig) -> Result<Self> {
        let fingerprint = Fingerprint::random();

        let mut builder = BrowserConfig::builder()
            .window_size(fingerprint.viewport.0, fingerprint.viewport.1)
            .args(vec![
                "--disable-blink-features=AutomationControlled",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-infobars",
                "--disable-site-isolation-trials",
                "--ignore-certificate-errors",
            ]);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(|e| anyhow!(e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        // Fingerprint + stealth are applied once per context, not per
        // navigation.
        page.set_user_agent(fingerprint.user_agent.as_str()).await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(fingerprint.viewport.0 as i64)
                .height(fingerprint.viewport.1 as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow!(e))?,
        )
        .await?;
        page.execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
            .await?;

        let mut locale = SetLocaleOverrideParams::default();
        locale.locale = Some(fingerprint.locale.clone());
        page.execute(locale).await?;

        let mut geolocation = SetGeolocationOverrideParams::default();
        geolocation.latitude = Some(fingerprint.latitude);
        geolocation.longitude = Some(fingerprint.longitude);
        geolocation.accuracy = Some(100.0);
        page.execute(geolocation).await?;

        // Needed for document status capture during navigation
        page.execute(EnableParams::default()).await?;

        info!(
            "🌐 Browser session up: {}x{} near {} ({})",
            fingerprint.viewport.0,
            fingerprint.viewport.1,
            fingerprint.city,
            fingerprint.user_agent.split_whitespace().last().unwrap_or("?")
        );

        Ok(Self {
            browser,
            handler_task,
            page,
            fingerprint,
            config,
            last_request_at: None,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Enforce the jittered inter-request delay, measured from the previous
    /// request's completion regardless of how many retries it took. The
    /// target delay is drawn fresh from [min, max] on every call.
    async fn pace(&mut self) {
        let min = self.config.min_request_delay_ms;
        let max = self.config.max_request_delay_ms.max(min);
        let target = Duration::from_millis(fastrand::u64(min..=max));
        let jitter = Duration::from_millis(fastrand::u64(..500));

        match self.last_request_at {
            Some(last) => {
                let since = last.elapsed();
                if since < target {
                    tokio::time::sleep(target - since + jitter).await;
                }
            }
            None => tokio::time::sleep(jitter).await,
        }
    }

    /// One navigation attempt: goto, then watch CDP response events for the
    /// document status.
    async fn attempt(&self, url: &str) -> NavigationOutcome {
        let events = self.page.event_listener::<EventResponseReceived>().await;
        let navigation_timeout = Duration::from_secs(self.config.navigation_timeout_secs);

        let goto = tokio::time::timeout(navigation_timeout, self.page.goto(url)).await;
        match goto {
            Err(_) => return NavigationOutcome::Transport("navigation timeout".to_string()),
            Ok(Err(e)) => return NavigationOutcome::Transport(e.to_string()),
            Ok(Ok(_)) => {}
        }

        let status = match events {
            Ok(mut stream) => tokio::time::timeout(STATUS_OBSERVE_WINDOW, async {
                while let Some(event) = stream.next().await {
                    let mime = event.response.mime_type.to_ascii_lowercase();
                    if mime.starts_with("text/html") || mime.starts_with("application/xhtml+xml")
                    {
                        return Some(event.response.status as u16);
                    }
                }
                None
            })
            .await
            .ok()
            .flatten(),
            Err(e) => {
                debug!("No response-event stream for {}: {}", url, e);
                None
            }
        };

        classify_status(status)
    }

    /// Scroll and move the pointer a little, like a person skimming the page.
    /// Strictly best effort: nothing here may fail the navigation.
    async fn humanize(&self) {
        for _ in 0..2 {
            let step = fastrand::i64(200..500);
            let _ = self
                .page
                .evaluate(format!("window.scrollBy(0, {step})"))
                .await;
            tokio::time::sleep(Duration::from_millis(200 + fastrand::u64(..400))).await;
        }

        let x = 100.0 + fastrand::f64() * 700.0;
        let y = 100.0 + fastrand::f64() * 500.0;
        if let Ok(params) = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
        {
            let _ = self.page.execute(params).await;
        }
    }

    /// Tear down the browser. Errors during shutdown are logged, not raised.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close reported: {}", e);
        }
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl Navigator for BrowserSession {
    async fn navigate(&mut self, url: &str) -> bool {
        self.pace().await;

        for attempt in 0..self.config.max_retries {
            let outcome = self.attempt(url).await;
            self.last_request_at = Some(Instant::now());

            match outcome {
                NavigationOutcome::Loaded => {
                    tokio::time::sleep(Duration::from_millis(1000 + fastrand::u64(..1000))).await;
                    self.humanize().await;
                    return true;
                }
                NavigationOutcome::Throttled => {
                    let wait = Duration::from_secs(((attempt + 1) as u64) * 30);
                    warn!("Rate limited (429) on {}, waiting {:?}", url, wait);
                    tokio::time::sleep(wait).await;
                }
                NavigationOutcome::Blocked => {
                    warn!("Access forbidden (403) on {}, abandoning source", url);
                    return false;
                }
                NavigationOutcome::Other(code) => {
                    warn!("Got status {} on {}, retrying", code, url);
                    tokio::time::sleep(RETRY_SLEEP).await;
                }
                NavigationOutcome::Transport(reason) => {
                    warn!(
                        "Navigation error on {} (attempt {}): {}",
                        url,
                        attempt + 1,
                        reason
                    );
                    tokio::time::sleep(RETRY_SLEEP).await;
                }
            }
        }

        false
    }

    async fn wait_for_any(&mut self, selectors: &[&str], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            for selector in selectors {
                if self.page.find_element(*selector).await.is_ok() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("No element matching '{selector}'"))?;
        element.click().await.context("Click failed")?;
        Ok(())
    }
}
