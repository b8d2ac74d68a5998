//! Browser pool with context-crash isolation (spec §4.4.2: "Crash of a
//! context must not poison the pool: the whole browser process is
//! restarted if a context crash count exceeds 3 within a minute.").
//!
//! Grounded on the checkout/checkin shape of a pooled-resource manager:
//! a bounded set of warm processes, a semaphore gating concurrent use, and
//! an explicit checkin path that either returns the resource to the pool
//! or discards+replaces it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub max_pool_size: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub launch_timeout: Duration,
    /// Context crashes within `crash_window` before a process restart.
    pub crash_threshold: u32,
    pub crash_window: Duration,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 4,
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(600),
            launch_timeout: Duration::from_secs(20),
            crash_threshold: 3,
            crash_window: Duration::from_secs(60),
        }
    }
}

/// Tracks crash timestamps within a rolling window, independent of any
/// particular browser handle so it can be unit-tested in isolation.
#[derive(Debug, Default)]
struct CrashTracker {
    timestamps: VecDeque<Instant>,
}

impl CrashTracker {
    /// Record a crash now and report whether the rolling count exceeds
    /// `threshold` within `window`.
    fn record(&mut self, threshold: u32, window: Duration) -> bool {
        let now = Instant::now();
        self.timestamps.push_back(now);
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len() as u32 > threshold
    }
}

struct PooledProcess {
    browser: Browser,
    created_at: Instant,
    last_used_at: Instant,
    crash_tracker: CrashTracker,
}

impl PooledProcess {
    fn is_expired(&self, config: &BrowserPoolConfig) -> bool {
        self.created_at.elapsed() >= config.max_lifetime || self.last_used_at.elapsed() >= config.idle_timeout
    }

    fn record_crash(&mut self, config: &BrowserPoolConfig) -> bool {
        self.crash_tracker.record(config.crash_threshold, config.crash_window)
    }
}

/// A pool of headless Chrome processes. `checkout` hands out a fresh
/// browser context (via a new incognito-equivalent page) from a warm
/// process, launching a new process if the pool is empty and under
/// capacity.
pub struct BrowserPool {
    config: BrowserPoolConfig,
    browser_config_factory: Arc<dyn Fn() -> BrowserConfig + Send + Sync>,
    idle: Mutex<VecDeque<PooledProcess>>,
    permits: Semaphore,
    total_launched: AtomicU32,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig, browser_config_factory: impl Fn() -> BrowserConfig + Send + Sync + 'static) -> Self {
        let permits = Semaphore::new(config.max_pool_size);
        Self {
            config,
            browser_config_factory: Arc::new(browser_config_factory),
            idle: Mutex::new(VecDeque::new()),
            permits,
            total_launched: AtomicU32::new(0),
        }
    }

    /// Acquire a browser context for one fetch. Blocks (bounded by the
    /// caller's own `timeout_ms`) until a process slot is available.
    pub async fn checkout(&self) -> Result<BrowserCheckout<'_>, String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| format!("pool semaphore closed: {e}"))?;

        let mut process = {
            let mut idle = self.idle.lock().await;
            loop {
                match idle.pop_front() {
                    Some(p) if p.is_expired(&self.config) => {
                        debug!("discarding expired browser process from pool");
                        continue;
                    }
                    Some(p) => break Some(p),
                    None => break None,
                }
            }
        };

        if process.is_none() {
            process = Some(self.launch_process().await?);
        }
        let mut process = process.unwrap();
        process.last_used_at = Instant::now();

        let page = process
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("failed to open new browser context: {e}"))?;

        Ok(BrowserCheckout {
            pool: self,
            process: Some(process),
            page,
            permit: _permit,
        })
    }

    async fn launch_process(&self) -> Result<PooledProcess, String> {
        let browser_config = (self.browser_config_factory)();
        let (browser, mut handler) = tokio::time::timeout(self.config.launch_timeout, Browser::launch(browser_config))
            .await
            .map_err(|_| "browser launch timed out".to_string())?
            .map_err(|e| format!("browser launch failed: {e}"))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("chromiumoxide handler event error");
                }
            }
        });

        self.total_launched.fetch_add(1, Ordering::Relaxed);
        info!(total_launched = self.total_launched.load(Ordering::Relaxed), "launched headless browser process");

        Ok(PooledProcess {
            browser,
            created_at: Instant::now(),
            last_used_at: Instant::now(),
            crash_tracker: CrashTracker::default(),
        })
    }

    async fn checkin(&self, mut process: PooledProcess, context_crashed: bool) {
        if context_crashed {
            let restart_needed = process.record_crash(&self.config);
            if restart_needed {
                warn!("context crash threshold exceeded; discarding browser process");
                let _ = process.browser.close().await;
                return;
            }
        }

        if process.is_expired(&self.config) {
            let _ = process.browser.close().await;
            return;
        }

        self.idle.lock().await.push_back(process);
    }
}

/// An exclusive, fresh browser context leased from the pool. Drop returns
/// the underlying process to the pool unless [`BrowserCheckout::mark_crashed`]
/// was called.
pub struct BrowserCheckout<'a> {
    pool: &'a BrowserPool,
    process: Option<PooledProcess>,
    page: chromiumoxide::Page,
    permit: tokio::sync::SemaphorePermit<'a>,
}

impl<'a> BrowserCheckout<'a> {
    pub fn page(&self) -> &chromiumoxide::Page {
        &self.page
    }

    /// Flag that this context crashed; on drop the pool counts it toward
    /// the per-process crash budget instead of silently reusing the
    /// process.
    pub async fn finish(mut self, context_crashed: bool) {
        if let Some(process) = self.process.take() {
            self.pool.checkin(process, context_crashed).await;
        }
        drop(self.permit);
    }
}

impl<'a> Drop for BrowserCheckout<'a> {
    fn drop(&mut self) {
        // Callers are expected to call `finish()` to return the process to
        // the pool; Drop can't await the pool's own async checkin, so a
        // checkout dropped without `finish()` closes its process instead of
        // silently reusing a context whose crash status is unknown.
        if let Some(process) = self.process.take() {
            tokio::spawn(async move {
                let mut browser = process.browser;
                let _ = browser.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_count_trips_after_threshold() {
        let mut tracker = CrashTracker::default();
        assert!(!tracker.record(3, Duration::from_secs(60)));
        assert!(!tracker.record(3, Duration::from_secs(60)));
        assert!(!tracker.record(3, Duration::from_secs(60)));
        assert!(tracker.record(3, Duration::from_secs(60)));
    }

    #[test]
    fn crash_count_resets_outside_window() {
        let mut tracker = CrashTracker::default();
        assert!(!tracker.record(1, Duration::from_millis(20)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!tracker.record(1, Duration::from_millis(20)));
    }
}
