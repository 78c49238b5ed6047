//! Background refresh of the overlay snapshot.
//!
//! The monitor owns one tokio task that keeps the [`OverlayCache`] in step
//! with the store:
//!
//! - stores with push support are watched; every change notification triggers
//!   a full reload through the [`ConfigFetcher`];
//! - other stores are polled at `poll_interval`;
//! - a broken watch is re-established with exponential backoff, followed by a
//!   catch-up reload so changes made while disconnected are not lost.
//!
//! A failed reload is logged and the previous snapshot stays in place. A
//! reload that comes back with an older revision than the published one is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use stratum_core::{ConfigFetcher, OverlayCache, OverlayError, OverlayResult};

use crate::config::MonitorConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Counters describing the monitor's activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Snapshots published.
    pub refreshes: u64,
    /// Reloads that failed.
    pub failures: u64,
    /// Reloads dropped because they were older than the published snapshot.
    pub stale_skipped: u64,
    /// Watch subscriptions established, including the first.
    pub subscriptions: u64,
    /// Revision of the last published snapshot.
    pub last_revision: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// State shared between the monitor handle and its task.
struct Shared {
    fetcher: ConfigFetcher,
    cache: Arc<OverlayCache>,
    config: MonitorConfig,
    stats: Mutex<MonitorStats>,
}

impl Shared {
    /// Reloads from the store and publishes the result.
    ///
    /// Returns whether a snapshot was published.
    async fn refresh(&self) -> OverlayResult<bool> {
        let snapshot = match self.fetcher.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                match &e {
                    OverlayError::StoreMalformed { .. } => {
                        error!(error = %e, "Store contents could not be decoded, keeping previous snapshot");
                    }
                    _ => warn!(error = %e, "Refresh failed, keeping previous snapshot"),
                }
                let mut stats = self.stats.lock();
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let revision = snapshot.revision();
        if let Err(current) = self.cache.replace_if_newer(snapshot) {
            debug!(revision, current, "Dropping stale snapshot");
            self.stats.lock().stale_skipped += 1;
            return Ok(false);
        }

        let mut stats = self.stats.lock();
        stats.refreshes += 1;
        stats.last_revision = stats.last_revision.max(revision);
        Ok(true)
    }

    /// Runs [`refresh`](Self::refresh) unless cancelled first.
    ///
    /// Returns `false` when cancelled. The publish step is synchronous, so a
    /// cancelled refresh has either published or not.
    async fn refresh_or_cancel(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.refresh() => true,
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let client = self.fetcher.client();
        if client.supports_watch() {
            info!(store = client.name(), "Monitor watching store for changes");
            self.watch_loop(&token).await;
        } else {
            info!(
                store = client.name(),
                interval = ?self.config.poll_interval(),
                "Monitor polling store for changes"
            );
            self.poll_loop(&token).await;
        }
        info!("Monitor stopped");
    }

    async fn poll_loop(&self, token: &CancellationToken) {
        let period = self.config.poll_interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {}
            }
            trace!("Polling store");
            if !self.refresh_or_cancel(token).await {
                return;
            }
        }
    }

    async fn watch_loop(&self, token: &CancellationToken) {
        let prefixes = self.fetcher.prefixes();
        let mut backoff = Backoff::new(&self.config);

        loop {
            let subscribed = tokio::select! {
                _ = token.cancelled() => return,
                result = self.fetcher.client().watch(&prefixes) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    let count = {
                        let mut stats = self.stats.lock();
                        stats.subscriptions += 1;
                        stats.subscriptions
                    };
                    debug!(subscription = count, "Watch subscription established");

                    // Catch up on anything missed before the subscription.
                    if !self.refresh_or_cancel(token).await {
                        return;
                    }

                    loop {
                        let item = tokio::select! {
                            _ = token.cancelled() => return,
                            item = stream.next() => item,
                        };
                        match item {
                            Some(Ok(event)) => {
                                trace!(key = %event.key, kind = ?event.kind, revision = event.revision, "Store changed");
                                backoff.reset();
                                if !self.refresh_or_cancel(token).await {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Watch stream failed");
                                break;
                            }
                            None => {
                                info!("Watch stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to store changes");
                }
            }

            let delay = backoff.next_delay();
            warn!(delay = ?delay, attempt = backoff.attempts, "Re-subscribing...");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Exponential backoff between re-subscription attempts.
struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    current_delay: Duration,
    attempts: u32,
}

impl Backoff {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.backoff_multiplier,
            current_delay: config.initial_delay(),
            attempts: 0,
        }
    }

    /// Returns the delay to wait now and grows the next one.
    ///
    /// A growth that overflows or is not a number saturates at `max_delay`.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.attempts = self.attempts.saturating_add(1);
        let grown = Duration::try_from_secs_f64(self.current_delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        self.current_delay = grown.min(self.max_delay);
        delay
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.initial_delay;
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps an [`OverlayCache`] current with its store.
///
/// # Example
///
/// ```rust,ignore
/// let monitor = Monitor::new(fetcher, cache, MonitorConfig::default());
/// monitor.start()?;
/// // ...
/// monitor.stop().await;
/// ```
pub struct Monitor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(fetcher: ConfigFetcher, cache: Arc<OverlayCache>, config: MonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher,
                cache,
                config,
                stats: Mutex::new(MonitorStats::default()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawns the background task on the current tokio runtime.
    ///
    /// Calling it while the task is alive does nothing. For a cache without
    /// a store it is a no-op.
    pub fn start(&self) -> RuntimeResult<()> {
        if !self.shared.cache.is_store_backed() {
            debug!("Static source mode, monitor not started");
            return Ok(());
        }

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Monitor is already running");
            return Ok(());
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime)?;
        let token = CancellationToken::new();
        let handle = runtime.spawn(Arc::clone(&self.shared).run(token.clone()));
        *running = Some(Running { token, handle });
        Ok(())
    }

    /// Cancels the background task and waits for it to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        running.token.cancel();
        if let Err(e) = running.handle.await
            && e.is_panic()
        {
            error!(error = %e, "Monitor task panicked");
        }
    }

    /// Whether the background task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Reloads from the store immediately, outside the background task.
    ///
    /// Returns whether a snapshot was published.
    pub async fn refresh_now(&self) -> OverlayResult<bool> {
        self.shared.refresh().await
    }

    pub fn stats(&self) -> MonitorStats {
        self.shared.stats.lock().clone()
    }

    pub fn cache(&self) -> &Arc<OverlayCache> {
        &self.shared.cache
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("fetcher", &self.shared.fetcher)
            .field("running", &self.is_running())
            .finish()
    }
}
