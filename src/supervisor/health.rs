//! Continuous liveness probing for an already-started service
//!
//! The poller runs on its own timer, independent of the lifecycle manager,
//! and never raises errors to its owner: probe failures are steady-state
//! noise, reported only through the sample sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Consecutive probe failures tolerated before a service is reported down.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// One liveness observation. Ephemeral: consumed immediately by the owning
/// controller, no history retained beyond the consecutive-failure count.
#[derive(Debug, Clone, Copy)]
pub struct HealthSample {
    /// Whether this probe succeeded
    pub is_healthy: bool,
    /// Failures observed since the last success
    pub consecutive_failures: u32,
    /// Whether the poller is still running
    pub is_polling: bool,
}

/// Callback receiving one [`HealthSample`] per tick.
pub type SampleSink = Arc<dyn Fn(HealthSample) + Send + Sync>;

/// Interval-driven health prober for one service.
///
/// Probes are serialized: the next tick is not processed until the current
/// probe resolves.
pub struct HealthPoller {
    handle: Mutex<Option<JoinHandle<()>>>,
    failures: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    threshold: u32,
}

impl HealthPoller {
    /// Spawn the polling task. The sink is invoked once per tick; it is
    /// never handed an error, only samples.
    pub fn spawn(url: String, interval: Duration, threshold: u32, sink: SampleSink) -> Self {
        let failures = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let task_failures = failures.clone();
        let task_running = running.clone();
        let client = reqwest::Client::new();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // probe lands one full interval after spawn.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !task_running.load(Ordering::SeqCst) {
                    break;
                }

                let healthy = probe(&client, &url).await;
                let consecutive_failures = if healthy {
                    task_failures.store(0, Ordering::SeqCst);
                    0
                } else {
                    task_failures.fetch_add(1, Ordering::SeqCst) + 1
                };

                if !healthy && consecutive_failures == threshold {
                    tracing::warn!(
                        url = %url,
                        failures = consecutive_failures,
                        "health probe failure threshold reached"
                    );
                }

                sink(HealthSample {
                    is_healthy: healthy,
                    consecutive_failures,
                    is_polling: task_running.load(Ordering::SeqCst),
                });
            }
        });

        Self {
            handle: Mutex::new(Some(handle)),
            failures,
            running,
            threshold,
        }
    }

    /// Failures observed since the last successful probe.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Whether the polling task is still live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consecutive-failure threshold this poller was configured with.
    pub fn failure_threshold(&self) -> u32 {
        self.threshold
    }

    /// Cancel the timer and release the task. Safe to call multiple times.
    pub fn dispose(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Probe a health endpoint once. Any non-success status or connection
/// failure counts as unhealthy for the sample.
pub(crate) async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
