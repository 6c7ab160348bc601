//! Per-service lifecycle state machine
//!
//! One controller per supervised service. State changes originate only from
//! the lifecycle/poller callback chain for that service; presentation layers
//! observe through the broadcast channel and the status snapshot.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::health::{DEFAULT_FAILURE_THRESHOLD, HealthPoller, HealthSample};
use super::lifecycle::{LifecycleManager, StopOutcome};
use super::ServiceDescriptor;
use crate::error::SupervisorResult;

/// Window in which a freshly started service must report healthy.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Probe cadence used while waiting for startup health.
pub const DEFAULT_STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Lifecycle state of one supervised service. Exactly one value per service
/// at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Created, never started
    NotStarted,
    /// Start requested; waiting for the health endpoint
    Starting,
    /// Most recent health sample succeeded
    Healthy,
    /// Startup failed, startup window elapsed, or the steady-state failure
    /// threshold was reached
    Error,
}

/// Broadcast payload emitted on every state transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    /// Service display name
    pub service: String,
    /// New state
    pub state: ServiceState,
}

/// Read-only status snapshot for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Service display name
    pub name: String,
    /// Current lifecycle state
    pub state: ServiceState,
    /// Consecutive probe failures, when a poller is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
}

struct ControllerInner {
    state: ServiceState,
    poller: Option<HealthPoller>,
    disposed: bool,
}

/// State machine for one supervised service.
///
/// Entering `Healthy` starts the health poller; leaving it (to `Error` or
/// via stop) disposes the poller so failure state is stable until retried.
pub struct ServiceController {
    weak: Weak<ServiceController>,
    lifecycle: LifecycleManager,
    inner: Mutex<ControllerInner>,
    events: broadcast::Sender<StateEvent>,
    startup_timeout: Duration,
    startup_poll_interval: Duration,
    failure_threshold: u32,
}

impl ServiceController {
    /// Create a controller in `NotStarted`.
    pub fn new(
        descriptor: ServiceDescriptor,
        events: broadcast::Sender<StateEvent>,
    ) -> Arc<Self> {
        Self::with_startup_timing(
            descriptor,
            events,
            DEFAULT_STARTUP_TIMEOUT,
            DEFAULT_STARTUP_POLL_INTERVAL,
        )
    }

    /// Create a controller with explicit startup timing, for callers that
    /// need a shorter health window than the default.
    pub fn with_startup_timing(
        descriptor: ServiceDescriptor,
        events: broadcast::Sender<StateEvent>,
        startup_timeout: Duration,
        startup_poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            lifecycle: LifecycleManager::new(Arc::new(descriptor)),
            inner: Mutex::new(ControllerInner {
                state: ServiceState::NotStarted,
                poller: None,
                disposed: false,
            }),
            events,
            startup_timeout,
            startup_poll_interval,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        })
    }

    /// Display name of the supervised service.
    pub fn name(&self) -> &str {
        &self.lifecycle.descriptor().name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.inner.lock().state
    }

    /// Read-only status snapshot.
    pub fn status(&self) -> ServiceStatus {
        let inner = self.inner.lock();
        ServiceStatus {
            name: self.name().to_string(),
            state: inner.state,
            consecutive_failures: inner
                .poller
                .as_ref()
                .map(|poller| poller.consecutive_failures()),
        }
    }

    /// Request a start. A request while already `Starting` or `Healthy`
    /// coalesces into the in-flight attempt and resolves immediately.
    pub async fn request_start(&self) -> SupervisorResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Ok(());
            }
            match inner.state {
                ServiceState::Starting | ServiceState::Healthy => return Ok(()),
                ServiceState::NotStarted | ServiceState::Error => {}
            }
            if let Some(poller) = inner.poller.take() {
                poller.dispose();
            }
            inner.state = ServiceState::Starting;
        }
        self.emit(ServiceState::Starting);

        if let Err(err) = self.lifecycle.start().await {
            self.enter_error();
            return Err(err);
        }
        self.await_startup_health().await
    }

    /// Request a restart. Coalesces when a start is already in flight.
    pub async fn request_restart(&self) -> SupervisorResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return Ok(());
            }
            if inner.state == ServiceState::Starting {
                return Ok(());
            }
            if let Some(poller) = inner.poller.take() {
                poller.dispose();
            }
            inner.state = ServiceState::Starting;
        }
        self.emit(ServiceState::Starting);

        if let Err(err) = self.lifecycle.restart().await {
            self.enter_error();
            return Err(err);
        }
        self.await_startup_health().await
    }

    /// Request a stop. Always resolves; a stop-callback failure is logged
    /// and reported through the returned [`StopOutcome`].
    pub async fn request_stop(&self) -> StopOutcome {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return StopOutcome::default();
            }
            if let Some(poller) = inner.poller.take() {
                poller.dispose();
            }
        }

        let outcome = self.lifecycle.stop().await;

        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return outcome;
            }
            inner.state = ServiceState::NotStarted;
        }
        self.emit(ServiceState::NotStarted);
        outcome
    }

    /// Record that a command against this service failed at the service
    /// level. Drops `Healthy` to `Error` and disposes the poller.
    pub fn report_command_failure(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.disposed || inner.state != ServiceState::Healthy {
                false
            } else {
                if let Some(poller) = inner.poller.take() {
                    poller.dispose();
                }
                inner.state = ServiceState::Error;
                true
            }
        };
        if transitioned {
            self.notify_attention();
            self.emit(ServiceState::Error);
        }
    }

    /// Dispose the controller: cancels the poller and silences all further
    /// state-change events. Idempotent.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        if let Some(poller) = inner.poller.take() {
            poller.dispose();
        }
    }

    async fn await_startup_health(&self) -> SupervisorResult<()> {
        match self
            .lifecycle
            .wait_for_healthy(self.startup_timeout, self.startup_poll_interval)
            .await
        {
            Ok(()) => {
                self.enter_healthy();
                Ok(())
            }
            Err(err) => {
                self.enter_error();
                Err(err)
            }
        }
    }

    fn enter_healthy(&self) {
        let started = {
            let mut inner = self.inner.lock();
            // A stop or dispose may have landed while waiting for health.
            if inner.disposed || inner.state != ServiceState::Starting {
                false
            } else {
                inner.state = ServiceState::Healthy;
                let weak = self.weak.clone();
                let threshold = self.failure_threshold;
                let descriptor = self.lifecycle.descriptor();
                inner.poller = Some(HealthPoller::spawn(
                    descriptor.health_check_url.to_string(),
                    descriptor.poll_interval,
                    threshold,
                    Arc::new(move |sample| {
                        if let Some(controller) = Weak::upgrade(&weak) {
                            controller.on_sample(sample);
                        }
                    }),
                ));
                true
            }
        };
        if started {
            self.emit(ServiceState::Healthy);
        }
    }

    fn enter_error(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            // A stop or dispose may have landed while the start attempt was
            // in flight; its outcome wins and the stale attempt is silent.
            if inner.disposed || inner.state != ServiceState::Starting {
                false
            } else {
                if let Some(poller) = inner.poller.take() {
                    poller.dispose();
                }
                inner.state = ServiceState::Error;
                true
            }
        };
        if transitioned {
            self.notify_attention();
            self.emit(ServiceState::Error);
        }
    }

    fn on_sample(&self, sample: HealthSample) {
        if sample.is_healthy || sample.consecutive_failures < self.failure_threshold {
            return;
        }
        tracing::info!(
            service = %self.name(),
            failures = sample.consecutive_failures,
            "service reported unhealthy"
        );
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.disposed || inner.state != ServiceState::Healthy {
                false
            } else {
                if let Some(poller) = inner.poller.take() {
                    poller.dispose();
                }
                inner.state = ServiceState::Error;
                true
            }
        };
        if transitioned {
            self.notify_attention();
            self.emit(ServiceState::Error);
        }
    }

    fn notify_attention(&self) {
        if let Some(on_attention) = &self.lifecycle.descriptor().on_attention {
            on_attention();
        }
    }

    fn emit(&self, state: ServiceState) {
        if self.inner.lock().disposed {
            return;
        }
        let _ = self.events.send(StateEvent {
            service: self.name().to_string(),
            state,
        });
    }
}
