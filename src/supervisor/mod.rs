//! Supervision of dependent local services
//!
//! Each supervised service is described by a [`ServiceDescriptor`] and owned
//! by one [`state::ServiceController`]. Services run independently: their
//! lifecycle and poller timers never synchronize across services, and no
//! presentation code mutates state directly.

pub mod health;
pub mod lifecycle;
pub mod process;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use url::Url;

use crate::error::{SupervisorError, SupervisorResult};
pub use health::{HealthPoller, HealthSample, DEFAULT_FAILURE_THRESHOLD};
pub use lifecycle::{LifecycleManager, StopOutcome};
pub use state::{ServiceController, ServiceState, ServiceStatus, StateEvent};

/// Default interval between health probes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
/// Largest accepted poll interval.
pub const MAX_POLL_INTERVAL_MS: u64 = 30_000;

/// Boxed future returned by lifecycle callbacks.
pub type LifecycleFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Asynchronous lifecycle callback supplied by the domain collaborator.
///
/// `start` must fail on error and should be idempotent; `stop` failures are
/// logged by the supervisor rather than surfaced.
pub type LifecycleCallback = Arc<dyn Fn() -> LifecycleFuture + Send + Sync>;

/// Fire-and-forget UI-affordance callback.
pub type AffordanceCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration for one supervised service.
///
/// Immutable once constructed; owned by its lifecycle manager for the
/// process lifetime.
pub struct ServiceDescriptor {
    /// Display name used in errors, logs, and status payloads
    pub name: String,
    /// Health-check endpoint probed by the supervisor
    pub health_check_url: Url,
    /// Interval between steady-state health probes
    pub poll_interval: Duration,
    /// Starts the service; must fail on error, should be idempotent
    pub start: LifecycleCallback,
    /// Stops the service; failures are logged, never raised
    pub stop: LifecycleCallback,
    /// Optional custom restart; when absent, restart is stop + settle + start
    pub restart: Option<LifecycleCallback>,
    /// Optional affordance invoked when the service needs user attention
    pub on_attention: Option<AffordanceCallback>,
}

impl ServiceDescriptor {
    /// Build a descriptor with the default poll interval.
    ///
    /// Fails when the health-check URL does not parse.
    pub fn new(
        name: impl Into<String>,
        health_check_url: &str,
        start: LifecycleCallback,
        stop: LifecycleCallback,
    ) -> SupervisorResult<Self> {
        let name = name.into();
        let health_check_url = Url::parse(health_check_url).map_err(|err| {
            SupervisorError::Config(format!(
                "invalid health-check URL for '{name}': {err}"
            ))
        })?;
        Ok(Self {
            name,
            health_check_url,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            start,
            stop,
            restart: None,
            on_attention: None,
        })
    }

    /// Override the poll interval, enforcing the accepted range.
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> SupervisorResult<Self> {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&interval_ms) {
            return Err(SupervisorError::Config(format!(
                "poll interval {interval_ms}ms for '{}' outside {MIN_POLL_INTERVAL_MS}-{MAX_POLL_INTERVAL_MS}ms",
                self.name
            )));
        }
        self.poll_interval = Duration::from_millis(interval_ms);
        Ok(self)
    }

    /// Supply a custom restart callback.
    pub fn with_restart(mut self, restart: LifecycleCallback) -> Self {
        self.restart = Some(restart);
        self
    }

    /// Supply a UI-affordance callback.
    pub fn with_attention(mut self, on_attention: AffordanceCallback) -> Self {
        self.on_attention = Some(on_attention);
        self
    }

    /// Port of the health-check URL, falling back to the scheme default
    /// (`80` for http). `0` when neither an explicit port nor a known
    /// default exists.
    pub fn health_check_port(&self) -> u16 {
        self.health_check_url.port_or_known_default().unwrap_or(0)
    }
}

/// Registry owning one controller per supervised service.
///
/// State-change events from every controller fan out through a single
/// broadcast channel so presentation layers can subscribe once.
pub struct Supervisor {
    controllers: RwLock<HashMap<String, Arc<ServiceController>>>,
    events: broadcast::Sender<StateEvent>,
}

impl Supervisor {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            controllers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register a descriptor, creating its controller.
    ///
    /// Fails when a service with the same name is already registered.
    pub fn register(
        &self,
        descriptor: ServiceDescriptor,
    ) -> SupervisorResult<Arc<ServiceController>> {
        let name = descriptor.name.clone();
        let mut controllers = self.controllers.write();
        if controllers.contains_key(&name) {
            return Err(SupervisorError::Config(format!(
                "service '{name}' is already registered"
            )));
        }
        let controller = ServiceController::new(descriptor, self.events.clone());
        controllers.insert(name, controller.clone());
        Ok(controller)
    }

    /// Look up a controller by service name.
    pub fn get(&self, name: &str) -> Option<Arc<ServiceController>> {
        self.controllers.read().get(name).cloned()
    }

    /// Names of every registered service, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.controllers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Status snapshot of every registered service.
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        let mut statuses: Vec<ServiceStatus> = self
            .controllers
            .read()
            .values()
            .map(|controller| controller.status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Subscribe to state-change events from every controller.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Dispose every controller. Idempotent; no further events are emitted.
    pub fn dispose_all(&self) {
        for controller in self.controllers.read().values() {
            controller.dispose();
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop() -> LifecycleCallback {
        Arc::new(|| async { Ok(()) }.boxed())
    }

    #[test]
    fn descriptor_rejects_out_of_range_poll_interval() {
        let descriptor =
            ServiceDescriptor::new("tiles", "http://localhost:9000/health", noop(), noop())
                .unwrap();
        assert!(descriptor.with_poll_interval_ms(500).is_err());

        let descriptor =
            ServiceDescriptor::new("tiles", "http://localhost:9000/health", noop(), noop())
                .unwrap();
        assert!(descriptor.with_poll_interval_ms(31_000).is_err());

        let descriptor =
            ServiceDescriptor::new("tiles", "http://localhost:9000/health", noop(), noop())
                .unwrap()
                .with_poll_interval_ms(1_000)
                .unwrap();
        assert_eq!(descriptor.poll_interval, Duration::from_millis(1_000));
    }

    #[test]
    fn descriptor_parses_health_check_port() {
        let descriptor =
            ServiceDescriptor::new("tiles", "http://localhost:60123/health", noop(), noop())
                .unwrap();
        assert_eq!(descriptor.health_check_port(), 60123);

        let descriptor =
            ServiceDescriptor::new("tiles", "http://localhost/health", noop(), noop()).unwrap();
        assert_eq!(descriptor.health_check_port(), 80);

        let descriptor =
            ServiceDescriptor::new("tiles", "unix:/tmp/tiles.sock", noop(), noop()).unwrap();
        assert_eq!(descriptor.health_check_port(), 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let supervisor = Supervisor::new();
        let first =
            ServiceDescriptor::new("tiles", "http://localhost:9000/health", noop(), noop())
                .unwrap();
        let second =
            ServiceDescriptor::new("tiles", "http://localhost:9001/health", noop(), noop())
                .unwrap();
        supervisor.register(first).unwrap();
        assert!(supervisor.register(second).is_err());
    }
}
