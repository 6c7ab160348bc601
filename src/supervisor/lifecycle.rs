//! Start/stop/restart verbs for one supervised service
//!
//! The manager owns failure classification: raw callback faults never cross
//! this boundary, they are coerced into [`SupervisorError`] first. `stop` is
//! the exception to fallibility — it always resolves, logging any failure,
//! because it runs on cleanup paths where a throwing stop would abort
//! shutdown.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::ServiceDescriptor;
use super::health::probe;
use crate::error::{SupervisorError, SupervisorResult};

/// Settling delay between stop and start during a default restart. The
/// underlying service needs time to release its socket before rebinding.
pub const RESTART_SETTLE: Duration = Duration::from_millis(1_000);

/// Outcome of a stop request.
///
/// Stop never fails outward; a callback failure is logged at the failure
/// site and carried here for observability.
#[derive(Debug)]
pub struct StopOutcome {
    logged_error: Option<String>,
}

impl StopOutcome {
    fn clean() -> Self {
        Self { logged_error: None }
    }

    fn logged(detail: String) -> Self {
        Self {
            logged_error: Some(detail),
        }
    }

    /// Whether the stop callback succeeded.
    pub fn is_clean(&self) -> bool {
        self.logged_error.is_none()
    }

    /// The logged failure, when the stop callback failed.
    pub fn logged_error(&self) -> Option<&str> {
        self.logged_error.as_deref()
    }
}

impl Default for StopOutcome {
    /// A stop that had nothing to do (e.g. on a disposed controller) is
    /// clean.
    fn default() -> Self {
        Self::clean()
    }
}

/// Owns the lifecycle verbs for exactly one [`ServiceDescriptor`].
pub struct LifecycleManager {
    descriptor: Arc<ServiceDescriptor>,
    client: reqwest::Client,
}

impl LifecycleManager {
    /// Wrap a descriptor. The descriptor is owned here for the process
    /// lifetime.
    pub fn new(descriptor: Arc<ServiceDescriptor>) -> Self {
        Self {
            descriptor,
            client: reqwest::Client::new(),
        }
    }

    /// The wrapped descriptor.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Invoke the start callback, classifying failures.
    ///
    /// An address-in-use fault becomes [`SupervisorError::PortConflict`]
    /// with the port parsed from the health-check URL; anything else becomes
    /// [`SupervisorError::Startup`]. The callback is expected to be
    /// idempotent; the manager does not guard against double-start.
    pub async fn start(&self) -> SupervisorResult<()> {
        match (self.descriptor.start)().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.classify_start_failure(&err)),
        }
    }

    /// Invoke the stop callback. Failures are logged, never raised.
    pub async fn stop(&self) -> StopOutcome {
        match (self.descriptor.stop)().await {
            Ok(()) => StopOutcome::clean(),
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(
                    service = %self.descriptor.name,
                    error = %detail,
                    "stop callback failed; continuing"
                );
                StopOutcome::logged(detail)
            }
        }
    }

    /// Restart the service.
    ///
    /// With a custom restart callback, only that callback runs and any
    /// failure is wrapped as a callback error. Without one, restart is stop,
    /// a settling delay, then start.
    pub async fn restart(&self) -> SupervisorResult<()> {
        if let Some(restart) = &self.descriptor.restart {
            return restart().await.map_err(|err| SupervisorError::Callback {
                server_name: self.descriptor.name.clone(),
                callback: "on_restart",
                detail: format!("{err:#}"),
            });
        }

        self.stop().await;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start().await
    }

    /// Poll the health endpoint until it reports success or the window
    /// elapses. A non-success status during polling means "not yet ready,"
    /// not failure; polling continues.
    pub async fn wait_for_healthy(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> SupervisorResult<()> {
        let deadline = Instant::now() + timeout;
        let url = self.descriptor.health_check_url.as_str();

        loop {
            if probe(&self.client, url).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::HealthCheckTimeout {
                    server_name: self.descriptor.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn classify_start_failure(&self, err: &anyhow::Error) -> SupervisorError {
        if is_address_in_use(err) {
            SupervisorError::PortConflict {
                server_name: self.descriptor.name.clone(),
                port: self.descriptor.health_check_port(),
            }
        } else {
            SupervisorError::Startup {
                server_name: self.descriptor.name.clone(),
                detail: format!("{err:#}"),
            }
        }
    }
}

/// Whether a start fault signals that the listening port is already bound:
/// either an `AddrInUse` I/O error anywhere in the chain, or an
/// address-in-use marker in the rendered message.
fn is_address_in_use(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::AddrInUse {
                return true;
            }
        }
    }
    let text = format!("{err:#}").to_ascii_lowercase();
    text.contains("eaddrinuse") || text.contains("address already in use")
}
