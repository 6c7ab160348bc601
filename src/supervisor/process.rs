//! Process-backed lifecycle callbacks
//!
//! Builds a [`ServiceDescriptor`] whose start/stop callbacks spawn and kill
//! a local child process. Start is idempotent: a live child makes a second
//! start a no-op, as the lifecycle contract requires.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use futures::FutureExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{LifecycleCallback, ServiceDescriptor};
use crate::error::{SupervisorError, SupervisorResult};

/// A supervised local process: argv for start, optional argv for stop.
///
/// Without a stop command, stop kills the tracked child directly.
pub struct ProcessService {
    name: String,
    start_argv: Vec<String>,
    stop_argv: Option<Vec<String>>,
    child: Arc<Mutex<Option<Child>>>,
}

impl ProcessService {
    /// Describe a process-backed service.
    pub fn new(name: impl Into<String>, start_argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            start_argv,
            stop_argv: None,
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Use an explicit stop command instead of killing the child.
    pub fn with_stop_command(mut self, stop_argv: Vec<String>) -> Self {
        self.stop_argv = Some(stop_argv);
        self
    }

    /// Build the descriptor, consuming the service definition.
    pub fn into_descriptor(self, health_check_url: &str) -> SupervisorResult<ServiceDescriptor> {
        if self.start_argv.is_empty() {
            return Err(SupervisorError::Config(format!(
                "service '{}' has an empty start command",
                self.name
            )));
        }

        let start = self.start_callback();
        let stop = self.stop_callback();
        ServiceDescriptor::new(self.name, health_check_url, start, stop)
    }

    fn start_callback(&self) -> LifecycleCallback {
        let argv = self.start_argv.clone();
        let child_slot = self.child.clone();
        Arc::new(move || {
            let argv = argv.clone();
            let child_slot = child_slot.clone();
            async move {
                let mut slot = child_slot.lock().await;
                if let Some(child) = slot.as_mut() {
                    if child.try_wait()?.is_none() {
                        // Already running; start is idempotent.
                        return Ok(());
                    }
                }

                let child = Command::new(&argv[0])
                    .args(&argv[1..])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .with_context(|| format!("spawning '{}'", argv[0]))?;
                *slot = Some(child);
                Ok(())
            }
            .boxed()
        })
    }

    fn stop_callback(&self) -> LifecycleCallback {
        let stop_argv = self.stop_argv.clone();
        let child_slot = self.child.clone();
        Arc::new(move || {
            let stop_argv = stop_argv.clone();
            let child_slot = child_slot.clone();
            async move {
                if let Some(argv) = stop_argv {
                    let status = Command::new(&argv[0])
                        .args(&argv[1..])
                        .status()
                        .await
                        .with_context(|| format!("running stop command '{}'", argv[0]))?;
                    if !status.success() {
                        return Err(anyhow!("stop command exited with {status}"));
                    }
                    child_slot.lock().await.take();
                    return Ok(());
                }

                if let Some(mut child) = child_slot.lock().await.take() {
                    child.start_kill().context("killing child process")?;
                    child.wait().await.context("reaping child process")?;
                }
                Ok(())
            }
            .boxed()
        })
    }
}
