//! Transport-agnostic command bridge
//!
//! Every listener decodes bytes into a [`RequestEnvelope`] and hands it to
//! [`Bridge::dispatch`]; the outcome is identical regardless of transport.
//! Dispatch always resolves to a well-formed [`ResponseEnvelope`] — no
//! failure escapes to a transport as anything but a typed error.

pub mod command;
pub mod listener;
pub mod session;
pub mod store;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{BridgeError, BridgeResult};
use crate::supervisor::Supervisor;
use command::{Command, RequestEnvelope, ResponseEnvelope, Selection, TimeState, ViewportState};

/// Attempts made for retryable document-command failures.
const MAX_COMMAND_ATTEMPTS: u32 = 3;
/// Base delay for the bounded exponential backoff between attempts.
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Domain document store: the external collaborator holding the business
/// payload the state commands operate on.
#[async_trait]
pub trait DocumentHandler: Send + Sync {
    /// Currently open documents, the candidates for target resolution.
    async fn open_documents(&self) -> Vec<String>;

    /// Read a document's time state.
    async fn time_state(&self, filename: &str) -> BridgeResult<TimeState>;

    /// Replace a document's time state. The bridge validates first.
    async fn set_time_state(&self, filename: &str, state: TimeState) -> BridgeResult<()>;

    /// Read a document's viewport.
    async fn viewport(&self, filename: &str) -> BridgeResult<ViewportState>;

    /// Replace a document's viewport. The bridge validates first.
    async fn set_viewport(&self, filename: &str, state: ViewportState) -> BridgeResult<()>;

    /// Read a document's selection.
    async fn selection(&self, filename: &str) -> BridgeResult<Selection>;

    /// Replace a document's selection.
    async fn set_selection(&self, filename: &str, selection: Selection) -> BridgeResult<()>;

    /// Surface a message to the embedded UI. Fire-and-forget semantics.
    async fn notify(&self, message: &str) -> BridgeResult<()>;
}

/// The single dispatcher shared by every transport listener.
///
/// The method table is fixed at construction; dispatches are self-contained
/// and may run concurrently from multiple listeners.
pub struct Bridge {
    supervisor: Arc<Supervisor>,
    handler: Arc<dyn DocumentHandler>,
}

impl Bridge {
    /// Build a bridge over a supervisor registry and a document handler.
    pub fn new(supervisor: Arc<Supervisor>, handler: Arc<dyn DocumentHandler>) -> Self {
        Self {
            supervisor,
            handler,
        }
    }

    /// The supervisor registry this bridge fronts.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Dispatch one request to its handler, echoing the id verbatim.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope { id, method, params } = request;
        if !matches!(id, Value::String(_) | Value::Number(_)) {
            return ResponseEnvelope::failure(
                Value::Null,
                BridgeError::InvalidRequest("id must be a string or number".into()).to_wire(),
            );
        }

        match self.run(&method, &params).await {
            Ok(result) => ResponseEnvelope::success(id, result),
            Err(err) => ResponseEnvelope::failure(id, err.to_wire()),
        }
    }

    async fn run(&self, method: &str, params: &Value) -> BridgeResult<Value> {
        let command = Command::parse(method, params)?;
        match command {
            Command::Handshake {
                client,
                protocol_version,
            } => self.handshake(client, protocol_version),
            Command::ListServices => Ok(json!({ "services": self.supervisor.statuses() })),
            Command::ServiceStatus { name } => {
                let controller = self.controller(&name)?;
                Ok(serde_json::to_value(controller.status())
                    .map_err(|err| BridgeError::Internal(err.to_string()))?)
            }
            Command::StartService { name } => {
                let controller = self.controller(&name)?;
                controller.request_start().await?;
                Ok(json!({ "state": controller.state() }))
            }
            Command::StopService { name } => {
                let controller = self.controller(&name)?;
                let outcome = controller.request_stop().await;
                Ok(json!({
                    "state": controller.state(),
                    "clean": outcome.is_clean(),
                }))
            }
            Command::RestartService { name } => {
                let controller = self.controller(&name)?;
                controller.request_restart().await?;
                Ok(json!({ "state": controller.state() }))
            }
            Command::Notify { message } => {
                self.handler.notify(&message).await?;
                Ok(json!({ "delivered": true }))
            }
            Command::ListOpenDocuments => {
                Ok(json!({ "open": self.handler.open_documents().await }))
            }
            document_command => self.dispatch_document(document_command).await,
        }
    }

    fn handshake(&self, client: String, protocol_version: String) -> BridgeResult<Value> {
        if protocol_version != crate::PROTOCOL_VERSION {
            return Err(BridgeError::InvalidRequest(format!(
                "unsupported protocol version: expected {}, got {protocol_version}",
                crate::PROTOCOL_VERSION
            )));
        }
        Ok(json!({
            "protocol_version": crate::PROTOCOL_VERSION,
            "bridge": {
                "version": crate::VERSION,
                "client": client,
                "features": [
                    "service_supervision",
                    "service_state_events",
                    "time_state",
                    "viewport",
                    "selection",
                    "notifications",
                ],
            },
        }))
    }

    /// Document-targeting commands: validate the payload, resolve the
    /// target, then invoke the handler with bounded retries for transient
    /// failures.
    async fn dispatch_document(&self, command: Command) -> BridgeResult<Value> {
        // Validation short-circuits dispatch; the handler never sees
        // unvalidated data.
        match &command {
            Command::SetTimeState { state, .. } => {
                validate::validate_time_state(state).map_err(BridgeError::InvalidParameter)?;
            }
            Command::SetViewport { state, .. } => {
                validate::validate_viewport(state).map_err(BridgeError::InvalidParameter)?;
            }
            _ => {}
        }

        let target = self.resolve_target(command_filename(&command)).await?;

        let mut last_error: Option<BridgeError> = None;
        for attempt in 1..=MAX_COMMAND_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_BACKOFF_BASE * 2u32.pow(attempt - 2)).await;
            }
            match self.invoke_handler(&command, &target).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        target = %target,
                        attempt,
                        error = %err,
                        "document command failed; will retry"
                    );
                    self.record_service_failure(&err);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(BridgeError::RetriesExhausted {
            attempts: MAX_COMMAND_ATTEMPTS,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn invoke_handler(&self, command: &Command, target: &str) -> BridgeResult<Value> {
        match command {
            Command::GetTimeState { .. } => {
                let state = self.handler.time_state(target).await?;
                Ok(json!({ "filename": target, "state": state }))
            }
            Command::SetTimeState { state, .. } => {
                self.handler.set_time_state(target, state.clone()).await?;
                Ok(json!({ "filename": target }))
            }
            Command::GetViewport { .. } => {
                let state = self.handler.viewport(target).await?;
                Ok(json!({ "filename": target, "state": state }))
            }
            Command::SetViewport { state, .. } => {
                self.handler.set_viewport(target, state.clone()).await?;
                Ok(json!({ "filename": target }))
            }
            Command::GetSelection { .. } => {
                let selection = self.handler.selection(target).await?;
                Ok(json!({ "filename": target, "selection": selection }))
            }
            Command::SetSelection { selection, .. } => {
                self.handler
                    .set_selection(target, selection.clone())
                    .await?;
                Ok(json!({ "filename": target }))
            }
            other => Err(BridgeError::Internal(format!(
                "command {other:?} is not document-targeted"
            ))),
        }
    }

    /// Resolve the target document on the handler's behalf.
    ///
    /// An explicit filename must be well-formed and open. With no explicit
    /// filename a single open document is chosen; more than one candidate is
    /// an ambiguous target the caller must disambiguate.
    async fn resolve_target(&self, filename: Option<&String>) -> BridgeResult<String> {
        let open = self.handler.open_documents().await;
        if let Some(filename) = filename {
            validate::validate_filename(filename).map_err(BridgeError::InvalidParameter)?;
            if !open.iter().any(|candidate| candidate == filename) {
                return Err(BridgeError::NotFound(format!(
                    "document '{filename}' is not open"
                )));
            }
            return Ok(filename.clone());
        }

        match open.as_slice() {
            [] => Err(BridgeError::NotFound("no documents are open".to_string())),
            [only] => Ok(only.clone()),
            _ => Err(BridgeError::AmbiguousTarget { available: open }),
        }
    }

    fn controller(&self, name: &str) -> BridgeResult<Arc<crate::supervisor::ServiceController>> {
        self.supervisor
            .get(name)
            .ok_or_else(|| BridgeError::NotFound(format!("service '{name}' is not registered")))
    }

    /// A service-level failure observed during a command drops that
    /// service's controller out of `Healthy`.
    fn record_service_failure(&self, err: &BridgeError) {
        if let BridgeError::ServiceUnavailable { service, .. } = err {
            if let Some(controller) = self.supervisor.get(service) {
                controller.report_command_failure();
            }
        }
    }
}

fn command_filename(command: &Command) -> Option<&String> {
    match command {
        Command::GetTimeState { filename }
        | Command::SetTimeState { filename, .. }
        | Command::GetViewport { filename }
        | Command::SetViewport { filename, .. }
        | Command::GetSelection { filename }
        | Command::SetSelection { filename, .. } => filename.as_ref(),
        _ => None,
    }
}
