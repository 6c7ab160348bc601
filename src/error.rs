//! Error types for the Warden supervisor and command bridge
//!
//! Domain errors use thiserror; every failure crossing a component boundary
//! is coerced into a wire-level [`TypedError`] before it reaches a transport.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Stable numeric error codes carried by [`TypedError`].
///
/// Protocol codes follow the JSON-RPC reserved range; application codes
/// occupy 1000–1999 so the two spaces cannot collide.
pub mod code {
    /// Request line was not parseable JSON
    pub const PARSE_ERROR: i64 = -32700;
    /// Envelope was structurally invalid (bad id, missing method)
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method name
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Params did not decode into the method's payload
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal dispatcher fault
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Required bridge/service could not be reached
    pub const CONNECTION_FAILED: i64 = 1001;
    /// Dependent service reachable but reporting failure
    pub const SERVICE_UNAVAILABLE: i64 = 1002;
    /// Payload failed semantic validation
    pub const INVALID_PARAMETER: i64 = 1003;
    /// Bounded retries exhausted
    pub const RETRIES_EXHAUSTED: i64 = 1004;
    /// Named resource does not exist
    pub const NOT_FOUND: i64 = 1005;
    /// Multiple candidate resources and no explicit target
    pub const AMBIGUOUS_TARGET: i64 = 1006;
}

/// Wire-level error value: stable code, human message, optional data.
///
/// Constructed once at the failure site and never mutated while propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedError {
    /// Stable numeric code (see [`code`])
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional structured payload (e.g. disambiguation candidates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TypedError {
    /// Build an error with no structured data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build an error carrying structured data.
    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Supervisor-side failures raised by the lifecycle manager
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The service's listening port is already bound by another process
    #[error("{server_name} failed to start: port {port} is already in use")]
    PortConflict {
        /// Display name of the service
        server_name: String,
        /// Port parsed from the health-check URL, falling back to the
        /// scheme default (0 when neither exists)
        port: u16,
    },

    /// Start callback failed for a reason other than a port conflict
    #[error("{server_name} failed to start: {detail}")]
    Startup {
        /// Display name of the service
        server_name: String,
        /// Description of the underlying fault
        detail: String,
    },

    /// Health endpoint never reported success within the startup window
    #[error("{server_name} did not become healthy within {timeout_ms}ms")]
    HealthCheckTimeout {
        /// Display name of the service
        server_name: String,
        /// Startup window that elapsed
        timeout_ms: u64,
    },

    /// A caller-supplied lifecycle callback failed
    #[error("{server_name} callback '{callback}' failed: {detail}")]
    Callback {
        /// Display name of the service
        server_name: String,
        /// Which callback failed (e.g. `on_restart`)
        callback: &'static str,
        /// Description of the underlying fault
        detail: String,
    },

    /// Descriptor or supervisor configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SupervisorError {
    /// Coerce into the wire form. Lifecycle failures all surface as
    /// `SERVICE_UNAVAILABLE` with a `kind` tag in the data payload.
    pub fn to_wire(&self) -> TypedError {
        let data = match self {
            Self::PortConflict { server_name, port } => json!({
                "kind": "port_conflict",
                "server_name": server_name,
                "port": port,
            }),
            Self::Startup { server_name, .. } => json!({
                "kind": "startup_failure",
                "server_name": server_name,
            }),
            Self::HealthCheckTimeout {
                server_name,
                timeout_ms,
            } => json!({
                "kind": "health_check_timeout",
                "server_name": server_name,
                "timeout_ms": timeout_ms,
            }),
            Self::Callback {
                server_name,
                callback,
                ..
            } => json!({
                "kind": "callback_failure",
                "server_name": server_name,
                "callback": callback,
            }),
            Self::Config(_) => json!({ "kind": "config" }),
        };
        TypedError::with_data(code::SERVICE_UNAVAILABLE, self.to_string(), data)
    }
}

/// Convenience result alias for supervisor operations
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Bridge-side failures raised during command dispatch
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Request line was not parseable JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Envelope was structurally invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown method name
    #[error("method '{0}' not found")]
    MethodNotFound(String),

    /// Params failed to decode into the method's typed payload
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Payload decoded but failed semantic validation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Named resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Multiple candidate resources and the caller named none
    #[error("ambiguous target: {} documents are open, specify a filename", available.len())]
    AmbiguousTarget {
        /// The candidate resources the caller may choose from
        available: Vec<String>,
    },

    /// A required bridge or service could not be reached
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A dependent service is reachable but reporting failure
    #[error("service '{service}' unavailable: {detail}")]
    ServiceUnavailable {
        /// Name of the failing service
        service: String,
        /// Description of the failure
        detail: String,
    },

    /// Bounded retries exhausted; terminal report to the caller
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last underlying error
        last_error: String,
    },

    /// Internal dispatcher fault
    #[error("internal error: {0}")]
    Internal(String),

    /// Lifecycle failure surfaced through a supervisor command
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl BridgeError {
    /// Whether a caller may retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ServiceUnavailable { .. }
        )
    }

    /// Coerce into the wire form.
    pub fn to_wire(&self) -> TypedError {
        match self {
            Self::Parse(_) => TypedError::new(code::PARSE_ERROR, self.to_string()),
            Self::InvalidRequest(_) => TypedError::new(code::INVALID_REQUEST, self.to_string()),
            Self::MethodNotFound(_) => TypedError::new(code::METHOD_NOT_FOUND, self.to_string()),
            Self::InvalidParams(_) => TypedError::new(code::INVALID_PARAMS, self.to_string()),
            Self::InvalidParameter(_) => TypedError::new(code::INVALID_PARAMETER, self.to_string()),
            Self::NotFound(_) => TypedError::new(code::NOT_FOUND, self.to_string()),
            Self::AmbiguousTarget { available } => TypedError::with_data(
                code::AMBIGUOUS_TARGET,
                self.to_string(),
                json!({ "available": available }),
            ),
            Self::ConnectionFailed(_) => TypedError::new(code::CONNECTION_FAILED, self.to_string()),
            Self::ServiceUnavailable { service, .. } => TypedError::with_data(
                code::SERVICE_UNAVAILABLE,
                self.to_string(),
                json!({ "service": service }),
            ),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => TypedError::with_data(
                code::RETRIES_EXHAUSTED,
                self.to_string(),
                json!({ "attempts": attempts, "last_error": last_error }),
            ),
            Self::Internal(_) => TypedError::new(code::INTERNAL_ERROR, self.to_string()),
            Self::Supervisor(err) => err.to_wire(),
        }
    }
}

/// Convenience result alias for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Configuration loading errors for the daemon
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config decoded but failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience result alias for configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
