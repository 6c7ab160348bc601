//! Wire envelopes and the typed command set
//!
//! Transports hand the bridge an untyped [`RequestEnvelope`]; the first
//! thing dispatch does is resolve it into a [`Command`] variant with a typed
//! payload. Unknown methods and undecodable params are rejected here, before
//! any handler runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, TypedError};

/// Untyped request envelope as it arrives off the wire.
#[derive(Debug, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, echoed verbatim in the response
    pub id: Value,
    /// Method name
    pub method: String,
    /// Method parameters, defaulting to an empty object
    #[serde(default)]
    pub params: Value,
}

/// Response envelope: exactly one of `result` or `error` is present.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    /// Correlation id echoed from the request
    pub id: Value,
    /// Successful result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Typed failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TypedError>,
}

impl ResponseEnvelope {
    /// Build a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: Value, error: TypedError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Temporal state carried inside command params. Validated before use,
/// never corrected in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeState {
    /// Current playhead position (RFC 3339)
    pub current: String,
    /// Start of the covered range (RFC 3339)
    pub start: String,
    /// End of the covered range (RFC 3339)
    pub end: String,
}

/// Geographic viewport as `[west, south, east, north]`. `west > east` is a
/// legal antimeridian crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportState {
    /// Bounding box, exactly four numbers
    pub bounds: Vec<f64>,
}

/// Selected feature identifiers within a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Selected feature ids
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One variant per supported method, each with a typed payload.
#[derive(Debug, Clone)]
pub enum Command {
    /// Protocol handshake; reports versions and features
    Handshake {
        /// Client display name
        client: String,
        /// Protocol version the client speaks
        protocol_version: String,
    },
    /// List every supervised service with its state
    ListServices,
    /// Status of one supervised service
    ServiceStatus {
        /// Service name
        name: String,
    },
    /// Start a supervised service and wait for health
    StartService {
        /// Service name
        name: String,
    },
    /// Stop a supervised service
    StopService {
        /// Service name
        name: String,
    },
    /// Restart a supervised service and wait for health
    RestartService {
        /// Service name
        name: String,
    },
    /// List open documents (disambiguation candidates)
    ListOpenDocuments,
    /// Read a document's time state
    GetTimeState {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
    },
    /// Replace a document's time state
    SetTimeState {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
        /// Validated before the handler runs
        state: TimeState,
    },
    /// Read a document's viewport
    GetViewport {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
    },
    /// Replace a document's viewport
    SetViewport {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
        /// Validated before the handler runs
        state: ViewportState,
    },
    /// Read a document's selection
    GetSelection {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
    },
    /// Replace a document's selection
    SetSelection {
        /// Explicit target, or none to auto-resolve
        filename: Option<String>,
        /// New selection
        selection: Selection,
    },
    /// Surface a message to the embedded UI
    Notify {
        /// Message text
        message: String,
    },
}

#[derive(Deserialize)]
struct HandshakeParams {
    client: String,
    protocol_version: String,
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Deserialize)]
struct TargetParams {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Deserialize)]
struct SetTimeParams {
    #[serde(default)]
    filename: Option<String>,
    state: TimeState,
}

#[derive(Deserialize)]
struct SetViewportParams {
    #[serde(default)]
    filename: Option<String>,
    state: ViewportState,
}

#[derive(Deserialize)]
struct SetSelectionParams {
    #[serde(default)]
    filename: Option<String>,
    selection: Selection,
}

#[derive(Deserialize)]
struct NotifyParams {
    message: String,
}

fn decode<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, BridgeError> {
    serde_json::from_value(params.clone()).map_err(|err| BridgeError::InvalidParams(err.to_string()))
}

impl Command {
    /// Resolve a method name and raw params into a typed command.
    pub fn parse(method: &str, params: &Value) -> Result<Self, BridgeError> {
        match method {
            "handshake" => {
                let p: HandshakeParams = decode(params)?;
                Ok(Self::Handshake {
                    client: p.client,
                    protocol_version: p.protocol_version,
                })
            }
            "list_services" => Ok(Self::ListServices),
            "service_status" => {
                let p: NameParams = decode(params)?;
                Ok(Self::ServiceStatus { name: p.name })
            }
            "start_service" => {
                let p: NameParams = decode(params)?;
                Ok(Self::StartService { name: p.name })
            }
            "stop_service" => {
                let p: NameParams = decode(params)?;
                Ok(Self::StopService { name: p.name })
            }
            "restart_service" => {
                let p: NameParams = decode(params)?;
                Ok(Self::RestartService { name: p.name })
            }
            "list_open_documents" => Ok(Self::ListOpenDocuments),
            "get_time_state" => {
                let p: TargetParams = decode(params)?;
                Ok(Self::GetTimeState {
                    filename: p.filename,
                })
            }
            "set_time_state" => {
                let p: SetTimeParams = decode(params)?;
                Ok(Self::SetTimeState {
                    filename: p.filename,
                    state: p.state,
                })
            }
            "get_viewport" => {
                let p: TargetParams = decode(params)?;
                Ok(Self::GetViewport {
                    filename: p.filename,
                })
            }
            "set_viewport" => {
                let p: SetViewportParams = decode(params)?;
                Ok(Self::SetViewport {
                    filename: p.filename,
                    state: p.state,
                })
            }
            "get_selection" => {
                let p: TargetParams = decode(params)?;
                Ok(Self::GetSelection {
                    filename: p.filename,
                })
            }
            "set_selection" => {
                let p: SetSelectionParams = decode(params)?;
                Ok(Self::SetSelection {
                    filename: p.filename,
                    selection: p.selection,
                })
            }
            "notify" => {
                let p: NotifyParams = decode(params)?;
                Ok(Self::Notify { message: p.message })
            }
            other => Err(BridgeError::MethodNotFound(other.to_string())),
        }
    }
}
