//! Warden – service lifecycle supervision and command bridge
//!
//! This crate supervises dependent local network services and exposes their
//! state and operations to heterogeneous clients through one validated,
//! typed command protocol:
//! - Per-service lifecycle management with classified failure modes
//! - Health monitoring with distinct startup and steady-state thresholds
//! - A transport-agnostic command dispatcher fronted by two listeners
//! - Pure validators for temporal and geographic state payloads

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Transport-agnostic command bridge and its listeners
pub mod bridge;
/// Daemon configuration loading
pub mod config;
/// Error taxonomy and wire-level typed errors
pub mod error;
/// Service lifecycle supervision
pub mod supervisor;

pub use bridge::{Bridge, DocumentHandler};
pub use supervisor::{ServiceDescriptor, ServiceState, Supervisor};

/// Current version of the warden crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for command-bridge communication
pub const PROTOCOL_VERSION: &str = "1.0.0";
