// src/error.rs

//! Error taxonomy shared by the bridge components.
//!
//! Lifecycle code wraps these in `anyhow::Error` with context; adapters
//! exposed to the engine never return them directly and instead map them to
//! the engine's null/zero/sentinel conventions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A device or file could not be found, opened or mapped.
    #[error("resource unavailable: {what}")]
    ResourceUnavailable {
        what: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("allocation of {size} bytes failed")]
    AllocationFailure { size: usize },

    /// The device or input subsystem refused a registration.
    #[error("registration failed: {0}")]
    RegistrationFailure(String),

    /// A null or stale handle was passed to an adapter.
    #[error("invalid handle")]
    InvalidHandle,

    #[error("geometry query failed for {path}")]
    GeometryQuery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A frame could not be composited onto the display surface.
    #[error("composite rejected: {0}")]
    Composite(String),

    /// The drive loop thread ended by panicking inside the engine.
    #[error("engine fault: {0}")]
    EngineFault(String),
}

impl BridgeError {
    pub fn unavailable(what: impl Into<String>) -> Self {
        BridgeError::ResourceUnavailable {
            what: what.into(),
            source: None,
        }
    }

    pub fn unavailable_io(what: impl Into<String>, source: io::Error) -> Self {
        BridgeError::ResourceUnavailable {
            what: what.into(),
            source: Some(source),
        }
    }
}

impl From<nix::Error> for BridgeError {
    fn from(err: nix::Error) -> Self {
        BridgeError::unavailable_io("host call failed", io::Error::from(err))
    }
}
