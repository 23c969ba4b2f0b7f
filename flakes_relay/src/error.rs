//! Fatal startup errors.
//!
//! Only these cross the `RelayCore` boundary; the binary maps every one of
//! them to exit code 1. Link and decoding failures are recoverable and stay
//! inside the connection manager.

use crate::protocol::ProtocolError;
use flakes_common::config::ConfigError;
use flakes_common::driver::DriverError;
use thiserror::Error;

/// Error types for relay startup.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Output driver could not be created or initialized.
    #[error("Hardware initialization failed: {0}")]
    HardwareInit(#[from] DriverError),

    /// Controller socket resource could not be set up.
    #[error("Socket setup failed: {0}")]
    SocketCreate(String),

    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Handshake could not be built from the configuration.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lifecycle step was skipped.
    #[error("Relay not initialized: {0}")]
    NotInitialized(&'static str),
}
