//! Output driver trait and error types.
//!
//! This module defines:
//! - `OutputDriver` trait - Capability used by the dimming engine to drive pins
//! - `DriverError` enum - Error types for driver operations
//! - `DriverFactory` type alias - Factory function type
//! - `DriverDiagnostics` struct - Optional driver diagnostics

use crate::config::OutputConfig;
use crate::consts::MAX_CHANNELS;
use thiserror::Error;

/// Error types for output driver operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Driver or hardware initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Channel cannot be mapped to an output
    #[error("Channel {channel} cannot be configured (driver has {available} outputs)")]
    InvalidChannel {
        /// Requested channel index
        channel: usize,
        /// Number of outputs the driver provides
        available: usize,
    },

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn OutputDriver>;

/// Optional driver diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DriverDiagnostics {
    /// Number of channels configured as outputs
    pub configured_outputs: usize,
    /// Number of `set_level` calls since init
    pub level_writes: u64,
    /// Driver-specific diagnostics
    pub custom: Option<String>,
}

/// Trait defining the interface for output drivers.
///
/// The relay manages drivers through this trait so the dimming engine
/// stays independent of the physical output hardware.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the scheduling loop starts
/// 2. `configure_as_output()` - Called once per channel at startup
/// 3. `set_level()` - Called on every ON/OFF transition from the loop
/// 4. `shutdown()` - Called when the relay is stopping
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `init()` | None (pre-loop) |
/// | `configure_as_output()` | None (pre-loop) |
/// | `set_level()` | **HARD**, must not block |
/// | `shutdown()` | None (post-loop) |
pub trait OutputDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Number of physical outputs this driver can back.
    fn max_outputs(&self) -> usize {
        MAX_CHANNELS
    }

    /// Initialize the driver for the configured output bank.
    ///
    /// # Errors
    /// Return `DriverError::InitFailed` if the hardware cannot be opened.
    fn init(&mut self, config: &OutputConfig) -> Result<(), DriverError>;

    /// Put the output backing `channel` into output mode.
    fn configure_as_output(&mut self, channel: usize) -> Result<(), DriverError>;

    /// Drive the output backing `channel` high (`true`) or low (`false`).
    ///
    /// Called from the scheduling loop; implementations must not block.
    fn set_level(&mut self, channel: usize, high: bool);

    /// Graceful shutdown of the driver.
    fn shutdown(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Get driver-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver;

    impl OutputDriver for NullDriver {
        fn name(&self) -> &'static str {
            "null"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, _config: &OutputConfig) -> Result<(), DriverError> {
            Ok(())
        }

        fn configure_as_output(&mut self, _channel: usize) -> Result<(), DriverError> {
            Ok(())
        }

        fn set_level(&mut self, _channel: usize, _high: bool) {}
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::InitFailed("gpio busy".to_string());
        assert!(err.to_string().contains("gpio busy"));

        let err = DriverError::InvalidChannel {
            channel: 20,
            available: 17,
        };
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_default_trait_methods() {
        let mut driver = NullDriver;
        assert!(driver.diagnostics().is_none());
        assert_eq!(driver.max_outputs(), MAX_CHANNELS);
        assert!(driver.shutdown().is_ok());
    }

    #[test]
    fn test_driver_diagnostics_default() {
        let diag = DriverDiagnostics::default();
        assert_eq!(diag.configured_outputs, 0);
        assert_eq!(diag.level_writes, 0);
        assert!(diag.custom.is_none());
    }
}
