//! Prelude module for common re-exports.
//!
//! ```rust
//! use flakes_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, NetworkConfig, OutputConfig, RelayConfig, SharedConfig,
    TimingConfig,
};

// ─── Output Drivers ─────────────────────────────────────────────────
pub use crate::driver::{DriverDiagnostics, DriverError, DriverFactory, OutputDriver};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    DEFAULT_CHANNEL_COUNT, DEFAULT_FPS, DEFAULT_UPS, MAX_CHANNELS, MAX_LEVEL, PING_FRAME,
};
