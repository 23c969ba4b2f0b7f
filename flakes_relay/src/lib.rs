//! # Show Flakes Relay Library
//!
//! Software-PWM dimming loop driven by a remote TCP controller.
//!
//! The relay drives a bank of on/off outputs. Each channel holds a level in
//! `0..=255`; the dimming engine turns that level into a duty cycle over a
//! fixed frame period. Levels arrive from the controller as 2-byte records,
//! and the connection manager keeps the link alive with periodic pings.
//!
//! # Module Structure
//!
//! - [`core`] - RelayCore struct, scheduling loop
//! - [`channel`] - Channel bank (levels and output states)
//! - [`clock`] - Monotonic periodic clocks
//! - [`dimming`] - Frame-clocked output shaping
//! - [`protocol`] - Handshake, ping and level-update codec
//! - [`connection`] - Link state machine and TCP transport
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Output driver implementations
//! - [`error`] - Fatal startup errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    flakes_relay (single crate)                   │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐   │
//! │  │ Connection   │──►│  RelayCore   │◄─►│  Driver Registry    │   │
//! │  │ Manager (UPS)│   │ (tick loop)  │   │                     │   │
//! │  └──────┬───────┘   └──────┬───────┘   └─────────────────────┘   │
//! │         │ levels           │ frame clock (FPS)                   │
//! │         ▼                  ▼                                     │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐   │
//! │  │ ChannelBank  │◄─►│ DimmingEngine│──►│  OutputDriver trait │   │
//! │  └──────────────┘   └──────────────┘   └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod channel;
pub mod clock;
pub mod connection;
pub mod core;
pub mod dimming;
pub mod driver_registry;
pub mod drivers;
pub mod error;
pub mod protocol;

// Re-export key types for convenience
pub use crate::channel::{ChannelBank, OutputState};
pub use crate::connection::{ConnectionManager, ConnectionState, TcpConnector};
pub use crate::core::RelayCore;
pub use crate::dimming::DimmingEngine;
pub use crate::driver_registry::DriverRegistry;
pub use crate::error::RelayError;
