//! Show Flakes Common Library
//!
//! This crate provides shared constants, configuration loading and the
//! output driver capability for the Show Flakes relay workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Protocol constants, limits and deployment defaults
//! - [`config`] - Configuration loading trait and relay configuration types
//! - [`driver`] - `OutputDriver` capability trait and `DriverError`
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use flakes_common::prelude::*;
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.timing.fps, DEFAULT_FPS);
//! ```

pub mod config;
pub mod consts;
pub mod driver;
pub mod prelude;
