//! System-wide constants for the Show Flakes relay.
//!
//! Single source of truth for wire tokens, numeric limits and the
//! defaults of the reference deployment (17 channels, 60 FPS, 25 UPS).

use static_assertions::const_assert;

/// Largest addressable channel count. Channel indices travel as a single byte.
pub const MAX_CHANNELS: usize = 256;

/// Default number of output channels.
pub const DEFAULT_CHANNEL_COUNT: usize = 17;

/// Highest channel level (output held on for the whole frame).
pub const MAX_LEVEL: u8 = 255;

/// Default frame rate (frames per second).
pub const DEFAULT_FPS: u32 = 60;

/// Default network update rate (update ticks per second).
pub const DEFAULT_UPS: u32 = 25;

/// Upper bound for both the frame and the update rate.
pub const MAX_RATE_HZ: u32 = 1000;

/// Default minimum sleep between scheduler ticks in microseconds.
pub const DEFAULT_TICK_INTERVAL_US: u64 = 50;

/// Default controller host.
pub const DEFAULT_HOST: &str = "192.168.1.12";

/// Default controller TCP port.
pub const DEFAULT_PORT: u16 = 5466;

/// Default relay identifier sent in the handshake.
pub const DEFAULT_RELAY_NAME: &str = "SFR-01";

/// Maximum relay identifier length in bytes, excluding the NUL terminator.
pub const MAX_RELAY_NAME_LEN: usize = 32;

/// Default liveness window in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_S: u32 = 5;

/// Default bound on a single connection attempt in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Liveness check sent to the controller, NUL terminator included.
pub const PING_FRAME: &[u8] = b"PING\0";

/// Size of one level update record on the wire.
pub const LEVEL_UPDATE_LEN: usize = 2;

/// Read buffer size used when draining the link.
pub const RECV_CHUNK: usize = 100;

/// Default service name used in logs.
pub const DEFAULT_SERVICE_NAME: &str = "flakes_relay";

/// Default output driver.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flakes/relay.toml";

const_assert!(MAX_CHANNELS <= u8::MAX as usize + 1);
const_assert!(DEFAULT_CHANNEL_COUNT <= MAX_CHANNELS);
const_assert!(DEFAULT_RELAY_NAME.len() <= MAX_RELAY_NAME_LEN);
const_assert!(RECV_CHUNK >= LEVEL_UPDATE_LEN);
