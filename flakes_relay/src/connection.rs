//! Connection manager: controller link lifecycle, liveness and reconnection.
//!
//! ```text
//!                 start()
//!  DISCONNECTED ──────────► CONNECTING ──(connect ok, handshake sent)──► CONNECTED
//!       ▲                        │                                          │
//!       │    connect failed      │          missed liveness window          │
//!       └────────────────────────┘       ┌──────────────────────────────────┘
//!       ▲                                ▼
//!       │   EOF / socket error      RECONNECTING ──(abort link, start())──► CONNECTING
//!       └─────────── CONNECTED
//! ```
//!
//! Driven from the scheduling thread once per update tick:
//! 1. poll a pending connection attempt (never blocks)
//! 2. drain every buffered inbound byte into the channel bank
//! 3. advance the liveness counter; after `heartbeat_ticks` ticks either send
//!    a PING or, if the previous PING saw no inbound record, reconnect
//!
//! The liveness counter also runs while `Disconnected`, so an unreachable
//! controller is retried every second window.

pub mod tcp;

use crate::channel::ChannelBank;
use crate::protocol::{Handshake, PING_FRAME, UpdateDecoder};
use flakes_common::consts::RECV_CHUNK;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

pub use tcp::{TcpConnector, TcpLink};

/// Recoverable connection errors. Logged, never propagated past the manager.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Controller address could not be resolved.
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// Connection worker could not be started.
    #[error("Failed to start connection worker: {0}")]
    Spawn(String),

    /// Socket-level failure (refused, timed out, unreachable...).
    #[error("Connection failed: {0}")]
    Io(#[from] io::Error),

    /// The connection attempt ended without a result.
    #[error("Connection attempt aborted")]
    Aborted,
}

/// Byte-stream link to the controller.
pub trait Link {
    /// Copy already-buffered inbound bytes into `buf` without blocking.
    ///
    /// Returns `Ok(0)` when nothing is buffered and
    /// `Err(ErrorKind::UnexpectedEof)` once the peer has closed the stream.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a complete message.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Abortive close. The link is not used afterwards.
    fn abort(&mut self);
}

/// Factory for controller links.
///
/// `start()` begins an attempt and returns immediately; `poll()` yields its
/// result once available. A fresh link is produced for every attempt.
pub trait Connector {
    /// Link type produced by this connector.
    type Link: Link;

    /// Begin a connection attempt.
    fn start(&mut self) -> Result<(), ConnectError>;

    /// Result of the pending attempt, or `None` while still in progress
    /// (or when no attempt is pending).
    fn poll(&mut self) -> Option<Result<Self::Link, ConnectError>>;

    /// Forget a pending attempt.
    fn cancel(&mut self) {}

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// Link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link and no attempt in progress.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Link up, handshake sent.
    Connected,
    /// Transient: tearing down a failed link before a new attempt.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
        };
        f.write_str(name)
    }
}

/// Link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful connections (handshake sent).
    pub connects: u64,
    /// Failed connection attempts.
    pub connect_failures: u64,
    /// Reconnects of a live link after a missed liveness window.
    pub reconnects: u64,
    /// Connection retries started while `Disconnected`.
    pub retries: u64,
    /// PING frames sent.
    pub pings_sent: u64,
    /// Level updates written to the bank.
    pub updates_applied: u64,
    /// Level updates discarded (channel out of range).
    pub updates_discarded: u64,
    /// Raw bytes received.
    pub bytes_received: u64,
}

/// Owns the controller link and feeds decoded levels into the channel bank.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    state: ConnectionState,
    handshake: Handshake,
    decoder: UpdateDecoder,
    /// Update ticks per liveness window (`ups * heartbeat_interval_s`).
    heartbeat_ticks: u32,
    ticks_since_ping_check: u32,
    ping_outstanding: bool,
    stats: ConnectionStats,
    recv_buf: [u8; RECV_CHUNK],
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a disconnected manager.
    pub fn new(
        connector: C,
        handshake: Handshake,
        channel_count: usize,
        heartbeat_ticks: u32,
    ) -> Self {
        Self {
            connector,
            link: None,
            state: ConnectionState::Disconnected,
            handshake,
            decoder: UpdateDecoder::new(channel_count),
            heartbeat_ticks,
            ticks_since_ping_check: 0,
            ping_outstanding: false,
            stats: ConnectionStats::default(),
            recv_buf: [0; RECV_CHUNK],
        }
    }

    /// Begin the first connection attempt.
    ///
    /// A failed attempt is not an error; the heartbeat retries it.
    ///
    /// # Errors
    /// Returns the connector's error if no attempt could be started at all
    /// (the manager stays `Disconnected`).
    pub fn start(&mut self) -> Result<(), ConnectError> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        info!("Connecting to {}...", self.connector.endpoint());
        self.connector.start()?;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Run one update tick against `bank`.
    pub fn update_tick(&mut self, bank: &mut ChannelBank) {
        if self.state == ConnectionState::Connecting {
            self.poll_connect();
        }
        if self.state == ConnectionState::Connected {
            self.drain(bank);
        }
        if self.state != ConnectionState::Connecting {
            self.check_liveness();
        }
    }

    /// Tear down the link and forget any pending attempt.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.connector.cancel();
        self.enter_disconnected();
        info!("Controller link closed");
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a link is up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True if a PING was sent and no inbound record has arrived since.
    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }

    /// Update ticks counted in the current liveness window.
    pub fn ticks_since_ping_check(&self) -> u32 {
        self.ticks_since_ping_check
    }

    /// Link counters.
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Handshake sent on every connection.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Underlying connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
        info!("Connecting to {}...", self.connector.endpoint());
        if let Err(e) = self.connector.start() {
            self.connect_failed(e);
        }
    }

    fn poll_connect(&mut self) {
        match self.connector.poll() {
            None => {}
            Some(Ok(link)) => self.on_connected(link),
            Some(Err(e)) => self.connect_failed(e),
        }
    }

    fn on_connected(&mut self, mut link: C::Link) {
        if let Err(e) = link.send(self.handshake.as_bytes()) {
            link.abort();
            self.connect_failed(ConnectError::Io(e));
            return;
        }
        info!(
            "Connected to {} as {}",
            self.connector.endpoint(),
            self.handshake.relay_name()
        );
        self.link = Some(link);
        self.state = ConnectionState::Connected;
        self.stats.connects += 1;
        self.reset_liveness();
    }

    fn connect_failed(&mut self, error: ConnectError) {
        warn!(
            "Failed to connect to {}: {}",
            self.connector.endpoint(),
            error
        );
        self.stats.connect_failures += 1;
        self.enter_disconnected();
    }

    /// Drain every buffered byte. Any complete record clears the pending PING.
    fn drain(&mut self, bank: &mut ChannelBank) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let mut applied = 0u64;
        let mut discarded = 0u64;
        let mut framed_total = 0usize;

        let failure = loop {
            match link.read_available(&mut self.recv_buf) {
                Ok(0) => break None,
                Ok(n) => {
                    self.stats.bytes_received += n as u64;
                    framed_total += self.decoder.feed(&self.recv_buf[..n], |result| {
                        match result {
                            Ok(update) => {
                                match bank.set_level(usize::from(update.channel), update.level) {
                                    Ok(()) => applied += 1,
                                    Err(e) => {
                                        debug!("Discarding level update: {}", e);
                                        discarded += 1;
                                    }
                                }
                            }
                            Err(e) => {
                                debug!("Discarding level update: {}", e);
                                discarded += 1;
                            }
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Some(e),
            }
        };

        self.stats.updates_applied += applied;
        self.stats.updates_discarded += discarded;
        if framed_total > 0 {
            trace!("Drained {} level updates", framed_total);
            self.ping_outstanding = false;
        }

        if let Some(e) = failure {
            self.link_lost(&e);
        }
    }

    fn check_liveness(&mut self) {
        self.ticks_since_ping_check += 1;
        if self.ticks_since_ping_check <= self.heartbeat_ticks {
            return;
        }
        self.ticks_since_ping_check = 0;

        if !self.ping_outstanding {
            self.ping_outstanding = true;
            if self.state == ConnectionState::Connected {
                self.send_ping();
            }
        } else if self.state == ConnectionState::Connected {
            warn!(
                "No traffic from {} since last PING, reconnecting...",
                self.connector.endpoint()
            );
            self.stats.reconnects += 1;
            self.reconnect();
        } else {
            info!("Retrying connection to {}", self.connector.endpoint());
            self.stats.retries += 1;
            self.reconnect();
        }
    }

    fn send_ping(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        match link.send(PING_FRAME) {
            Ok(()) => {
                self.stats.pings_sent += 1;
                trace!("PING sent to {}", self.connector.endpoint());
            }
            Err(e) => self.link_lost(&e),
        }
    }

    fn reconnect(&mut self) {
        self.state = ConnectionState::Reconnecting;
        self.teardown();
        self.reset_liveness();
        self.begin_connect();
    }

    fn link_lost(&mut self, error: &io::Error) {
        warn!(
            "Link to {} lost ({}), state {} -> {}",
            self.connector.endpoint(),
            error,
            self.state,
            ConnectionState::Disconnected
        );
        self.teardown();
        self.enter_disconnected();
    }

    fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.abort();
        }
        if let Some(e) = self.decoder.reset() {
            debug!("Dropping partial record on teardown: {}", e);
        }
    }

    fn enter_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.reset_liveness();
    }

    fn reset_liveness(&mut self) {
        self.ticks_since_ping_check = 0;
        self.ping_outstanding = false;
    }
}
