//! Relay core: owns the channel bank and runs the dual-clock scheduling loop.
//!
//! One thread, one loop. Every tick the dimming engine evaluates the frame;
//! whenever the update clock is due the connection manager drains the link
//! into the bank before the next tick runs. Between ticks the loop sleeps for
//! the rest of `tick_interval`.

use crate::channel::ChannelBank;
use crate::clock::PeriodicClock;
use crate::connection::{
    ConnectionManager, ConnectionState, ConnectionStats, Connector, TcpConnector,
};
use crate::dimming::{DimmingEngine, FrameStats, TickOutcome};
use crate::driver_registry::DriverRegistry;
use crate::error::RelayError;
use crate::protocol::Handshake;
use flakes_common::config::RelayConfig;
use flakes_common::driver::OutputDriver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ticks between periodic loop statistics logs.
const STATS_LOG_INTERVAL_TICKS: u64 = 20_000;

/// Timing statistics for the scheduling loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    /// Scheduler ticks executed
    pub ticks: u64,
    /// Update ticks executed
    pub update_ticks: u64,
    /// Ticks whose work exceeded `tick_interval`
    pub overruns: u64,
    /// Longest tick observed
    pub max_tick_us: u64,
    /// Sum of tick durations for the average
    pub total_tick_us: u64,
}

impl LoopStats {
    /// Average tick duration in microseconds.
    pub fn avg_tick_us(&self) -> u64 {
        self.total_tick_us.checked_div(self.ticks).unwrap_or(0)
    }
}

/// Relay core: channel bank, dimming engine, controller link and driver.
pub struct RelayCore<C: Connector = TcpConnector> {
    /// Validated configuration
    config: RelayConfig,
    /// Driver factories
    registry: DriverRegistry,
    /// Channel levels and output states
    bank: ChannelBank,
    /// Frame-clocked output shaper
    engine: DimmingEngine,
    /// Network update cadence
    update_clock: PeriodicClock,
    /// Handshake built from the relay identifier
    handshake: Handshake,
    /// Controller link, once attached
    connection: Option<ConnectionManager<C>>,
    /// Active output driver
    driver: Option<Box<dyn OutputDriver>>,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    /// Loop statistics
    stats: LoopStats,
}

impl<C: Connector> RelayCore<C> {
    /// Create a relay core with the built-in drivers.
    ///
    /// # Errors
    /// `RelayError::Config` if validation fails,
    /// `RelayError::Protocol` if the relay identifier cannot be encoded.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        Self::with_registry(config, DriverRegistry::with_builtin_drivers())
    }

    /// Create a relay core with a custom driver registry.
    pub fn with_registry(
        config: RelayConfig,
        registry: DriverRegistry,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let handshake = Handshake::new(&config.network.relay_name)?;
        let now = Instant::now();

        info!(
            "RelayCore '{}' created: {} channels, {} FPS, {} UPS, heartbeat {}s",
            config.shared.service_name,
            config.outputs.channel_count,
            config.timing.fps,
            config.timing.ups,
            config.network.heartbeat_interval_s
        );

        Ok(Self {
            bank: ChannelBank::new(config.outputs.channel_count),
            engine: DimmingEngine::new(config.timing.frame_period(), now),
            update_clock: PeriodicClock::new(config.timing.update_period(), now),
            handshake,
            connection: None,
            driver: None,
            running: Arc::new(AtomicBool::new(false)),
            stats: LoopStats::default(),
            registry,
            config,
        })
    }

    /// Create, initialize and install the named output driver.
    ///
    /// # Errors
    /// `RelayError::HardwareInit` if the driver is unknown or fails to start.
    pub fn init_driver(&mut self, driver_name: &str) -> Result<(), RelayError> {
        info!("Initializing output driver '{}'...", driver_name);
        let driver = self
            .registry
            .create_for_outputs(driver_name, &self.config.outputs)?;
        self.install_driver(driver)
    }

    /// Initialize and install an already constructed driver.
    ///
    /// Every channel is configured as an output and driven high; the frame
    /// and update clocks restart.
    pub fn install_driver(&mut self, mut driver: Box<dyn OutputDriver>) -> Result<(), RelayError> {
        driver.init(&self.config.outputs)?;
        info!("Created driver: {} v{}", driver.name(), driver.version());

        let now = Instant::now();
        self.engine.initialize(&mut self.bank, driver.as_mut(), now)?;
        self.update_clock.restart(now);
        self.driver = Some(driver);
        Ok(())
    }

    /// Attach the controller link and begin the first connection attempt.
    ///
    /// A failed attempt is not an error: the loop keeps dimming with the
    /// current levels and the heartbeat retries later.
    ///
    /// # Errors
    /// `RelayError::SocketCreate` if the connector cannot start an attempt
    /// at all (no resources for the connection worker).
    pub fn attach_connector(&mut self, connector: C) -> Result<(), RelayError> {
        let mut manager = ConnectionManager::new(
            connector,
            self.handshake.clone(),
            self.bank.len(),
            self.config.heartbeat_ticks(),
        );
        let started = manager.start();
        self.connection = Some(manager);
        started.map_err(|e| RelayError::SocketCreate(e.to_string()))
    }

    /// Run one scheduler tick at `now`.
    ///
    /// # Errors
    /// `RelayError::NotInitialized` if no driver is installed.
    pub fn step(&mut self, now: Instant) -> Result<TickOutcome, RelayError> {
        let driver = self
            .driver
            .as_deref_mut()
            .ok_or(RelayError::NotInitialized("output driver"))?;

        let outcome = self.engine.tick(now, &mut self.bank, driver);

        if self.update_clock.is_due(now) {
            if let Some(connection) = self.connection.as_mut() {
                connection.update_tick(&mut self.bank);
            }
            self.update_clock.restart(now);
            self.stats.update_ticks += 1;
        }

        Ok(outcome)
    }

    /// Run the scheduling loop until the running flag is cleared.
    ///
    /// # Errors
    /// `RelayError::NotInitialized` if no driver is installed.
    pub fn run(&mut self) -> Result<(), RelayError> {
        if self.driver.is_none() {
            return Err(RelayError::NotInitialized("output driver"));
        }
        let tick_interval = self.config.timing.tick_interval();

        info!(
            "Starting RelayCore loop (frame={}us, update={}us, tick={}us)...",
            self.engine.frame_period().as_micros(),
            self.update_clock.period().as_micros(),
            tick_interval.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            self.step(tick_start)?;

            let elapsed = tick_start.elapsed();
            self.record_tick(elapsed, tick_interval);

            if elapsed < tick_interval {
                std::thread::sleep(tick_interval - elapsed);
            }
        }

        info!(
            "RelayCore loop stopped after {} ticks, {} frames (overruns: {})",
            self.stats.ticks,
            self.engine.stats().frames,
            self.stats.overruns
        );
        Ok(())
    }

    /// Stop the loop, close the link and shut the driver down.
    pub fn shutdown(&mut self) -> Result<(), RelayError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);

        if let Some(connection) = self.connection.as_mut() {
            connection.shutdown();
        }
        if let Some(driver) = self.driver.as_mut() {
            driver.shutdown()?;
        }
        Ok(())
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Channel bank.
    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    /// Controller link state (`Disconnected` until a connector is attached).
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, ConnectionManager::state)
    }

    /// Controller link manager, once attached.
    pub fn connection(&self) -> Option<&ConnectionManager<C>> {
        self.connection.as_ref()
    }

    /// Controller link counters.
    pub fn connection_stats(&self) -> ConnectionStats {
        self.connection
            .as_ref()
            .map(ConnectionManager::stats)
            .unwrap_or_default()
    }

    /// Active output driver.
    pub fn driver(&self) -> Option<&dyn OutputDriver> {
        self.driver.as_deref()
    }

    /// Loop statistics.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Dimming engine statistics.
    pub fn frame_stats(&self) -> FrameStats {
        self.engine.stats()
    }

    /// Active configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn record_tick(&mut self, elapsed: Duration, tick_interval: Duration) {
        let tick_us = elapsed.as_micros() as u64;
        self.stats.ticks += 1;
        self.stats.total_tick_us += tick_us;
        self.stats.max_tick_us = self.stats.max_tick_us.max(tick_us);

        if elapsed > tick_interval {
            self.stats.overruns += 1;
            if self.stats.overruns <= 10 || self.stats.overruns % 1000 == 0 {
                warn!(
                    "Tick overrun #{}: tick took {}us (target {}us)",
                    self.stats.overruns,
                    tick_us,
                    tick_interval.as_micros()
                );
            }
        }

        if self.stats.ticks % STATS_LOG_INTERVAL_TICKS == 0 {
            debug!(
                "Loop: {} ticks, avg={}us, max={}us, overruns={}, link={}",
                self.stats.ticks,
                self.stats.avg_tick_us(),
                self.stats.max_tick_us,
                self.stats.overruns,
                self.connection_state()
            );
        }
    }
}

impl RelayCore<TcpConnector> {
    /// Start connecting to the configured controller.
    ///
    /// The host is resolved by each attempt, so an unresolvable or
    /// unreachable controller only delays the first connection.
    ///
    /// # Errors
    /// `RelayError::SocketCreate` if no connection attempt can be started.
    pub fn connect_tcp(&mut self) -> Result<(), RelayError> {
        let network = &self.config.network;
        let connector = TcpConnector::new(network.address(), network.connect_timeout());
        self.attach_connector(connector)
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Shared buffer for captured log output.
    #[derive(Clone, Default)]
    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn creation_log_names_the_instance() {
        let sink = LogSink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut config = RelayConfig::default();
        config.shared.service_name = "flakes_stage_left".to_string();
        tracing::subscriber::with_default(subscriber, || {
            let _core: RelayCore = RelayCore::new(config).unwrap();
        });

        let logged = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("RelayCore 'flakes_stage_left' created"));
    }

    #[test]
    fn loop_stats_average() {
        let stats = LoopStats {
            ticks: 4,
            total_tick_us: 100,
            ..LoopStats::default()
        };
        assert_eq!(stats.avg_tick_us(), 25);
        assert_eq!(LoopStats::default().avg_tick_us(), 0);
    }

    #[test]
    fn step_requires_driver() {
        let mut core: RelayCore = RelayCore::new(RelayConfig::default()).unwrap();
        assert!(matches!(
            core.step(Instant::now()),
            Err(RelayError::NotInitialized(_))
        ));
        assert!(matches!(core.run(), Err(RelayError::NotInitialized(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RelayConfig::default();
        config.outputs.channel_count = 0;
        let result: Result<RelayCore, _> = RelayCore::new(config);
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn unknown_driver_is_hardware_init_error() {
        let mut core: RelayCore = RelayCore::new(RelayConfig::default()).unwrap();
        assert!(matches!(
            core.init_driver("ethercat"),
            Err(RelayError::HardwareInit(_))
        ));
        assert!(core.driver().is_none());
    }

    #[test]
    fn simulation_driver_starts_all_outputs_high() {
        let mut core: RelayCore = RelayCore::new(RelayConfig::default()).unwrap();
        core.init_driver("simulation").unwrap();

        let diag = core.driver().and_then(|d| d.diagnostics()).unwrap();
        assert_eq!(diag.configured_outputs, 17);
        assert_eq!(diag.custom.as_deref(), Some("11111111111111111"));
        assert_eq!(core.connection_state(), ConnectionState::Disconnected);
    }
}
