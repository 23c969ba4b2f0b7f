//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `OutputDriver` trait with in-memory
//! outputs. Every write is counted so tests and `--simulate` runs can check
//! the exact transitions the dimming engine produced.

use flakes_common::config::OutputConfig;
use flakes_common::driver::{DriverDiagnostics, DriverError, OutputDriver};
use tracing::{info, trace};

/// State of one simulated output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedOutput {
    /// Set by `configure_as_output`.
    pub configured: bool,
    /// Current level.
    pub high: bool,
    /// Number of `set_level` calls.
    pub writes: u64,
    /// Number of low → high edges.
    pub rising_edges: u64,
}

/// Simulation driver implementing the OutputDriver trait.
pub struct SimulationDriver {
    /// Driver name
    name: &'static str,
    /// Driver version
    version: &'static str,
    /// Initialized flag
    initialized: bool,
    /// One entry per channel
    outputs: Vec<SimulatedOutput>,
    /// Total writes across all outputs
    level_writes: u64,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            outputs: Vec::new(),
            level_writes: 0,
        }
    }

    /// Simulated output for `channel`.
    pub fn output(&self, channel: usize) -> Option<&SimulatedOutput> {
        self.outputs.get(channel)
    }

    /// Current level of every output.
    pub fn levels(&self) -> Vec<bool> {
        self.outputs.iter().map(|o| o.high).collect()
    }

    /// True between `init()` and `shutdown()`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &OutputConfig) -> Result<(), DriverError> {
        if config.channel_count == 0 {
            return Err(DriverError::InitFailed(
                "simulation driver needs at least one channel".to_string(),
            ));
        }
        info!(
            "Initializing simulation driver with {} outputs",
            config.channel_count
        );
        self.outputs = vec![SimulatedOutput::default(); config.channel_count];
        self.level_writes = 0;
        self.initialized = true;
        Ok(())
    }

    fn configure_as_output(&mut self, channel: usize) -> Result<(), DriverError> {
        let available = self.outputs.len();
        let output = self
            .outputs
            .get_mut(channel)
            .ok_or(DriverError::InvalidChannel { channel, available })?;
        output.configured = true;
        Ok(())
    }

    fn set_level(&mut self, channel: usize, high: bool) {
        let Some(output) = self.outputs.get_mut(channel) else {
            trace!("Ignoring write to unknown output {}", channel);
            return;
        };
        if !output.configured {
            trace!("Ignoring write to unconfigured output {}", channel);
            return;
        }
        if high && !output.high {
            output.rising_edges += 1;
        }
        output.high = high;
        output.writes += 1;
        self.level_writes += 1;
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        info!(
            "Simulation driver shutdown after {} writes",
            self.level_writes
        );
        self.initialized = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        let pattern: String = self
            .outputs
            .iter()
            .map(|o| if o.high { '1' } else { '0' })
            .collect();
        Some(DriverDiagnostics {
            configured_outputs: self.outputs.iter().filter(|o| o.configured).count(),
            level_writes: self.level_writes,
            custom: Some(pattern),
        })
    }
}
