//! Driver registry for output drivers.
//!
//! Maps driver names to factories and checks a new driver against the
//! configured bank before the relay starts initializing outputs.
//! Constructed at startup and passed to `RelayCore` by value; no global
//! state.

use flakes_common::config::OutputConfig;
use flakes_common::driver::{DriverError, DriverFactory, OutputDriver};
use std::collections::HashMap;
use tracing::debug;

/// Registry of available output drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in driver.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.insert(name, factory).is_some() {
            debug!("Driver '{}' re-registered", name);
        }
    }

    /// Create the named driver for a bank of `outputs.channel_count` channels.
    ///
    /// # Errors
    /// - `DriverError::DriverNotFound` if the name is unknown (the message
    ///   lists the registered drivers)
    /// - `DriverError::InvalidChannel` if the driver backs fewer outputs
    ///   than the bank has channels
    pub fn create_for_outputs(
        &self,
        name: &str,
        outputs: &OutputConfig,
    ) -> Result<Box<dyn OutputDriver>, DriverError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            DriverError::DriverNotFound(format!(
                "'{name}' (available: {})",
                self.list_drivers().join(", ")
            ))
        })?;

        let driver = factory();
        let available = driver.max_outputs();
        if outputs.channel_count > available {
            return Err(DriverError::InvalidChannel {
                channel: outputs.channel_count - 1,
                available,
            });
        }
        Ok(driver)
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four-output board.
    struct QuadDriver;

    impl OutputDriver for QuadDriver {
        fn name(&self) -> &'static str {
            "quad"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn max_outputs(&self) -> usize {
            4
        }

        fn init(&mut self, _config: &OutputConfig) -> Result<(), DriverError> {
            Ok(())
        }

        fn configure_as_output(&mut self, _channel: usize) -> Result<(), DriverError> {
            Ok(())
        }

        fn set_level(&mut self, _channel: usize, _high: bool) {}
    }

    fn create_quad_driver() -> Box<dyn OutputDriver> {
        Box::new(QuadDriver)
    }

    fn outputs(channel_count: usize) -> OutputConfig {
        OutputConfig {
            channel_count,
            driver: "quad".to_string(),
        }
    }

    #[test]
    fn creates_driver_that_fits_the_bank() {
        let mut reg = DriverRegistry::new();
        reg.register("quad", create_quad_driver);

        let driver = reg.create_for_outputs("quad", &outputs(4)).expect("fits");
        assert_eq!(driver.name(), "quad");
    }

    #[test]
    fn rejects_bank_larger_than_driver() {
        let mut reg = DriverRegistry::new();
        reg.register("quad", create_quad_driver);

        let result = reg.create_for_outputs("quad", &outputs(17));
        assert!(matches!(
            result,
            Err(DriverError::InvalidChannel {
                channel: 16,
                available: 4
            })
        ));
    }

    #[test]
    fn unknown_driver_lists_alternatives() {
        let reg = DriverRegistry::with_builtin_drivers();
        let Err(err) = reg.create_for_outputs("gpio", &outputs(4)) else {
            panic!("unknown driver was created");
        };
        assert!(matches!(err, DriverError::DriverNotFound(_)));
        let message = err.to_string();
        assert!(message.contains("gpio"));
        assert!(message.contains("simulation"));
    }

    #[test]
    fn list_is_sorted_and_reregistration_replaces() {
        let mut reg = DriverRegistry::new();
        reg.register("beta", create_quad_driver);
        reg.register("alpha", create_quad_driver);
        reg.register("beta", create_quad_driver);
        assert_eq!(reg.list_drivers(), vec!["alpha", "beta"]);
    }

    #[test]
    fn builtin_simulation_covers_largest_bank() {
        let reg = DriverRegistry::with_builtin_drivers();
        let driver = reg.create_for_outputs("simulation", &outputs(256));
        assert!(driver.is_ok());
    }
}
