//! Simulation driver module.
//!
//! Software outputs for running the relay without GPIO hardware.

mod driver;

pub use driver::{SimulatedOutput, SimulationDriver};

use flakes_common::driver::OutputDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn OutputDriver> {
    Box::new(SimulationDriver::new())
}
