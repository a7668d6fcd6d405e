//! The `Simulator` aggregate: owns the parameter store, session engine,
//! and connection-request listener, and wires them together.

pub mod simulator;

pub use simulator::{Simulator, SimulatorEvent};
