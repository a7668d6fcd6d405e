//! Shared utilities for the CWMP simulator

pub mod ids;
pub mod logger;

pub use logger::setup_logging;
