//! cwmp-sim - CWMP (TR-069) CPE simulator
//!
//! Impersonates a managed network device that periodically contacts an
//! Auto-Configuration Server over SOAP/HTTP, accepts remote management
//! RPCs, performs file downloads on demand, and reports completion.

pub mod auth;
pub mod config;
pub mod core;
pub mod device;
pub mod download;
pub mod error;
pub mod listener;
pub mod protocols;
pub mod session;
pub mod transport;
pub mod utils;

pub use error::{Error, Result};

/// Simulator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
