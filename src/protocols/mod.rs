//! Protocol implementations: the CWMP wire format and RPC surface.

pub mod cwmp;
pub mod soap;

pub use cwmp::{dispatch, CwmpMethod, DispatchOutcome, FaultCode};