//! CWMP RPC surface: method identification, faults, handlers and dispatch.

pub mod dispatch;
pub mod fault;
pub mod handlers;
pub mod method;
pub mod types;

pub use dispatch::{dispatch, DispatchOutcome};
pub use fault::FaultCode;
pub use method::CwmpMethod;
pub use types::{EventStruct, TransferRecord};
