//! Session engine: drives the CWMP request/response loop,
//! periodic Inform scheduling, and reboot/firmware-upgrade continuations.

pub mod engine;
pub mod state;

pub use engine::{SessionEngine, SessionEvent};
pub use state::{SessionState, TransferQueue};
