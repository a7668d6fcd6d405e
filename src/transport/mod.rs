//! HTTP transport: POSTs SOAP envelopes to the ACS, handling
//! the Digest/Basic challenge, cookie continuity, and keep-alive bounded
//! to one in-flight request per session.

pub mod acs_client;

pub use acs_client::{AcsClient, AcsResponse};
