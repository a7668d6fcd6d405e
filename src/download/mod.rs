//! Download worker: an async HTTP GET with its own auth
//! retry, cancellation, and deferred `TransferComplete` delivery.

pub mod worker;

pub use worker::{spawn_download, DownloadContext};
