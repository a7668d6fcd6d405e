//! The async download task itself, detached via `tokio::spawn` by the
//! session engine after a `cwmp:Download` RPC is accepted.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{self, DigestChallenge};
use crate::protocols::cwmp::handlers::{DownloadRequest, FIRMWARE_FILE_TYPE};
use crate::protocols::cwmp::TransferRecord;
use crate::session::state::{SessionState, TransferQueue};
use crate::utils::ids;

const TRANSFER_COMPLETE_EVENT: &str = "7 TRANSFER COMPLETE";
const TRANSFER_COMPLETE_DELAY: Duration = Duration::from_millis(500);

/// Everything one download task needs; bundled so `spawn_download`'s
/// signature stays readable.
pub struct DownloadContext {
    pub request: DownloadRequest,
    pub bad_scheme: bool,
    /// Fallback credentials when the RPC didn't carry its own.
    pub fallback_username: String,
    pub fallback_password: String,
    pub timeout_ms: u64,
    pub max_auth_retries: u32,
    pub cancel: CancellationToken,
    pub session_state: Arc<RwLock<SessionState>>,
    pub transfer_queue: Arc<TransferQueue>,
    /// Sends the event-code string for the session the engine should
    /// start next (e.g. `"7 TRANSFER COMPLETE"`).
    pub session_trigger: mpsc::UnboundedSender<String>,
}

/// Detaches the download task and returns its handle; the caller does not
/// need to await it — only `cancel` is ever used to interact with it again.
pub fn spawn_download(ctx: DownloadContext) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(ctx: DownloadContext) {
    let start_time = ids::iso_now();
    let is_firmware = ctx.request.file_type == FIRMWARE_FILE_TYPE;

    if ctx.bad_scheme {
        tokio::time::sleep(TRANSFER_COMPLETE_DELAY).await;
        let record = TransferRecord::failure(
            &ctx.request.command_key,
            &start_time,
            ids::iso_now(),
            9016,
            "Invalid URL scheme",
        );
        finish(&ctx, is_firmware, record, true).await;
        return;
    }

    let username = if ctx.request.username.is_empty() {
        ctx.fallback_username.clone()
    } else {
        ctx.request.username.clone()
    };
    let password = if ctx.request.password.is_empty() {
        ctx.fallback_password.clone()
    } else {
        ctx.request.password.clone()
    };

    let client = match Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            let record = TransferRecord::failure(&ctx.request.command_key, &start_time, ids::iso_now(), 9010, e.to_string());
            finish(&ctx, is_firmware, record, true).await;
            return;
        }
    };

    let path = request_path(&ctx.request.url);
    let mut digest: Option<DigestChallenge> = None;
    // The downloader *accumulates* Set-Cookie across retries, unlike the
    // ACS transport's wholesale replace; see DESIGN.md.
    let mut cookies: Vec<String> = Vec::new();
    let attempt_timeout = Duration::from_millis(ctx.timeout_ms);

    let mut auth_retries: u32 = 0;

    let outcome = 'retry_loop: loop {
        if ctx.cancel.is_cancelled() {
            break 'retry_loop Outcome::Cancelled;
        }

        let mut request = client.get(&ctx.request.url);
        if !cookies.is_empty() {
            request = request.header("Cookie", cookies.join("; "));
        }
        if let Some(header) = auth::authorization_header(&username, &password, "GET", &path, digest.as_mut()) {
            request = request.header("Authorization", header);
        }

        let send_result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break 'retry_loop Outcome::Cancelled,
            result = timeout(attempt_timeout, request.send()) => result,
        };

        let response = match send_result {
            Err(_) => break 'retry_loop Outcome::Fault("Download timeout".to_string()),
            Ok(Err(e)) => break 'retry_loop Outcome::Fault(e.to_string()),
            Ok(Ok(response)) => response,
        };

        if let Some(cookie) = response.headers().get("set-cookie").and_then(|v| v.to_str().ok()) {
            cookies.push(cookie.to_string());
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            if auth_retries >= ctx.max_auth_retries {
                break 'retry_loop Outcome::Fault("Too many attempts".to_string());
            }
            auth_retries += 1;
            let challenge_header = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match challenge_header.as_deref().and_then(auth::digest::parse_challenge) {
                Some(parsed) => {
                    digest = Some(parsed);
                    continue 'retry_loop;
                }
                None => break 'retry_loop Outcome::Fault("401 without a usable challenge".to_string()),
            }
        }

        if response.status() == StatusCode::OK {
            match response.bytes().await {
                Ok(bytes) => {
                    debug!(bytes = bytes.len(), "download body received and discarded");
                    break 'retry_loop Outcome::Success;
                }
                Err(e) => break 'retry_loop Outcome::Fault(e.to_string()),
            }
        }

        break 'retry_loop Outcome::Fault(format!("Server returned code {}", response.status().as_u16()));
    };

    match outcome {
        Outcome::Cancelled => {
            info!("download cancelled by reboot; queuing transfer fault without a new session");
            let record = TransferRecord::failure(&ctx.request.command_key, &start_time, ids::iso_now(), 9010, "Download failure");
            // Cancellation's continuation session is the Reboot flow's own
            // stop/restart window, not this worker's 500ms schedule.
            finish(&ctx, is_firmware, record, false).await;
        }
        Outcome::Success => {
            let record = TransferRecord::success(&ctx.request.command_key, &start_time, ids::iso_now());
            if is_firmware {
                let mut state = ctx.session_state.write().await;
                state.pending_reboot = true;
                state.firmware_upgrade = true;
            }
            finish(&ctx, is_firmware, record, true).await;
        }
        Outcome::Fault(message) => {
            warn!(error = %message, "download attempt failed");
            let record = TransferRecord::failure(&ctx.request.command_key, &start_time, ids::iso_now(), 9010, message);
            finish(&ctx, is_firmware, record, true).await;
        }
    }
}

enum Outcome {
    Success,
    Fault(String),
    Cancelled,
}

async fn finish(ctx: &DownloadContext, is_firmware: bool, record: TransferRecord, schedule_session: bool) {
    if is_firmware {
        ctx.session_state.write().await.download_in_progress = false;
    }
    ctx.transfer_queue.push(record).await;

    if schedule_session {
        tokio::time::sleep(TRANSFER_COMPLETE_DELAY).await;
        let _ = ctx.session_trigger.send(TRANSFER_COMPLETE_EVENT.to_string());
    }
}

fn request_path(url: &str) -> String {
    match url.find("://").and_then(|scheme_end| url[scheme_end + 3..].find('/')) {
        Some(offset) => url[url.find("://").unwrap() + 3 + offset..].to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_path_handles_query_strings() {
        assert_eq!(request_path("https://fs.example.com/firmware.bin?v=2"), "/firmware.bin?v=2");
    }
}
