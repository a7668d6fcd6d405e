//! The session state machine: `Idle → Informing → Serving → Closing →
//! Idle | RebootWindow`, implemented as a single task that issues and
//! awaits one ACS request at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DownloadConfig, SimConfig};
use crate::device::identity::DeviceIdentity;
use crate::device::model::ParameterStore;
use crate::download::{spawn_download, DownloadContext};
use crate::protocols::cwmp::handlers::FIRMWARE_FILE_TYPE;
use crate::protocols::cwmp::{self, handlers, DispatchOutcome, EventStruct};
use crate::protocols::soap;
use crate::transport::AcsClient;
use crate::utils::ids;

use super::state::{SessionState, TransferQueue};

/// The device's stop window while `acceptConnections` is false around a
/// reboot, before the continuation session starts.
const STOP_WINDOW: Duration = Duration::from_secs(2);
const REBOOT_EXTRA_DELAY: Duration = Duration::from_secs(10);
const FACTORY_RESET_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started { event: String },
    Closed,
    Fault { code: u32, message: String },
    DownloadStarted { command_key: String },
    RebootScheduled,
    FactoryResetScheduled,
}

pub struct SessionEngine {
    store: Arc<ParameterStore>,
    identity: DeviceIdentity,
    acs_url: String,
    session_timeout_ms: u64,
    periodic_inform_interval: Duration,
    download_config: DownloadConfig,
    state: Arc<RwLock<SessionState>>,
    transfer_queue: Arc<TransferQueue>,
    trigger_tx: mpsc::UnboundedSender<String>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    /// Worker-task handles (downloads, reboot-window timers); aborted on
    /// `stop`/`Drop`.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// The single pending scheduled-session wakeup (periodic inform, the
    /// 1s connection-request delay, ...), if any. Kept separate from
    /// `tasks` so the connection-request listener can cancel exactly the
    /// periodic timer without touching in-flight downloads.
    scheduled: Mutex<Option<JoinHandle<()>>>,
}

impl SessionEngine {
    pub fn new(config: &SimConfig, store: Arc<ParameterStore>, identity: DeviceIdentity) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            store,
            identity,
            acs_url: config.acs.url.clone(),
            session_timeout_ms: config.acs.session_timeout_ms,
            periodic_inform_interval: Duration::from_secs(config.acs.periodic_inform_interval),
            download_config: config.download.clone(),
            state: Arc::new(RwLock::new(SessionState::default())),
            transfer_queue: Arc::new(TransferQueue::new()),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            tasks: Mutex::new(Vec::new()),
            scheduled: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<RwLock<SessionState>> {
        self.state.clone()
    }

    /// Lets the connection-request listener (and anything else) ask for a
    /// session the moment it's safe to start one.
    pub fn trigger_sender(&self) -> mpsc::UnboundedSender<String> {
        self.trigger_tx.clone()
    }

    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Spawns the engine's main loop: a bootstrap session, then one
    /// session per trigger event forever.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.start_session("0 BOOTSTRAP,1 BOOT").await;
            let mut rx = self.trigger_rx.lock().await.take().expect("trigger receiver already taken");
            while let Some(event) = rx.recv().await {
                self.start_session(&event).await;
            }
        })
    }

    pub async fn stop(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.cancel_scheduled().await;
    }

    /// Starts one session for the given comma-separated event-code list.
    async fn start_session(&self, event: &str) {
        self.cancel_scheduled().await;
        self.state.write().await.enter_session();
        let _ = self.event_tx.send(SessionEvent::Started { event: event.to_string() });

        let request_id = ids::request_id();
        let transfer = self.transfer_queue.pop().await;
        if transfer.is_some() {
            self.state.write().await.transfer_complete_session = true;
        }
        let events = EventStruct::parse_event_list(Some(event));
        let body = handlers::build_inform(&self.store, &self.identity, &events, transfer.as_ref()).await;
        let envelope = soap::build_envelope(&request_id, &body);

        let (username, password) = self.resolve_credentials().await;
        let acs_client = match AcsClient::new(&self.acs_url, username, password, self.session_timeout_ms) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                self.fatal_close(&e.to_string()).await;
                return;
            }
        };

        match acs_client.post(&envelope).await {
            Ok(response) => self.drive(acs_client, response).await,
            Err(e) => self.fatal_close(&e.to_string()).await,
        }
    }

    /// The per-RPC loop: post the current body, dispatch the ACS's
    /// response, and repeat until the ACS sends an empty body.
    async fn drive(&self, acs_client: Arc<AcsClient>, mut response: crate::transport::AcsResponse) {
        loop {
            let Some(xml) = response.body else {
                self.handle_close().await;
                return;
            };

            let parsed = match soap::parse_envelope(&xml) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => {
                    self.handle_close().await;
                    return;
                }
                Err(e) => {
                    self.fatal_close(&format!("malformed ACS response: {e}")).await;
                    return;
                }
            };

            if !self.state.read().await.accept_connections {
                let fault_envelope = soap::build_fault_envelope(&parsed.request_id, 9002, "Device not ready to accept requests");
                let _ = acs_client.post(&fault_envelope).await;
                self.state.write().await.leave_session();
                let _ = self.event_tx.send(SessionEvent::Fault { code: 9002, message: "device not ready".into() });
                return;
            }

            let method_name = parsed.method_local_name.unwrap_or_default();
            let is_acknowledgement = method_name.is_empty() || method_name.ends_with("Response");

            let next_body = if is_acknowledgement {
                self.next_cpe_body().await
            } else {
                let firmware_in_progress = self.state.read().await.download_in_progress;
                let outcome = cwmp::dispatch(&method_name, &parsed.body_inner_xml, &self.store, firmware_in_progress).await;
                self.apply_side_effects(&outcome).await;
                self.envelope_for_outcome(&parsed.request_id, outcome)
            };

            response = match acs_client.post(&next_body).await {
                Ok(r) => r,
                Err(e) => {
                    self.fatal_close(&e.to_string()).await;
                    return;
                }
            };
        }
    }

    /// The idle turn: proactively report a pending transfer, else invite
    /// the ACS's next RPC with an empty POST.
    async fn next_cpe_body(&self) -> String {
        match self.transfer_queue.pop().await {
            Some(transfer) => {
                let request_id = ids::request_id();
                soap::build_envelope(&request_id, &handlers::render_transfer_complete(&transfer))
            }
            None => String::new(),
        }
    }

    async fn apply_side_effects(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::DownloadAccepted { request, bad_scheme, .. } => {
                let is_firmware = request.file_type == FIRMWARE_FILE_TYPE;
                let cancel = CancellationToken::new();
                {
                    let mut state = self.state.write().await;
                    if is_firmware {
                        state.download_in_progress = true;
                    }
                    state.active_download_cancel = Some(cancel.clone());
                }
                let (fallback_username, fallback_password) = self.resolve_credentials().await;
                let ctx = DownloadContext {
                    request: request.clone(),
                    bad_scheme: *bad_scheme,
                    fallback_username,
                    fallback_password,
                    timeout_ms: self.download_config.effective_timeout_ms(),
                    max_auth_retries: self.download_config.max_auth_retries,
                    cancel,
                    session_state: self.state.clone(),
                    transfer_queue: self.transfer_queue.clone(),
                    session_trigger: self.trigger_tx.clone(),
                };
                let _ = self.event_tx.send(SessionEvent::DownloadStarted { command_key: request.command_key.clone() });
                let handle = spawn_download(ctx);
                self.tasks.lock().await.push(handle);
            }
            DispatchOutcome::RebootRequested { .. } => {
                let cancel = {
                    let mut state = self.state.write().await;
                    state.pending_reboot = true;
                    state.active_download_cancel.take()
                };
                if let Some(cancel) = cancel {
                    cancel.cancel();
                }
                let _ = self.event_tx.send(SessionEvent::RebootScheduled);
            }
            DispatchOutcome::FactoryResetRequested { .. } => {
                let _ = self.event_tx.send(SessionEvent::FactoryResetScheduled);
                tokio::spawn(async move {
                    tokio::time::sleep(FACTORY_RESET_DELAY).await;
                    std::process::exit(0);
                });
            }
            DispatchOutcome::Response(_) | DispatchOutcome::Fault(_, _) => {}
        }
    }

    fn envelope_for_outcome(&self, request_id: &str, outcome: DispatchOutcome) -> String {
        match outcome {
            DispatchOutcome::Response(body) => soap::build_envelope(request_id, &body),
            DispatchOutcome::Fault(code, message) => soap::build_fault_envelope(request_id, code, &message),
            DispatchOutcome::DownloadAccepted { response, .. }
            | DispatchOutcome::RebootRequested { response }
            | DispatchOutcome::FactoryResetRequested { response } => soap::build_envelope(request_id, &response),
        }
    }

    /// Handles the ACS closing the session with an empty body.
    async fn handle_close(&self) {
        let (pending_reboot, firmware_upgrade, transfer_complete_session, pending_inform) = {
            let mut state = self.state.write().await;
            let snapshot = (
                state.pending_reboot,
                state.firmware_upgrade,
                state.transfer_complete_session,
                state.pending_inform,
            );
            state.leave_session();
            snapshot
        };
        let _ = self.event_tx.send(SessionEvent::Closed);

        if pending_reboot && firmware_upgrade && transfer_complete_session {
            {
                let mut state = self.state.write().await;
                state.pending_reboot = false;
                state.firmware_upgrade = false;
                state.transfer_complete_session = false;
            }
            self.stop_accepting().await;
            self.bump_software_version().await;
            self.schedule_session(STOP_WINDOW, "1 BOOT,M Download,4 VALUE CHANGE").await;
        } else if pending_reboot {
            self.state.write().await.pending_reboot = false;
            self.stop_accepting().await;
            self.schedule_session(STOP_WINDOW + REBOOT_EXTRA_DELAY, "1 BOOT,M Reboot,4 VALUE CHANGE").await;
        } else if pending_inform {
            self.schedule_session(Duration::from_secs(1), "6 CONNECTION REQUEST").await;
        } else {
            self.schedule_session(self.periodic_inform_interval, "2 PERIODIC").await;
        }
    }

    /// A transport-fatal error never retries the same session; the next
    /// periodic inform naturally re-attempts contact.
    async fn fatal_close(&self, message: &str) {
        error!(error = message, "session ended with a fatal transport error");
        self.state.write().await.leave_session();
        let _ = self.event_tx.send(SessionEvent::Fault { code: 0, message: message.to_string() });
        self.schedule_session(self.periodic_inform_interval, "2 PERIODIC").await;
    }

    async fn stop_accepting(&self) {
        self.state.write().await.accept_connections = false;
    }

    fn schedule_session<'a>(&'a self, delay: Duration, event: &'a str) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.clone();
            let trigger_tx = self.trigger_tx.clone();
            let event = event.to_string();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                state.write().await.accept_connections = true;
                let _ = trigger_tx.send(event);
            });
            if let Some(previous) = self.scheduled.lock().await.replace(handle) {
                previous.abort();
            }
        })
    }

    /// Cancels the pending scheduled wakeup (if any) without touching
    /// in-flight download workers. Used by the connection-request
    /// listener to collapse an armed periodic-inform timer into an
    /// immediate session.
    pub async fn cancel_scheduled(&self) {
        if let Some(handle) = self.scheduled.lock().await.take() {
            handle.abort();
        }
    }

    async fn resolve_credentials(&self) -> (String, String) {
        let username = self
            .store
            .get("InternetGatewayDevice.ManagementServer.Username")
            .await
            .or(self.store.get("Device.ManagementServer.Username").await)
            .map(|p| p.value)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.identity.username.clone());
        let password = self
            .store
            .get("InternetGatewayDevice.ManagementServer.Password")
            .await
            .or(self.store.get("Device.ManagementServer.Password").await)
            .map(|p| p.value)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.identity.password.clone());
        (username, password)
    }

    async fn bump_software_version(&self) {
        for root in ["Device.", "InternetGatewayDevice."] {
            let name = format!("{root}DeviceInfo.SoftwareVersion");
            if let Some(mut param) = self.store.get(&name).await {
                param.value = "2.0.0-upgraded".to_string();
                self.store.insert(name, param).await;
            }
        }
        info!("firmware upgrade applied; software version bumped");
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        } else {
            warn!("session engine dropped while tasks were locked; background tasks may outlive it");
        }
        if let Ok(mut scheduled) = self.scheduled.try_lock() {
            if let Some(handle) = scheduled.take() {
                handle.abort();
            }
        }
    }
}
