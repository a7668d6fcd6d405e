//! `Simulator`: the process-wide aggregate a launcher owns. It holds the
//! parameter store, the session engine, and the connection-request
//! listener, and fans their events out through one channel.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::device::{DataModelSource, DefaultDataModel, DeviceIdentity, ParameterStore};
use crate::error::Result;
use crate::listener::ConnectionRequestServer;
use crate::session::{SessionEngine, SessionEvent};

/// Every externally-interesting thing the simulator does, fed from the
/// session engine into one channel for `main.rs` to consume.
#[derive(Debug, Clone)]
pub enum SimulatorEvent {
    SessionStarted { event: String },
    SessionEnded,
    DownloadRequested { command_key: String },
    RebootRequested,
    FactoryResetRequested,
    Fault { code: u32, message: String },
}

impl From<SessionEvent> for SimulatorEvent {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Started { event } => SimulatorEvent::SessionStarted { event },
            SessionEvent::Closed => SimulatorEvent::SessionEnded,
            SessionEvent::Fault { code, message } => SimulatorEvent::Fault { code, message },
            SessionEvent::DownloadStarted { command_key } => SimulatorEvent::DownloadRequested { command_key },
            SessionEvent::RebootScheduled => SimulatorEvent::RebootRequested,
            SessionEvent::FactoryResetScheduled => SimulatorEvent::FactoryResetRequested,
        }
    }
}

/// Owns the parameter store, the session engine, and the
/// connection-request listener, and wires them into one running process.
pub struct Simulator {
    config: SimConfig,
    store: Arc<ParameterStore>,
    engine: Arc<SessionEngine>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SimulatorEvent>>>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulator {
    pub async fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let identity = DeviceIdentity {
            serial_number: config.device.serial_number.clone(),
            mac_address: config.device.mac_address.clone(),
            username: config.device.username.clone(),
            password: config.device.password.clone(),
            ..DeviceIdentity::default()
        };

        let initial = DefaultDataModel.load(&identity, &config).await;
        let store = Arc::new(ParameterStore::new(initial));
        let engine = Arc::new(SessionEngine::new(&config, store.clone(), identity));

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            store,
            engine,
            event_rx: Mutex::new(Some(event_rx)),
            event_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn parameter_store(&self) -> Arc<ParameterStore> {
        self.store.clone()
    }

    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<SimulatorEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Binds the connection-request listener, advertises its URL into the
    /// data model, forwards session events onto `SimulatorEvent`, and
    /// spawns the session engine's main loop.
    pub async fn start(&self) -> Result<()> {
        match ConnectionRequestServer::bind(
            &self.config.acs.url,
            self.config.connection_request.bind_port_offset,
            self.config.connection_request.bind_address_override.as_deref(),
        )
        .await
        {
            Ok(server) => {
                let url = server.url();
                for root in ["Device.", "InternetGatewayDevice."] {
                    let name = format!("{root}ManagementServer.ConnectionRequestURL");
                    if let Some(mut param) = self.store.get(&name).await {
                        param.value = url.clone();
                        self.store.insert(name, param).await;
                    }
                }
                info!(url, "advertised ConnectionRequestURL");
                let handle = server.spawn(self.engine.clone());
                self.tasks.lock().await.push(handle);
            }
            Err(e) => {
                warn!(error = %e, "connection-request listener did not start; out-of-cycle sessions are unavailable");
            }
        }

        let mut session_events = self
            .engine
            .take_event_receiver()
            .await
            .expect("session event receiver already taken");
        let event_tx = self.event_tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = session_events.recv().await {
                if event_tx.send(event.into()).is_err() {
                    break;
                }
            }
        });
        self.tasks.lock().await.push(forward);

        self.tasks.lock().await.push(self.engine.clone().spawn());
        Ok(())
    }

    pub async fn stop(&self) {
        self.engine.stop().await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_builds_identity_from_config_device_section() {
        let mut config = SimConfig::default_config();
        config.device.serial_number = "UNITTEST1".to_string();
        let sim = Simulator::new(config).await.unwrap();
        let param = sim.parameter_store().get("Device.DeviceInfo.SerialNumber").await.unwrap();
        assert_eq!(param.value, "UNITTEST1");
    }
}
