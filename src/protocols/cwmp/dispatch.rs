//! RPC dispatch: identifies the method in an inbound
//! envelope, invokes its handler, and reports the outcome for the session
//! engine to wrap and send (or act on further — Download/Reboot/
//! FactoryReset all trigger side effects beyond "produce a response body").

use crate::device::model::ParameterStore;
use crate::error::Error;

use super::fault::FaultCode;
use super::handlers::{self, DownloadRequest, DownloadValidation};
use super::method::CwmpMethod;

/// What the session engine should do after a dispatch call.
pub enum DispatchOutcome {
    /// A plain success response body (unwrapped, no envelope).
    Response(String),
    /// A CWMP fault: the session continues, the response is a fault body.
    Fault(u32, String),
    /// Download was accepted; the engine must hand `request` to the
    /// download worker (skipping the HTTP GET and queueing a scheme fault
    /// if `bad_scheme`), then send `response`.
    DownloadAccepted {
        response: String,
        request: DownloadRequest,
        bad_scheme: bool,
    },
    /// Reboot was accepted; the engine must cancel any active download,
    /// close the session, and schedule the reboot continuation.
    RebootRequested { response: String },
    /// FactoryReset was accepted; the engine must schedule process exit.
    FactoryResetRequested { response: String },
}

/// Dispatches one ACS-originated RPC by method name: an unknown method name
/// produces CWMP fault 9000; a known one invokes its handler.
///
/// `firmware_download_in_progress` feeds Download's synchronous validation;
/// Inform is never dispatched here since it is a request the CPE itself
/// originates, not one the ACS sends to the CPE.
pub async fn dispatch(
    method_local_name: &str,
    body_inner_xml: &str,
    store: &ParameterStore,
    firmware_download_in_progress: bool,
) -> DispatchOutcome {
    match CwmpMethod::from_local_name(method_local_name) {
        CwmpMethod::GetParameterNames => {
            DispatchOutcome::Response(handlers::get_parameter_names(store, body_inner_xml).await)
        }
        CwmpMethod::GetParameterValues => {
            DispatchOutcome::Response(handlers::get_parameter_values(store, body_inner_xml).await)
        }
        CwmpMethod::SetParameterValues => {
            match handlers::set_parameter_values(store, body_inner_xml).await {
                Ok(body) => DispatchOutcome::Response(body),
                Err(Error::Fault { code, message }) => DispatchOutcome::Fault(code, message),
                Err(e) => DispatchOutcome::Fault(FaultCode::InvalidArguments.code(), e.to_string()),
            }
        }
        CwmpMethod::AddObject => match handlers::add_object(store, body_inner_xml).await {
            Ok(body) => DispatchOutcome::Response(body),
            Err(Error::Fault { code, message }) => DispatchOutcome::Fault(code, message),
            Err(e) => DispatchOutcome::Fault(FaultCode::InvalidArguments.code(), e.to_string()),
        },
        CwmpMethod::DeleteObject => {
            DispatchOutcome::Response(handlers::delete_object(store, body_inner_xml).await)
        }
        CwmpMethod::Download => {
            let request = handlers::parse_download_request(body_inner_xml);
            match handlers::validate_download(&request, firmware_download_in_progress) {
                DownloadValidation::Rejected(fault, message) => {
                    DispatchOutcome::Fault(fault.code(), message)
                }
                DownloadValidation::Accepted { bad_scheme } => DispatchOutcome::DownloadAccepted {
                    response: handlers::download_response(),
                    request,
                    bad_scheme,
                },
            }
        }
        CwmpMethod::Reboot => DispatchOutcome::RebootRequested {
            response: handlers::reboot_response(),
        },
        CwmpMethod::FactoryReset => DispatchOutcome::FactoryResetRequested {
            response: handlers::factory_reset_response(),
        },
        CwmpMethod::Inform | CwmpMethod::TransferComplete | CwmpMethod::Unknown(_) => {
            DispatchOutcome::Fault(
                FaultCode::MethodNotSupported.code(),
                FaultCode::MethodNotSupported.default_string().to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::data_model::{DataModelSource, DefaultDataModel};
    use crate::device::identity::DeviceIdentity;
    use crate::config::SimConfig;

    async fn store_fixture() -> ParameterStore {
        let identity = DeviceIdentity::default();
        let config = SimConfig::default_config();
        let map = DefaultDataModel.load(&identity, &config).await;
        ParameterStore::new(map)
    }

    #[tokio::test]
    async fn unknown_method_yields_fault_9000() {
        let store = store_fixture().await;
        let outcome = dispatch("Thing", "", &store, false).await;
        match outcome {
            DispatchOutcome::Fault(code, _) => assert_eq!(code, 9000),
            _ => panic!("expected fault"),
        }
    }

    #[tokio::test]
    async fn reboot_is_reported_as_reboot_requested() {
        let store = store_fixture().await;
        let outcome = dispatch("Reboot", "<CommandKey>abc</CommandKey>", &store, false).await;
        assert!(matches!(outcome, DispatchOutcome::RebootRequested { .. }));
    }

    #[tokio::test]
    async fn download_with_recognized_file_type_is_accepted() {
        let store = store_fixture().await;
        let body = "<FileType>2 Web Content</FileType><URL>http://acs/file</URL><CommandKey>k</CommandKey>";
        let outcome = dispatch("Download", body, &store, false).await;
        match outcome {
            DispatchOutcome::DownloadAccepted { bad_scheme, .. } => assert!(!bad_scheme),
            _ => panic!("expected acceptance"),
        }
    }

    #[tokio::test]
    async fn set_parameter_values_fault_surfaces_as_dispatch_fault() {
        let store = store_fixture().await;
        let body = "<ParameterList><ParameterValueStruct><Name>Device.Nope</Name><Value>x</Value></ParameterValueStruct></ParameterList>";
        let outcome = dispatch("SetParameterValues", body, &store, false).await;
        match outcome {
            DispatchOutcome::Fault(code, _) => assert_eq!(code, 9005),
            _ => panic!("expected fault"),
        }
    }
}
