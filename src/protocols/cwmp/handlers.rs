//! Method handlers: build or answer one CWMP RPC element.
//!
//! Handlers are pure with respect to session/transport state — they read
//! and mutate only the parameter store, and return rendered XML fragments.
//! Orchestration that spans the download worker or session continuations
//! lives in `session::engine`.

use crate::device::data_model::INFORM_LEAVES;
use crate::device::identity::DeviceIdentity;
use crate::device::model::ParameterStore;
use crate::error::Result;
use crate::protocols::soap::{self, elements_with_tag, first_element, raw_elements_with_tag, xsi_type_attr};
use crate::utils::ids;

use super::fault::FaultCode;
use super::types::{EventStruct, TransferRecord};

/// WAN ExternalIPAddress leaves carried on both data-model roots; not part
/// of `INFORM_LEAVES` because they live under an instanced WAN path rather
/// than directly under `DeviceInfo.`/`ManagementServer.`.
const INFORM_WAN_SUFFIXES: &[&str] = &[
    "WANDevice.1.WANConnectionDevice.1.WANPPPConnection.1.ExternalIPAddress",
    "WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress",
];

const RECOGNIZED_FILE_TYPES: &[&str] = &[
    "1 Firmware Upgrade Image",
    "2 Web Content",
    "3 Vendor Configuration File",
    "4 Tone File",
    "5 Ringer File",
];

pub const FIRMWARE_FILE_TYPE: &str = "1 Firmware Upgrade Image";

/// Picks the data-model root to report Inform parameters from: prefers
/// `InternetGatewayDevice.` when present, else falls back to `Device.`.
async fn active_root(store: &ParameterStore) -> &'static str {
    if store.contains("InternetGatewayDevice.DeviceInfo.Manufacturer").await {
        "InternetGatewayDevice."
    } else {
        "Device."
    }
}

/// Builds the `cwmp:Inform` request body. If `transfer` is `Some`, a
/// `cwmp:TransferComplete` is nested inside it; the caller is responsible
/// for setting `transferCompleteSession` in that case.
pub async fn build_inform(
    store: &ParameterStore,
    identity: &DeviceIdentity,
    events: &[EventStruct],
    transfer: Option<&TransferRecord>,
) -> String {
    let root = active_root(store).await;

    let mut param_list = String::new();
    let mut param_count = 0usize;
    for leaf in INFORM_LEAVES.iter().chain(INFORM_WAN_SUFFIXES.iter()) {
        let name = format!("{root}{leaf}");
        if let Some(param) = store.get(&name).await {
            param_list.push_str(&format!(
                "<ParameterValueStruct><Name>{}</Name><Value xsi:type=\"{}\">{}</Value></ParameterValueStruct>",
                soap::encode_text(&name),
                param.xsd_type.as_wire_str(),
                soap::encode_text(&param.value),
            ));
            param_count += 1;
        }
    }

    let events_xml: String = events
        .iter()
        .map(|e| {
            format!(
                "<EventStruct><EventCode>{}</EventCode><CommandKey>{}</CommandKey></EventStruct>",
                soap::encode_text(&e.event_code),
                soap::encode_text(&e.command_key),
            )
        })
        .collect();

    let transfer_complete_xml = transfer.map(render_transfer_complete).unwrap_or_default();

    format!(
        "<cwmp:Inform>\
<DeviceId>\
<Manufacturer>{manufacturer}</Manufacturer>\
<OUI>{oui}</OUI>\
<ProductClass>{product_class}</ProductClass>\
<SerialNumber>{serial}</SerialNumber>\
</DeviceId>\
<Event soap-enc:arrayType=\"cwmp:EventStruct[{event_count}]\">{events_xml}</Event>\
<MaxEnvelopes>1</MaxEnvelopes>\
<CurrentTime>{current_time}</CurrentTime>\
<RetryCount>0</RetryCount>\
<ParameterList soap-enc:arrayType=\"cwmp:ParameterValueStruct[{param_count}]\">{param_list}</ParameterList>\
</cwmp:Inform>{transfer_complete_xml}",
        manufacturer = soap::encode_text(&identity.manufacturer),
        oui = soap::encode_text(&identity.oui),
        product_class = soap::encode_text(&identity.product_class),
        serial = soap::encode_text(&identity.serial_number),
        event_count = events.len(),
        current_time = ids::iso_now(),
        param_count = param_count,
    )
}

/// Renders a standalone `cwmp:TransferComplete` element.
pub fn render_transfer_complete(transfer: &TransferRecord) -> String {
    let fault_xml = if transfer.has_fault() {
        format!(
            "<FaultStruct><FaultCode>{}</FaultCode><FaultString>{}</FaultString></FaultStruct>",
            transfer.fault_code,
            soap::encode_text(&transfer.fault_string),
        )
    } else {
        String::new()
    };
    format!(
        "<cwmp:TransferComplete>\
<CommandKey>{command_key}</CommandKey>\
<StartTime>{start_time}</StartTime>\
<CompleteTime>{complete_time}</CompleteTime>\
{fault_xml}\
</cwmp:TransferComplete>",
        command_key = soap::encode_text(&transfer.command_key),
        start_time = transfer.start_time,
        complete_time = transfer.complete_time,
    )
}

/// Handles GetParameterNames.
pub async fn get_parameter_names(store: &ParameterStore, body_xml: &str) -> String {
    let path = first_element(body_xml, "ParameterPath").unwrap_or_default();
    let next_level = first_element(body_xml, "NextLevel")
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let entries = store.names(&path, next_level).await;
    let structs: String = entries
        .iter()
        .map(|(name, writable)| {
            format!(
                "<ParameterInfoStruct><Name>{}</Name><Writable>{}</Writable></ParameterInfoStruct>",
                soap::encode_text(name),
                if *writable { "1" } else { "0" },
            )
        })
        .collect();

    format!(
        "<cwmp:GetParameterNamesResponse><ParameterList soap-enc:arrayType=\"cwmp:ParameterInfoStruct[{}]\">{}</ParameterList></cwmp:GetParameterNamesResponse>",
        entries.len(),
        structs,
    )
}

/// Handles GetParameterValues.
pub async fn get_parameter_values(store: &ParameterStore, body_xml: &str) -> String {
    let names = elements_with_tag(body_xml, "string");
    let values = store.values(&names).await;
    let structs: String = values
        .iter()
        .map(|(name, value, xsd_type)| {
            format!(
                "<ParameterValueStruct><Name>{}</Name><Value xsi:type=\"{}\">{}</Value></ParameterValueStruct>",
                soap::encode_text(name),
                xsd_type.as_wire_str(),
                soap::encode_text(value),
            )
        })
        .collect();

    format!(
        "<cwmp:GetParameterValuesResponse><ParameterList soap-enc:arrayType=\"cwmp:ParameterValueStruct[{}]\">{}</ParameterList></cwmp:GetParameterValuesResponse>",
        values.len(),
        structs,
    )
}

/// Handles SetParameterValues.
pub async fn set_parameter_values(store: &ParameterStore, body_xml: &str) -> Result<String> {
    for raw in raw_elements_with_tag(body_xml, "ParameterValueStruct") {
        let name = first_element(&raw, "Name").unwrap_or_default();
        let value = first_element(&raw, "Value").unwrap_or_default();
        let xsd_type = xsi_type_attr(&raw, "Value");
        store.set_value(&name, &value, xsd_type.as_deref()).await?;
    }
    Ok("<cwmp:SetParameterValuesResponse><Status>0</Status></cwmp:SetParameterValuesResponse>".to_string())
}

/// Handles AddObject.
pub async fn add_object(store: &ParameterStore, body_xml: &str) -> Result<String> {
    let object_name = first_element(body_xml, "ObjectName").unwrap_or_default();
    let instance = store.add_object(&object_name).await?;
    Ok(format!(
        "<cwmp:AddObjectResponse><InstanceNumber>{instance}</InstanceNumber><Status>0</Status></cwmp:AddObjectResponse>"
    ))
}

/// Handles DeleteObject.
pub async fn delete_object(store: &ParameterStore, body_xml: &str) -> String {
    let object_name = first_element(body_xml, "ObjectName").unwrap_or_default();
    store.delete_object(&object_name).await;
    "<cwmp:DeleteObjectResponse><Status>0</Status></cwmp:DeleteObjectResponse>".to_string()
}

/// The parsed contents of a `cwmp:Download` RPC.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub command_key: String,
    pub url: String,
    pub file_type: String,
    pub username: String,
    pub password: String,
}

pub fn parse_download_request(body_xml: &str) -> DownloadRequest {
    DownloadRequest {
        command_key: first_element(body_xml, "CommandKey").unwrap_or_default(),
        url: first_element(body_xml, "URL").unwrap_or_default(),
        file_type: first_element(body_xml, "FileType").unwrap_or_default(),
        username: first_element(body_xml, "Username").unwrap_or_default(),
        password: first_element(body_xml, "Password").unwrap_or_default(),
    }
}

/// Outcome of the synchronous half of Download validation.
pub enum DownloadValidation {
    /// Reject immediately with a CWMP fault; no worker is started.
    Rejected(FaultCode, String),
    /// Accept: respond with the deferred-confirmation form. `bad_scheme`
    /// tells the caller to skip the HTTP GET and instead queue a transfer
    /// fault after 500 ms.
    Accepted { bad_scheme: bool },
}

/// Validates a Download request's synchronous rules: FileType must be
/// recognized, and firmware downloads may not overlap.
/// `firmware_download_in_progress` is the current value of the device's
/// single-firmware-download mutex.
pub fn validate_download(request: &DownloadRequest, firmware_download_in_progress: bool) -> DownloadValidation {
    if request.file_type.is_empty() {
        return DownloadValidation::Rejected(
            FaultCode::InvalidArguments,
            "Invalid arguments - FileType is required".to_string(),
        );
    }
    if !RECOGNIZED_FILE_TYPES.contains(&request.file_type.as_str()) {
        return DownloadValidation::Rejected(
            FaultCode::InvalidArguments,
            format!("Invalid arguments - unrecognized FileType {}", request.file_type),
        );
    }
    if request.file_type == FIRMWARE_FILE_TYPE && firmware_download_in_progress {
        return DownloadValidation::Rejected(
            FaultCode::TransferFailure,
            "File transfer already in progress".to_string(),
        );
    }

    let bad_scheme = !(request.url.starts_with("http://") || request.url.starts_with("https://"));
    DownloadValidation::Accepted { bad_scheme }
}

/// The fixed deferred-confirmation Download response.
pub fn download_response() -> String {
    format!(
        "<cwmp:DownloadResponse><Status>1</Status><StartTime>{t}</StartTime><CompleteTime>{t}</CompleteTime></cwmp:DownloadResponse>",
        t = ids::UNKNOWN_TIME,
    )
}

/// Reboot's immediate RPC response; cancellation of any in-flight download
/// and the reboot continuation are orchestrated by the session engine.
pub fn reboot_response() -> String {
    "<cwmp:RebootResponse></cwmp:RebootResponse>".to_string()
}

/// FactoryReset's immediate RPC response; process termination is scheduled
/// by the session engine.
pub fn factory_reset_response() -> String {
    "<cwmp:FactoryResetResponse></cwmp:FactoryResetResponse>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::data_model::{DataModelSource, DefaultDataModel};
    use crate::config::SimConfig;

    async fn store_fixture() -> ParameterStore {
        let identity = DeviceIdentity::default();
        let config = SimConfig::default_config();
        let map = DefaultDataModel.load(&identity, &config).await;
        ParameterStore::new(map)
    }

    #[tokio::test]
    async fn build_inform_carries_device_id_and_events() {
        let store = store_fixture().await;
        let identity = DeviceIdentity::default();
        let events = EventStruct::parse_event_list(Some("1 BOOT"));
        let body = build_inform(&store, &identity, &events, None).await;
        assert!(body.contains("<cwmp:Inform>"));
        assert!(body.contains(&identity.serial_number));
        assert!(body.contains("1 BOOT"));
    }

    #[tokio::test]
    async fn build_inform_array_type_count_matches_rendered_structs_when_a_leaf_is_missing() {
        let store = store_fixture().await;
        store
            .delete_object("InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANPPPConnection.1.")
            .await;
        let identity = DeviceIdentity::default();
        let events = EventStruct::parse_event_list(Some("1 BOOT"));
        let body = build_inform(&store, &identity, &events, None).await;
        let declared: usize = body
            .split("ParameterValueStruct[")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        let rendered = body.matches("<ParameterValueStruct>").count();
        assert_eq!(declared, rendered);
    }

    #[tokio::test]
    async fn build_inform_nests_transfer_complete_when_pending() {
        let store = store_fixture().await;
        let identity = DeviceIdentity::default();
        let events = EventStruct::parse_event_list(Some("7 TRANSFER COMPLETE"));
        let transfer = TransferRecord::success("key1", "t0", "t1");
        let body = build_inform(&store, &identity, &events, Some(&transfer)).await;
        assert!(body.contains("<cwmp:TransferComplete>"));
        assert!(body.find("</cwmp:Inform>").unwrap() < body.find("<cwmp:TransferComplete>").unwrap());
    }

    #[tokio::test]
    async fn get_parameter_names_next_level_respects_prefix() {
        let store = store_fixture().await;
        let request = "<ParameterPath>Device.DeviceInfo.</ParameterPath><NextLevel>1</NextLevel>";
        let response = get_parameter_names(&store, request).await;
        assert!(response.contains("Device.DeviceInfo.Manufacturer"));
        assert!(!response.contains("InternetGatewayDevice."));
    }

    #[tokio::test]
    async fn set_parameter_values_rejects_unknown_name() {
        let store = store_fixture().await;
        let request = "<ParameterList><ParameterValueStruct><Name>Device.Nope</Name><Value>x</Value></ParameterValueStruct></ParameterList>";
        assert!(set_parameter_values(&store, request).await.is_err());
    }

    #[test]
    fn validate_download_requires_file_type() {
        let request = DownloadRequest {
            command_key: "k".into(),
            url: "http://acs/file".into(),
            file_type: "".into(),
            username: "".into(),
            password: "".into(),
        };
        match validate_download(&request, false) {
            DownloadValidation::Rejected(code, _) => assert_eq!(code.code(), 9003),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn validate_download_flags_bad_scheme_but_still_accepts() {
        let request = DownloadRequest {
            command_key: "k".into(),
            url: "ftp://x/y".into(),
            file_type: "2 Web Content".into(),
            username: "".into(),
            password: "".into(),
        };
        match validate_download(&request, false) {
            DownloadValidation::Accepted { bad_scheme } => assert!(bad_scheme),
            _ => panic!("expected acceptance"),
        }
    }

    #[test]
    fn validate_download_rejects_second_firmware_transfer() {
        let request = DownloadRequest {
            command_key: "k".into(),
            url: "http://acs/firmware.bin".into(),
            file_type: FIRMWARE_FILE_TYPE.into(),
            username: "".into(),
            password: "".into(),
        };
        match validate_download(&request, true) {
            DownloadValidation::Rejected(code, _) => assert_eq!(code.code(), 9010),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn xsi_type_roundtrip_helper_is_visible() {
        let raw = "<Value xsi:type=\"xsd:boolean\">true</Value>";
        assert_eq!(xsi_type_attr(raw, "Value").as_deref(), Some("xsd:boolean"));
    }
}
