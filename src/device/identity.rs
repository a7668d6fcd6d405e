//! Device identity fields carried in every Inform

use serde::{Deserialize, Serialize};

/// `DeviceId` fields from the Inform RPC, plus the ACS credential pair that
/// `ManagementServer.Username`/`Password` can override at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub oui: String,
    pub product_class: String,
    pub serial_number: String,
    pub mac_address: String,
    pub username: String,
    pub password: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            manufacturer: "Acme Broadband".to_string(),
            oui: "ABCDEF".to_string(),
            product_class: "CWMP Simulator".to_string(),
            serial_number: "SIM000001".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            username: "usertest".to_string(),
            password: "passtest".to_string(),
        }
    }
}
