//! Data-model bootstrap. `DefaultDataModel` is the only implementation
//! shipped; a real deployment would plug in a loader that reads the
//! manufacturer's actual TR-098/TR-181 dictionary.

use std::collections::HashMap;

use async_trait::async_trait;

use super::identity::DeviceIdentity;
use super::model::{Parameter, XsdType};
use crate::config::SimConfig;

/// The fixed set of Inform parameters present on both `Device.` and
/// `InternetGatewayDevice.` roots.
pub const INFORM_LEAVES: &[&str] = &[
    "DeviceInfo.SpecVersion",
    "DeviceInfo.HardwareVersion",
    "DeviceInfo.SoftwareVersion",
    "DeviceInfo.ProvisioningCode",
    "ManagementServer.ParameterKey",
    "ManagementServer.ConnectionRequestURL",
];

#[async_trait]
pub trait DataModelSource: Send + Sync {
    async fn load(&self, identity: &DeviceIdentity, config: &SimConfig) -> HashMap<String, Parameter>;
}

pub struct DefaultDataModel;

#[async_trait]
impl DataModelSource for DefaultDataModel {
    async fn load(&self, identity: &DeviceIdentity, config: &SimConfig) -> HashMap<String, Parameter> {
        let mut m = HashMap::new();

        for root in ["Device.", "InternetGatewayDevice."] {
            m.insert(
                format!("{root}DeviceInfo.Manufacturer"),
                Parameter::new(false, &identity.manufacturer, XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.ManufacturerOUI"),
                Parameter::new(false, &identity.oui, XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.ProductClass"),
                Parameter::new(false, &identity.product_class, XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.SerialNumber"),
                Parameter::new(false, &identity.serial_number, XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.SpecVersion"),
                Parameter::new(false, "1.0", XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.HardwareVersion"),
                Parameter::new(false, "1.0", XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.SoftwareVersion"),
                Parameter::new(false, "1.0.0", XsdType::String),
            );
            m.insert(
                format!("{root}DeviceInfo.ProvisioningCode"),
                Parameter::new(true, "", XsdType::String),
            );

            m.insert(
                format!("{root}ManagementServer.URL"),
                Parameter::new(true, &config.acs.url, XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.Username"),
                Parameter::new(true, &identity.username, XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.Password"),
                Parameter::new(true, &identity.password, XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.PeriodicInformEnable"),
                Parameter::new(true, "true", XsdType::Boolean),
            );
            m.insert(
                format!("{root}ManagementServer.PeriodicInformInterval"),
                Parameter::new(true, config.acs.periodic_inform_interval.to_string(), XsdType::UnsignedInt),
            );
            m.insert(
                format!("{root}ManagementServer.ParameterKey"),
                Parameter::new(false, "", XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.ConnectionRequestURL"),
                Parameter::new(false, "", XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.ConnectionRequestUsername"),
                Parameter::new(true, &identity.username, XsdType::String),
            );
            m.insert(
                format!("{root}ManagementServer.ConnectionRequestPassword"),
                Parameter::new(true, &identity.password, XsdType::String),
            );

            // WAN connections carrying the ExternalIPAddress inform parameter
            // (PPP and IP variants).
            m.insert(
                format!("{root}WANDevice.1.WANConnectionDevice.1.WANPPPConnection.1.ExternalIPAddress"),
                Parameter::new(false, "0.0.0.0", XsdType::String),
            );
            m.insert(
                format!("{root}WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress"),
                Parameter::new(false, "0.0.0.0", XsdType::String),
            );
        }

        // Empty namespaces GetParameterNames's exclusion list needs something
        // to exclude, and that AddObject/DeleteObject can target.
        m.insert("Downloads.".to_string(), Parameter::object(false));
        m.insert("Tags.".to_string(), Parameter::object(false));
        m.insert("VirtualParameters.".to_string(), Parameter::object(false));

        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[tokio::test]
    async fn default_model_carries_both_roots() {
        let identity = DeviceIdentity::default();
        let config = SimConfig::default_config();
        let model = DefaultDataModel.load(&identity, &config).await;

        assert!(model.contains_key("Device.DeviceInfo.Manufacturer"));
        assert!(model.contains_key("InternetGatewayDevice.DeviceInfo.Manufacturer"));
    }
}
