//! Parameter store: the device's data model, keyed by dotted path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// The fixed set of data-model roots `GetParameterNames` never returns.
const EXCLUDED_ROOTS: &[&str] = &[
    "DeviceID",
    "Downloads",
    "Tags",
    "Events",
    "Reboot",
    "FactoryReset",
    "VirtualParameters",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XsdType {
    #[serde(rename = "xsd:string")]
    String,
    #[serde(rename = "xsd:boolean")]
    Boolean,
    #[serde(rename = "xsd:int")]
    Int,
    #[serde(rename = "xsd:unsignedInt")]
    UnsignedInt,
    #[serde(rename = "xsd:dateTime")]
    DateTime,
}

impl XsdType {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            XsdType::String => "xsd:string",
            XsdType::Boolean => "xsd:boolean",
            XsdType::Int => "xsd:int",
            XsdType::UnsignedInt => "xsd:unsignedInt",
            XsdType::DateTime => "xsd:dateTime",
        }
    }

    /// Parses an `xsi:type` attribute value (e.g. `"xsd:boolean"`) back
    /// into its `XsdType`. Unrecognized or absent values leave the
    /// parameter's existing type untouched; see `ParameterStore::set_value`.
    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "xsd:string" => Some(XsdType::String),
            "xsd:boolean" => Some(XsdType::Boolean),
            "xsd:int" => Some(XsdType::Int),
            "xsd:unsignedInt" => Some(XsdType::UnsignedInt),
            "xsd:dateTime" => Some(XsdType::DateTime),
            _ => None,
        }
    }

    /// Default value for a freshly AddObject-ed leaf.
    pub fn default_value(&self) -> &'static str {
        match self {
            XsdType::Boolean => "false",
            XsdType::Int | XsdType::UnsignedInt => "0",
            XsdType::DateTime => crate::utils::ids::UNKNOWN_TIME,
            XsdType::String => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub writable: bool,
    pub value: String,
    pub xsd_type: XsdType,
}

impl Parameter {
    pub fn new(writable: bool, value: impl Into<String>, xsd_type: XsdType) -> Self {
        Self {
            writable,
            value: value.into(),
            xsd_type,
        }
    }

    /// An object node: `path` ends with `.`; carries only the writable flag.
    pub fn object(writable: bool) -> Self {
        Self {
            writable,
            value: String::new(),
            xsd_type: XsdType::String,
        }
    }
}

/// The device's parameter map, plus a sorted-path cache for `GetParameterNames`
/// invalidated on every Add/Delete.
pub struct ParameterStore {
    params: RwLock<HashMap<String, Parameter>>,
    sorted_cache: RwLock<Option<Vec<String>>>,
}

impl ParameterStore {
    pub fn new(initial: HashMap<String, Parameter>) -> Self {
        Self {
            params: RwLock::new(initial),
            sorted_cache: RwLock::new(None),
        }
    }

    pub async fn get(&self, name: &str) -> Option<Parameter> {
        self.params.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.params.read().await.contains_key(name)
    }

    /// Updates a parameter's `(value, xsdType)` in place. `xsd_type` is the
    /// wire-form `xsi:type` string (e.g. `"xsd:boolean"`); an unrecognized
    /// or absent value leaves the parameter's existing type untouched.
    pub async fn set_value(&self, name: &str, value: &str, xsd_type: Option<&str>) -> Result<()> {
        let mut params = self.params.write().await;
        let param = params
            .get_mut(name)
            .ok_or_else(|| crate::Error::fault(9005, format!("Invalid parameter name: {name}")))?;
        if !param.writable {
            return Err(crate::Error::fault(
                9008,
                format!("Attempt to set non-writable parameter: {name}"),
            ));
        }
        param.value = value.to_string();
        if let Some(ty) = xsd_type.and_then(XsdType::from_wire_str) {
            param.xsd_type = ty;
        }
        Ok(())
    }

    pub async fn insert(&self, name: impl Into<String>, param: Parameter) {
        self.params.write().await.insert(name.into(), param);
    }

    /// Paths visible to GetParameterNames/GetParameterValues: excludes the
    /// fixed root blocklist.
    async fn visible_sorted(&self) -> Vec<String> {
        if let Some(cached) = self.sorted_cache.read().await.as_ref() {
            return cached.clone();
        }
        let params = self.params.read().await;
        let mut names: Vec<String> = params
            .keys()
            .filter(|name| {
                !EXCLUDED_ROOTS
                    .iter()
                    .any(|root| name.starts_with(root))
            })
            .cloned()
            .collect();
        names.sort();
        *self.sorted_cache.write().await = Some(names.clone());
        names
    }

    fn invalidate_cache_sync(cache: &mut Option<Vec<String>>) {
        *cache = None;
    }

    pub async fn invalidate_cache(&self) {
        Self::invalidate_cache_sync(&mut *self.sorted_cache.write().await);
    }

    /// GetParameterNames, including the NextLevel (one-level-down) mode.
    pub async fn names(&self, path: &str, next_level: bool) -> Vec<(String, bool)> {
        let all = self.visible_sorted().await;
        let params = self.params.read().await;

        if !next_level {
            return all
                .into_iter()
                .filter(|name| name.starts_with(path))
                .map(|name| {
                    let writable = params.get(&name).map(|p| p.writable).unwrap_or(false);
                    (name, writable)
                })
                .collect();
        }

        let mut seen = std::collections::BTreeSet::new();
        for name in all.iter().filter(|name| name.starts_with(path)) {
            let remainder = &name[path.len()..];
            let child = match remainder.find('.') {
                Some(dot) => format!("{path}{}", &remainder[..=dot]),
                None if !remainder.is_empty() => name.clone(),
                None => continue,
            };
            seen.insert(child);
        }
        seen.into_iter()
            .map(|name| {
                let writable = params.get(&name).map(|p| p.writable).unwrap_or(false);
                (name, writable)
            })
            .collect()
    }

    pub async fn values(&self, names: &[String]) -> Vec<(String, String, XsdType)> {
        let params = self.params.read().await;
        names
            .iter()
            .filter_map(|name| {
                params
                    .get(name)
                    .map(|p| (name.clone(), p.value.clone(), p.xsd_type))
            })
            .collect()
    }

    /// AddObject: picks the smallest positive free instance number and
    /// stamps out one default-valued leaf per template entry under
    /// `object_name`. Returns the new instance number.
    pub async fn add_object(&self, object_name: &str) -> Result<u32> {
        if !object_name.ends_with('.') {
            return Err(crate::Error::fault(9003, "objectName must end with '.'"));
        }

        let mut params = self.params.write().await;

        let mut i: u32 = 1;
        loop {
            let candidate = format!("{object_name}{i}.");
            if !params.contains_key(&candidate) {
                break;
            }
            i += 1;
        }
        let instance_prefix = format!("{object_name}{i}.");

        let template_leaves: Vec<(String, Parameter)> = params
            .iter()
            .filter(|(name, _)| {
                name.starts_with(object_name)
                    && !name[object_name.len()..].is_empty()
                    && !name[object_name.len()..]
                        .chars()
                        .next()
                        .map(|c| c.is_ascii_digit())
                        .unwrap_or(false)
            })
            .map(|(name, param)| (name[object_name.len()..].to_string(), param.clone()))
            .collect();

        params.insert(instance_prefix.clone(), Parameter::object(true));
        for (leaf, template) in template_leaves {
            let new_name = format!("{instance_prefix}{leaf}");
            if leaf.ends_with('.') {
                params.insert(new_name, Parameter::object(template.writable));
            } else {
                params.insert(
                    new_name,
                    Parameter::new(template.writable, template.xsd_type.default_value(), template.xsd_type),
                );
            }
        }

        drop(params);
        self.invalidate_cache().await;
        debug!("AddObject created instance {} under {}", i, object_name);
        Ok(i)
    }

    /// DeleteObject: removes every key with the given prefix.
    pub async fn delete_object(&self, object_name: &str) {
        let mut params = self.params.write().await;
        params.retain(|name, _| !name.starts_with(object_name));
        drop(params);
        self.invalidate_cache().await;
        debug!("DeleteObject removed everything under {}", object_name);
    }

    pub async fn snapshot(&self) -> HashMap<String, Parameter> {
        self.params.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entries: &[(&str, bool, &str, XsdType)]) -> ParameterStore {
        let mut map = HashMap::new();
        for (name, writable, value, ty) in entries {
            map.insert(name.to_string(), Parameter::new(*writable, *value, *ty));
        }
        ParameterStore::new(map)
    }

    #[tokio::test]
    async fn get_parameter_names_next_level_stops_at_first_dot() {
        let store = store_with(&[
            ("Device.WiFi.SSID", true, "home", XsdType::String),
            ("Device.WiFi.Radio.1.Channel", true, "6", XsdType::Int),
            ("Device.LAN.IPAddress", false, "192.168.1.1", XsdType::String),
        ]);

        let names = store.names("Device.WiFi.", true).await;
        let names: Vec<_> = names.into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"Device.WiFi.SSID".to_string()));
        assert!(names.contains(&"Device.WiFi.Radio.".to_string()));
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn add_then_delete_object_restores_key_set() {
        let mut map = HashMap::new();
        map.insert(
            "Device.Services.VoiceService.".to_string(),
            Parameter::object(true),
        );
        map.insert(
            "Device.Services.VoiceService.Enable".to_string(),
            Parameter::new(true, "true", XsdType::Boolean),
        );
        let store = ParameterStore::new(map);
        let before = store.snapshot().await;

        let instance = store
            .add_object("Device.Services.VoiceService.")
            .await
            .unwrap();
        assert_eq!(instance, 1);
        assert!(
            store
                .contains("Device.Services.VoiceService.1.Enable")
                .await
        );

        store
            .delete_object("Device.Services.VoiceService.1.")
            .await;
        let after = store.snapshot().await;
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn set_parameter_values_rejects_non_writable() {
        let store = store_with(&[("Device.DeviceInfo.Manufacturer", false, "Acme", XsdType::String)]);
        let result = store
            .set_value("Device.DeviceInfo.Manufacturer", "Other", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_value_updates_xsd_type_when_given() {
        let store = store_with(&[("Device.WiFi.Radio.1.Channel", true, "6", XsdType::Int)]);
        store
            .set_value("Device.WiFi.Radio.1.Channel", "true", Some("xsd:boolean"))
            .await
            .unwrap();
        let param = store.get("Device.WiFi.Radio.1.Channel").await.unwrap();
        assert_eq!(param.value, "true");
        assert_eq!(param.xsd_type, XsdType::Boolean);
    }

    #[tokio::test]
    async fn set_value_keeps_existing_type_on_unrecognized_xsi_type() {
        let store = store_with(&[("Device.WiFi.SSID", true, "home", XsdType::String)]);
        store
            .set_value("Device.WiFi.SSID", "office", Some("not:a:type"))
            .await
            .unwrap();
        let param = store.get("Device.WiFi.SSID").await.unwrap();
        assert_eq!(param.xsd_type, XsdType::String);
    }

    #[tokio::test]
    async fn excluded_roots_never_appear_in_names() {
        let store = store_with(&[
            ("DeviceID.SerialNumber", false, "x", XsdType::String),
            ("Device.DeviceInfo.Manufacturer", false, "Acme", XsdType::String),
        ]);
        let names = store.names("", false).await;
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].0, "Device.DeviceInfo.Manufacturer");
    }
}
