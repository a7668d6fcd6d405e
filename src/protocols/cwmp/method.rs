//! The closed set of CWMP RPC methods this simulator handles, replacing the
//! dynamic handler map keyed by XML local name.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CwmpMethod {
    Inform,
    GetParameterNames,
    GetParameterValues,
    SetParameterValues,
    AddObject,
    DeleteObject,
    Download,
    Reboot,
    FactoryReset,
    TransferComplete,
    Unknown(String),
}

impl CwmpMethod {
    /// Maps the local name of the first `cwmp:`-prefixed child of `Body`
    /// (e.g. `SetParameterValues`) to its method kind.
    pub fn from_local_name(name: &str) -> Self {
        match name {
            "Inform" => Self::Inform,
            "GetParameterNames" => Self::GetParameterNames,
            "GetParameterValues" => Self::GetParameterValues,
            "SetParameterValues" => Self::SetParameterValues,
            "AddObject" => Self::AddObject,
            "DeleteObject" => Self::DeleteObject,
            "Download" => Self::Download,
            "Reboot" => Self::Reboot,
            "FactoryReset" => Self::FactoryReset,
            "TransferComplete" => Self::TransferComplete,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_names_map_to_variants() {
        assert_eq!(CwmpMethod::from_local_name("Reboot"), CwmpMethod::Reboot);
        assert_eq!(CwmpMethod::from_local_name("AddObject"), CwmpMethod::AddObject);
    }

    #[test]
    fn unrecognized_name_falls_through_to_unknown() {
        match CwmpMethod::from_local_name("Thing") {
            CwmpMethod::Unknown(name) => assert_eq!(name, "Thing"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
