//! Small wire-adjacent structs shared between the handlers, the session
//! engine, and the download worker.

/// One entry of an Inform's `Event` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStruct {
    pub event_code: String,
    pub command_key: String,
}

impl EventStruct {
    pub fn new(event_code: impl Into<String>, command_key: impl Into<String>) -> Self {
        Self {
            event_code: event_code.into(),
            command_key: command_key.into(),
        }
    }

    /// Splits a caller-supplied event string on `,` into one `EventStruct`
    /// per code, with an empty command key, or `"2 PERIODIC"` if `None`.
    pub fn parse_event_list(events: Option<&str>) -> Vec<EventStruct> {
        match events {
            None => vec![EventStruct::new("2 PERIODIC", "")],
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|code| EventStruct::new(code, ""))
                .collect(),
        }
    }
}

/// A pending `TransferComplete` record, queued by the download worker and
/// drained one-per-session by the session engine.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub command_key: String,
    pub start_time: String,
    pub complete_time: String,
    /// Empty string means no fault was recorded.
    pub fault_code: String,
    pub fault_string: String,
}

impl TransferRecord {
    pub fn success(command_key: impl Into<String>, start_time: impl Into<String>, complete_time: impl Into<String>) -> Self {
        Self {
            command_key: command_key.into(),
            start_time: start_time.into(),
            complete_time: complete_time.into(),
            fault_code: String::new(),
            fault_string: String::new(),
        }
    }

    pub fn failure(
        command_key: impl Into<String>,
        start_time: impl Into<String>,
        complete_time: impl Into<String>,
        fault_code: u32,
        fault_string: impl Into<String>,
    ) -> Self {
        Self {
            command_key: command_key.into(),
            start_time: start_time.into(),
            complete_time: complete_time.into(),
            fault_code: fault_code.to_string(),
            fault_string: fault_string.into(),
        }
    }

    /// A `FaultStruct` is only appended when the fault code is non-empty
    /// and not `"0"`.
    pub fn has_fault(&self) -> bool {
        !self.fault_code.is_empty() && self.fault_code != "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_event_string_defaults_to_periodic() {
        let events = EventStruct::parse_event_list(None);
        assert_eq!(events, vec![EventStruct::new("2 PERIODIC", "")]);
    }

    #[test]
    fn comma_separated_events_split_into_structs() {
        let events = EventStruct::parse_event_list(Some("1 BOOT,M Download,4 VALUE CHANGE"));
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].event_code, "M Download");
    }

    #[test]
    fn transfer_record_fault_presence() {
        let ok = TransferRecord::success("key1", "t0", "t1");
        assert!(!ok.has_fault());
        let bad = TransferRecord::failure("key1", "t0", "t1", 9010, "Download failure");
        assert!(bad.has_fault());
    }
}
