//! Random identifier helpers shared across the session engine and dispatch layer

use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 8-character base-36 request id, matching the CWMP `ID` header format.
pub fn request_id() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// ISO-8601 UTC timestamp with fractional seconds, as used in `CurrentTime`,
/// `StartTime` and `CompleteTime`.
pub fn iso_now() -> String {
    iso8601(Utc::now())
}

pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// The TR-069 epoch sentinel used for `Download`'s deferred-confirmation
/// `StartTime`/`CompleteTime` fields.
pub const UNKNOWN_TIME: &str = "0001-01-01T00:00:00Z";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_eight_base36_chars() {
        let id = request_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn iso_now_parses_back() {
        let s = iso_now();
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());
    }
}
