//! RFC-2617 Digest authentication (MD5 only).

use md5::{Digest as _, Md5};
use rand::RngCore;

/// A cached digest challenge for the current credential scope. `nonce_count`
/// increases monotonically across requests within its lifetime; it is
/// reset to 0 whenever a fresh `401` challenge arrives.
#[derive(Debug, Clone, Default)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
    pub nonce_count: u32,
}

/// Placeholder for a resolved credential pair, kept distinct from the
/// device identity so auth stays agnostic of where credentials come from.
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
}

/// Parses a `WWW-Authenticate: Digest ...` header value into a challenge.
/// Returns `None` if the scheme isn't `Digest`.
pub fn parse_challenge(header: &str) -> Option<DigestChallenge> {
    let rest = header.trim().strip_prefix("Digest")?.trim_start();

    let mut challenge = DigestChallenge {
        nonce_count: 0,
        ..Default::default()
    };

    for field in split_fields(rest) {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        match key {
            "realm" => challenge.realm = value.to_string(),
            "nonce" => challenge.nonce = value.to_string(),
            "qop" => challenge.qop = Some(value.to_string()),
            "algorithm" => challenge.algorithm = Some(value.to_string()),
            "opaque" => challenge.opaque = Some(value.to_string()),
            _ => {}
        }
    }

    if challenge.nonce.is_empty() {
        None
    } else {
        Some(challenge)
    }
}

/// Splits on commas that are not inside a quoted value.
fn split_fields(s: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        fields.push(tail);
    }
    fields
}

fn md5_hex(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_cnonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Builds the `Authorization: Digest ...` header value, incrementing
/// `challenge.nonce_count` first.
pub fn build_header(challenge: &mut DigestChallenge, username: &str, password: &str, method: &str, uri: &str) -> String {
    challenge.nonce_count += 1;
    let nc = format!("{:08x}", challenge.nonce_count);
    let cnonce = random_cnonce();

    let is_sess = challenge
        .algorithm
        .as_deref()
        .map(|a| a.eq_ignore_ascii_case("MD5-sess"))
        .unwrap_or(false);

    let mut ha1 = md5_hex(&format!("{username}:{}:{password}", challenge.realm));
    if is_sess {
        ha1 = md5_hex(&format!("{ha1}:{}:{cnonce}", challenge.nonce));
    }
    let ha2 = md5_hex(&format!("{method}:{uri}"));

    let response = match &challenge.qop {
        Some(qop) => md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", challenge.nonce)),
        None => md5_hex(&format!("{ha1}:{}:{ha2}", challenge.nonce)),
    };

    let mut header = format!(
        "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\"",
        challenge.realm, challenge.nonce,
    );
    if let Some(algorithm) = &challenge.algorithm {
        header.push_str(&format!(", algorithm={algorithm}"));
    }
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{opaque}\""));
    }
    if let Some(qop) = &challenge.qop {
        header.push_str(&format!(", qop={qop}, nc={nc}, cnonce=\"{cnonce}\""));
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields_and_unquoted_algorithm() {
        let header = r#"Digest realm="r", nonce="n", qop="auth", algorithm=MD5"#;
        let challenge = parse_challenge(header).unwrap();
        assert_eq!(challenge.realm, "r");
        assert_eq!(challenge.nonce, "n");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
        assert_eq!(challenge.algorithm.as_deref(), Some("MD5"));
    }

    #[test]
    fn non_digest_scheme_returns_none() {
        assert!(parse_challenge("Basic realm=\"r\"").is_none());
    }

    #[test]
    fn nonce_count_increments_on_each_header_build() {
        let mut challenge = DigestChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            qop: Some("auth".into()),
            algorithm: Some("MD5".into()),
            opaque: None,
            nonce_count: 0,
        };
        build_header(&mut challenge, "usertest", "passtest", "POST", "/acs");
        assert_eq!(challenge.nonce_count, 1);
        build_header(&mut challenge, "usertest", "passtest", "POST", "/acs");
        assert_eq!(challenge.nonce_count, 2);
    }

    #[test]
    fn response_matches_known_vector_without_qop() {
        let mut challenge = DigestChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            qop: None,
            algorithm: None,
            opaque: None,
            nonce_count: 0,
        };
        let header = build_header(&mut challenge, "usertest", "r", "GET", "/acs");
        let ha1 = md5_hex("usertest:r:r");
        let ha2 = md5_hex("GET:/acs");
        let expected = md5_hex(&format!("{ha1}:n:{ha2}"));
        assert!(header.contains(&expected));
    }

    #[test]
    fn field_order_matches_wire_spec() {
        let mut challenge = DigestChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            qop: Some("auth".into()),
            algorithm: Some("MD5".into()),
            opaque: Some("op".into()),
            nonce_count: 0,
        };
        let header = build_header(&mut challenge, "usertest", "passtest", "POST", "/acs");
        let username_pos = header.find("username=").unwrap();
        let realm_pos = header.find("realm=").unwrap();
        let nonce_pos = header.find("nonce=").unwrap();
        let uri_pos = header.find("uri=").unwrap();
        let response_pos = header.find("response=").unwrap();
        let algorithm_pos = header.find("algorithm=").unwrap();
        let opaque_pos = header.find("opaque=").unwrap();
        let qop_pos = header.find("qop=").unwrap();
        let nc_pos = header.find("nc=").unwrap();
        let cnonce_pos = header.find("cnonce=").unwrap();
        assert!(username_pos < realm_pos);
        assert!(realm_pos < nonce_pos);
        assert!(nonce_pos < uri_pos);
        assert!(uri_pos < response_pos);
        assert!(response_pos < algorithm_pos);
        assert!(algorithm_pos < opaque_pos);
        assert!(opaque_pos < qop_pos);
        assert!(qop_pos < nc_pos);
        assert!(nc_pos < cnonce_pos);
    }
}
