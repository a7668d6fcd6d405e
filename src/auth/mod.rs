//! Authentication engine: Basic and RFC-2617 Digest
//! `Authorization` header construction, and `WWW-Authenticate` challenge
//! parsing.

pub mod basic;
pub mod digest;

pub use digest::{DigestChallenge, DigestCredentials};

/// Builds the `Authorization` header value for one outbound request: no
/// header if there is no username, a digest header if a challenge is
/// cached, else Basic.
pub fn authorization_header(
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
    challenge: Option<&mut DigestChallenge>,
) -> Option<String> {
    if username.is_empty() {
        return None;
    }
    match challenge {
        Some(challenge) => Some(digest::build_header(challenge, username, password, method, uri)),
        None => Some(basic::build_header(username, password)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_username_means_no_header() {
        assert!(authorization_header("", "pass", "GET", "/x", None).is_none());
    }

    #[test]
    fn falls_back_to_basic_without_a_cached_challenge() {
        let header = authorization_header("usertest", "passtest", "GET", "/x", None).unwrap();
        assert!(header.starts_with("Basic "));
    }
}
