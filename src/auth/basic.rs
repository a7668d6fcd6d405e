//! RFC-7617 Basic authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn build_header(username: &str, password: &str) -> String {
    let token = STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_user_colon_pass() {
        let header = build_header("usertest", "passtest");
        assert_eq!(header, "Basic dXNlcnRlc3Q6cGFzc3Rlc3Q=");
    }
}
