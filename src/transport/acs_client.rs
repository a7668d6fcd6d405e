//! The ACS-facing HTTP agent. One instance per session; the session
//! engine destroys and replaces it on every close.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::debug;

use crate::auth::{self, DigestChallenge};
use crate::error::{Error, Result};

/// The outcome of one logical POST, after any transparent 401 retry.
pub struct AcsResponse {
    /// `None` for an empty body — the session-close signal.
    pub body: Option<String>,
}

/// One keep-alive HTTP agent, limited to a single outstanding connection:
/// connection pooling is capped to one idle connection per host, and an
/// internal lock additionally guarantees at most one POST is ever in
/// flight through this client, regardless of how many callers hold a
/// reference to it.
pub struct AcsClient {
    client: Client,
    url: String,
    username: String,
    password: String,
    cookie: Mutex<Option<String>>,
    digest: Mutex<Option<DigestChallenge>>,
    in_flight: Mutex<()>,
}

impl AcsClient {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>, session_timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(1)
            .timeout(Duration::from_millis(session_timeout_ms) + Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            username: username.into(),
            password: password.into(),
            cookie: Mutex::new(None),
            digest: Mutex::new(None),
            in_flight: Mutex::new(()),
        })
    }

    /// POSTs `body_xml` to the ACS, transparently retrying once on a
    /// Digest `401` challenge. Any other non-2xx status is a fatal session
    /// error.
    pub async fn post(&self, body_xml: &str) -> Result<AcsResponse> {
        let _permit = self.in_flight.lock().await;

        let path = request_path(&self.url);
        let response = self.send_once(body_xml, &path).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge_header = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let parsed = challenge_header.as_deref().and_then(auth::digest::parse_challenge);
            let Some(parsed) = parsed else {
                return Err(Error::auth("401 response did not carry a Digest challenge"));
            };

            *self.digest.lock().await = Some(parsed);
            self.persist_cookie(&response).await;

            let retry = self.send_once(body_xml, &path).await?;
            if retry.status() == StatusCode::UNAUTHORIZED {
                return Err(Error::auth("ACS rejected digest-authenticated retry"));
            }
            return self.finish(retry).await;
        }

        self.finish(response).await
    }

    async fn send_once(&self, body_xml: &str, path: &str) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .body(body_xml.to_string());

        if let Some(cookie) = self.cookie.lock().await.clone() {
            request = request.header("Cookie", cookie);
        }

        let mut digest_guard = self.digest.lock().await;
        if let Some(header) = auth::authorization_header(&self.username, &self.password, "POST", path, digest_guard.as_mut()) {
            request = request.header("Authorization", header);
        }
        drop(digest_guard);

        debug!(url = %self.url, "posting SOAP envelope to ACS");
        Ok(request.send().await?)
    }

    async fn finish(&self, response: reqwest::Response) -> Result<AcsResponse> {
        if !response.status().is_success() {
            return Err(Error::session(format!(
                "ACS returned non-2xx status {}",
                response.status()
            )));
        }
        self.persist_cookie(&response).await;

        // `reqwest::HeaderMap` lookups are already case-insensitive, which
        // resolves the `Content-Length` capitalization question for free.
        let text = response.text().await?;
        let body = if text.trim().is_empty() { None } else { Some(text) };
        Ok(AcsResponse { body })
    }

    /// Wholesale-replaces the cached cookie with the latest `Set-Cookie`.
    /// See DESIGN.md for the documented asymmetry with the downloader,
    /// which accumulates instead.
    async fn persist_cookie(&self, response: &reqwest::Response) {
        if let Some(value) = response.headers().get("set-cookie").and_then(|v| v.to_str().ok()) {
            *self.cookie.lock().await = Some(value.to_string());
        }
    }
}

fn request_path(url: &str) -> &str {
    // `path + search` for digest `uri=`; fall back to "/" for a URL that
    // fails to parse as an authority-form HTTP URL.
    match url.find("://").and_then(|scheme_end| url[scheme_end + 3..].find('/')) {
        Some(offset) => &url[url.find("://").unwrap() + 3 + offset..],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_path_strips_scheme_and_authority() {
        assert_eq!(request_path("http://acs.example.com:7547/acs?x=1"), "/acs?x=1");
    }

    #[test]
    fn request_path_defaults_to_root() {
        assert_eq!(request_path("http://acs.example.com"), "/");
    }

    #[tokio::test]
    async fn client_builds_with_pooled_single_connection() {
        let client = AcsClient::new("http://127.0.0.1:1/acs", "usertest", "passtest", 30_000);
        assert!(client.is_ok());
    }
}
