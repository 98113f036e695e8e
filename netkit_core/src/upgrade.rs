//! WebSocket upgrade handshake and per-connection state machine.

use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::dispatch::AllowedUpgradePaths;
use crate::error::UpgradeError;
use crate::http::{HttpRequest, HttpResponse, StatusCode};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Per-connection upgrade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    HttpActive,
    Upgrading,
    WsConnected,
    Closing,
    Closed,
}

fn header_equals_ci(req: &HttpRequest, name: &str, expected: &str) -> bool {
    req.headers
        .get(name)
        .is_some_and(|v| v.eq_ignore_ascii_case(expected))
}

/// Computes `Sec-WebSocket-Accept` from a client's `Sec-WebSocket-Key`
/// per RFC 6455: SHA-1 of the key concatenated with the fixed GUID, base64-encoded.
pub fn accept_digest(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Generates a fresh client-side `Sec-WebSocket-Key`: base64 of 16
/// cryptographically-random bytes.
pub fn client_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Server-side: validates an upgrade request against `allowed` and builds
/// the `101 Switching Protocols` response, or returns the reason it was
/// rejected.
pub fn negotiate_server_upgrade(
    req: &HttpRequest,
    allowed: &AllowedUpgradePaths,
) -> Result<HttpResponse, UpgradeError> {
    if !allowed.contains(&req.url) {
        return Err(UpgradeError::PathNotAllowed);
    }
    if !header_equals_ci(req, "upgrade", "websocket") {
        return Err(UpgradeError::MissingUpgradeHeader);
    }
    if !header_equals_ci(req, "connection", "Upgrade") {
        return Err(UpgradeError::MissingConnectionHeader);
    }
    let Some(client_key) = req.headers.get("sec-websocket-key") else {
        return Err(UpgradeError::MissingKey);
    };

    let accept = accept_digest(&client_key);
    Ok(HttpResponse::new(StatusCode::SwitchingProtocols)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", &accept)
        .with_header("Sec-WebSocket-Version", "13"))
}

/// Builds the client-side upgrade request: a `GET` carrying a freshly
/// generated key and the upgrade headers.
pub fn build_client_upgrade_request(path: &str, host: &str) -> (HttpRequest, String) {
    let key = client_key();
    let req = HttpRequest::new(crate::http::Method::Get, path)
        .with_header("Host", host)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Key", &key)
        .with_header("Sec-WebSocket-Version", "13");
    (req, key)
}

/// Client-side: verifies the server's `Sec-WebSocket-Accept` matches what
/// the sent `client_key` should have produced.
pub fn verify_server_accept(client_key: &str, response: &HttpResponse) -> Result<(), UpgradeError> {
    let expected = accept_digest(client_key);
    match response.headers.get("sec-websocket-accept") {
        Some(actual) if actual == expected => Ok(()),
        _ => Err(UpgradeError::AcceptMismatch),
    }
}

/// Turns a rejected upgrade into the `400 Bad Request` response the
/// dispatch layer writes back.
pub fn rejection_response(_err: &UpgradeError) -> HttpResponse {
    HttpResponse::canned(400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_digest_matches_known_handshake_vector() {
        assert_eq!(
            accept_digest("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn successful_negotiation_builds_101_response() {
        let mut allowed = AllowedUpgradePaths::new();
        allowed.allow("/ws");
        let req = HttpRequest::new(crate::http::Method::Get, "/ws")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        let res = negotiate_server_upgrade(&req, &allowed).unwrap();
        assert_eq!(res.status, 101);
        assert_eq!(
            res.headers.get("sec-websocket-accept").as_deref(),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn disallowed_path_is_rejected() {
        let allowed = AllowedUpgradePaths::new();
        let req = HttpRequest::new(crate::http::Method::Get, "/ws");
        assert_eq!(
            negotiate_server_upgrade(&req, &allowed).unwrap_err(),
            UpgradeError::PathNotAllowed
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut allowed = AllowedUpgradePaths::new();
        allowed.allow("/ws");
        let req = HttpRequest::new(crate::http::Method::Get, "/ws")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade");
        assert_eq!(
            negotiate_server_upgrade(&req, &allowed).unwrap_err(),
            UpgradeError::MissingKey
        );
    }

    #[test]
    fn client_round_trip_verifies_accept() {
        let (req, key) = build_client_upgrade_request("/ws", "example.com");
        let mut allowed = AllowedUpgradePaths::new();
        allowed.allow("/ws");
        let response = negotiate_server_upgrade(&req, &allowed).unwrap();
        assert!(verify_server_accept(&key, &response).is_ok());
    }
}
