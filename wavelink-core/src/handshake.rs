//! RFC 6455 handshake key utilities
//!
//! Key generation and accept-key validation shared by client engine
//! implementations. The upgrade exchange itself is driven by the client
//! crate; these helpers only cover the key arithmetic from RFC 6455 §4.

use base64::{engine::general_purpose, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{header, value, SWITCHING_PROTOCOLS, WEBSOCKET_GUID};
use crate::upgrade::UpgradeResponse;

/// Generate a random `Sec-WebSocket-Key` value
pub fn generate_key() -> String {
    use rand::RngCore;
    let mut key_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    general_purpose::STANDARD.encode(key_bytes)
}

/// Compute the `Sec-WebSocket-Accept` value for a client key
pub fn compute_accept_key(client_key: &str) -> String {
    let combined = format!("{}{}", client_key, WEBSOCKET_GUID);
    let hash = Sha1::digest(combined.as_bytes());
    general_purpose::STANDARD.encode(hash)
}

/// Validate a `Sec-WebSocket-Key` value
pub fn validate_key(key: &str) -> bool {
    key.len() == 24 && general_purpose::STANDARD.decode(key).is_ok()
}

/// Validate a server's upgrade response against the client key.
///
/// Checks the 101 status, the `Upgrade`/`Connection` headers and the accept
/// key derived from `client_key`.
pub fn validate_upgrade_response(response: &UpgradeResponse, client_key: &str) -> Result<()> {
    if response.status() != SWITCHING_PROTOCOLS {
        return Err(Error::Protocol(ProtocolError::UnexpectedStatus(
            response.status(),
        )));
    }

    let upgrade = response.headers().first(header::UPGRADE).ok_or_else(|| {
        Error::Protocol(ProtocolError::MissingHeader(header::UPGRADE.to_string()))
    })?;
    if !upgrade.eq_ignore_ascii_case(value::WEBSOCKET) {
        return Err(Error::Protocol(ProtocolError::InvalidHeaderValue {
            header: header::UPGRADE.to_string(),
            value: upgrade.to_string(),
        }));
    }

    let connection = response.headers().first(header::CONNECTION).ok_or_else(|| {
        Error::Protocol(ProtocolError::MissingHeader(header::CONNECTION.to_string()))
    })?;
    if !connection.to_lowercase().contains("upgrade") {
        return Err(Error::Protocol(ProtocolError::InvalidHeaderValue {
            header: header::CONNECTION.to_string(),
            value: connection.to_string(),
        }));
    }

    let accept = response
        .headers()
        .first(header::SEC_WEBSOCKET_ACCEPT)
        .ok_or_else(|| {
            Error::Protocol(ProtocolError::MissingHeader(
                header::SEC_WEBSOCKET_ACCEPT.to_string(),
            ))
        })?;
    let expected = compute_accept_key(client_key);
    if accept != expected {
        return Err(Error::Protocol(ProtocolError::InvalidAcceptKey {
            expected,
            received: accept.to_string(),
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::Headers;

    #[test]
    fn test_key_generation() {
        let key = generate_key();
        assert_eq!(key.len(), 24);
        assert!(validate_key(&key));
    }

    #[test]
    fn test_accept_key_calculation() {
        let key = "dGhlIHNhbXBsZSBub25jZQ=="; // "the sample nonce"
        let expected = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";
        assert_eq!(compute_accept_key(key), expected);
    }

    #[test]
    fn test_response_validation() {
        let key = generate_key();

        let mut headers = Headers::new();
        headers.insert("upgrade", "websocket");
        headers.insert("connection", "Upgrade");
        headers.insert("sec-websocket-accept", compute_accept_key(&key));
        let response = UpgradeResponse::new(101, "Switching Protocols", headers);
        assert!(validate_upgrade_response(&response, &key).is_ok());

        let rejected = UpgradeResponse::new(403, "Forbidden", Headers::new());
        assert!(matches!(
            validate_upgrade_response(&rejected, &key),
            Err(Error::Protocol(ProtocolError::UnexpectedStatus(403)))
        ));
    }

    #[test]
    fn test_bad_accept_key() {
        let key = generate_key();
        let mut headers = Headers::new();
        headers.insert("upgrade", "websocket");
        headers.insert("connection", "Upgrade");
        headers.insert("sec-websocket-accept", "bm90IHRoZSByaWdodCBrZXk=");
        let response = UpgradeResponse::new(101, "Switching Protocols", headers);
        assert!(matches!(
            validate_upgrade_response(&response, &key),
            Err(Error::Protocol(ProtocolError::InvalidAcceptKey { .. }))
        ));
    }
}
