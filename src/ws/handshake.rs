use base64::Engine;
use sha1::{Digest, Sha1};

/// The GUID RFC 6455 §1.3 fixes for computing `Sec-WebSocket-Accept`.
const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`:
/// `base64(sha1(key + GUID))`.
pub(crate) fn accept_key(client_key: &str) -> String {
    let digest = Sha1::new()
        .chain_update(client_key.as_bytes())
        .chain_update(HANDSHAKE_GUID.as_bytes())
        .finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Validates the WebSocket upgrade handshake against the raw request
/// parts, independent of any particular HTTP library's request type so it
/// can be unit tested against plain header maps.
pub(crate) fn validate_upgrade_headers(
    method: &http::Method,
    headers: &http::HeaderMap,
) -> Result<String, &'static str> {
    if *method != http::Method::GET {
        return Err("method must be GET");
    }

    let upgrade = header_contains(headers, http::header::UPGRADE, "websocket");
    if !upgrade {
        return Err("Upgrade header must contain websocket");
    }

    let connection = header_contains(headers, http::header::CONNECTION, "upgrade");
    if !connection {
        return Err("Connection header must contain Upgrade");
    }

    let version_ok = headers
        .get("Sec-WebSocket-Version")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "13")
        .unwrap_or(false);
    if !version_ok {
        return Err("Sec-WebSocket-Version must be 13");
    }

    let key = headers
        .get("Sec-WebSocket-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or("Sec-WebSocket-Key is missing")?;

    Ok(key.to_owned())
}

fn header_contains(headers: &http::HeaderMap, name: impl http::header::AsHeaderName, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|part| part.trim().eq_ignore_ascii_case(needle)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // RFC 6455 §1.3's worked example.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn validate_upgrade_rejects_wrong_method() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::UPGRADE, "websocket".parse().unwrap());
        headers.insert(http::header::CONNECTION, "Upgrade".parse().unwrap());
        headers.insert("Sec-WebSocket-Version", "13".parse().unwrap());
        headers.insert("Sec-WebSocket-Key", "abc".parse().unwrap());
        assert!(validate_upgrade_headers(&http::Method::POST, &headers).is_err());
    }

    #[test]
    fn validate_upgrade_accepts_well_formed_request() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::UPGRADE, "websocket".parse().unwrap());
        headers.insert(http::header::CONNECTION, "keep-alive, Upgrade".parse().unwrap());
        headers.insert("Sec-WebSocket-Version", "13".parse().unwrap());
        headers.insert("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==".parse().unwrap());
        let key = validate_upgrade_headers(&http::Method::GET, &headers).unwrap();
        assert_eq!(key, "dGhlIHNhbXBsZSBub25jZQ==");
    }
}
