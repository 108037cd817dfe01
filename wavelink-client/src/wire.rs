//! HTTP wire encoding and response parsing
//!
//! The upgrade exchange and CONNECT tunneling speak plain HTTP/1.1 over the
//! filter chain. This module encodes outgoing requests and incrementally
//! parses incoming responses from the read buffer, leaving any trailing
//! bytes (early WebSocket frames) in place.

use bytes::{Bytes, BytesMut};
use wavelink_core::error::{Error, ProtocolError, Result};
use wavelink_core::protocol::{header, value};
use wavelink_core::upgrade::{Headers, UpgradeRequest, UpgradeResponse};

const MAX_RESPONSE_HEADERS: usize = 64;

/// Encode an upgrade request as an HTTP/1.1 GET.
///
/// Multi-value headers are emitted as a single line with comma-separated
/// values. A `Host` header is added when the request doesn't carry one.
pub fn encode_upgrade_request(request: &UpgradeRequest) -> Bytes {
    let mut out = String::with_capacity(256);
    out.push_str("GET ");
    out.push_str(&request.path_and_query());
    out.push_str(" HTTP/1.1\r\n");

    if !request.headers().contains(header::HOST) {
        out.push_str("Host: ");
        out.push_str(request.host());
        let default_port = if request.is_secure() { 443 } else { 80 };
        if request.port() != default_port {
            out.push_str(&format!(":{}", request.port()));
        }
        out.push_str("\r\n");
    }

    for (name, values) in request.headers().iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&values.join(", "));
        out.push_str("\r\n");
    }

    out.push_str("\r\n");
    Bytes::from(out)
}

/// Encode a CONNECT request for tunneling through a forward proxy
pub fn encode_connect_request(
    host: &str,
    port: u16,
    proxy_headers: &[(String, String)],
) -> Bytes {
    let mut out = String::with_capacity(128);
    out.push_str(&format!("CONNECT {host}:{port} HTTP/1.1\r\n"));
    out.push_str(&format!("Host: {host}:{port}\r\n"));
    out.push_str(&format!("{}: {}\r\n", header::PROXY_CONNECTION, value::KEEP_ALIVE));
    out.push_str(&format!("{}: {}\r\n", header::CONNECTION, value::KEEP_ALIVE));
    for (name, value) in proxy_headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    Bytes::from(out)
}

/// Outcome of feeding buffered bytes to the [`ResponseParser`]
#[derive(Debug)]
pub enum Parsed {
    /// A complete response head was consumed from the buffer
    Response(UpgradeResponse),
    /// The buffer does not hold the start of an HTTP response; the bytes
    /// belong to an already-upgraded protocol
    NotHttpResponse,
    /// More bytes are needed
    Incomplete,
}

/// Incremental HTTP response head parser.
///
/// One parser instance serves a whole connection attempt; it is reset
/// between the CONNECT response and the upgrade response.
#[derive(Debug, Default)]
pub struct ResponseParser {
    /// Set once a response has been consumed; subsequent bytes are not HTTP
    done: bool,
}

impl ResponseParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget parser state so the next bytes are treated as a new response
    pub fn reset(&mut self) {
        self.done = false;
    }

    /// Whether a response has been consumed since the last reset
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Try to parse a response head from the front of `data`.
    ///
    /// On success the head is drained from `data`; any remaining bytes are
    /// payload that arrived behind the response.
    pub fn parse(&mut self, data: &mut BytesMut) -> Result<Parsed> {
        if self.done {
            return Ok(Parsed::NotHttpResponse);
        }

        // Cheap sniff before running the parser: the response head must
        // start with "HTTP/".
        let prefix = b"HTTP/";
        let check_len = data.len().min(prefix.len());
        if data[..check_len] != prefix[..check_len] {
            self.done = true;
            return Ok(Parsed::NotHttpResponse);
        }
        if data.len() < prefix.len() {
            return Ok(Parsed::Incomplete);
        }

        let mut header_storage = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut response = httparse::Response::new(&mut header_storage);
        let status = response
            .parse(data)
            .map_err(|e| Error::Protocol(ProtocolError::InvalidFormat(e.to_string())))?;

        match status {
            httparse::Status::Partial => Ok(Parsed::Incomplete),
            httparse::Status::Complete(consumed) => {
                let code = response.code.ok_or_else(|| {
                    Error::Protocol(ProtocolError::InvalidFormat("missing status code".into()))
                })?;
                let reason = response.reason.unwrap_or_default().to_string();

                let mut headers = Headers::new();
                for h in response.headers.iter() {
                    let value = std::str::from_utf8(h.value).map_err(|_| {
                        Error::Protocol(ProtocolError::InvalidFormat(format!(
                            "non-UTF-8 value for header {}",
                            h.name
                        )))
                    })?;
                    headers.append(h.name, value);
                }

                let _ = data.split_to(consumed);
                self.done = true;
                Ok(Parsed::Response(UpgradeResponse::new(code, reason, headers)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Uri;

    #[test]
    fn test_encode_upgrade_request() {
        let uri: Uri = "ws://example.com:9000/chat?room=1".parse().unwrap();
        let mut request = UpgradeRequest::new(uri);
        request.headers_mut().insert("upgrade", "websocket");
        request
            .headers_mut()
            .append("sec-websocket-extensions", "permessage-deflate");
        request.headers_mut().append("sec-websocket-extensions", "x-custom");

        let encoded = encode_upgrade_request(&request);
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com:9000\r\n"));
        assert!(text.contains("sec-websocket-extensions: permessage-deflate, x-custom\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_connect_request() {
        let headers = vec![("Proxy-Authorization".to_string(), "Basic abc".to_string())];
        let encoded = encode_connect_request("target.example.com", 443, &headers);
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.starts_with("CONNECT target.example.com:443 HTTP/1.1\r\n"));
        assert!(text.contains("Host: target.example.com:443\r\n"));
        assert!(text.contains("proxy-connection: keep-alive\r\n"));
        assert!(text.contains("Proxy-Authorization: Basic abc\r\n"));
    }

    #[test]
    fn test_parse_incremental() {
        let mut parser = ResponseParser::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.1 101 Switch"[..]);
        assert!(matches!(parser.parse(&mut buffer).unwrap(), Parsed::Incomplete));

        buffer.extend_from_slice(
            b"ing Protocols\r\nupgrade: websocket\r\nconnection: Upgrade\r\n\r\n\x81\x05hello",
        );
        match parser.parse(&mut buffer).unwrap() {
            Parsed::Response(response) => {
                assert_eq!(response.status(), 101);
                assert_eq!(response.reason(), "Switching Protocols");
                assert_eq!(response.headers().first("upgrade"), Some("websocket"));
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
        // Early frame bytes stay in the buffer.
        assert_eq!(&buffer[..], b"\x81\x05hello");

        // After completion, further bytes are protocol payload.
        assert!(matches!(parser.parse(&mut buffer).unwrap(), Parsed::NotHttpResponse));
    }

    #[test]
    fn test_parse_after_reset() {
        let mut parser = ResponseParser::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 Connection Established\r\n\r\n"[..]);
        assert!(matches!(parser.parse(&mut buffer).unwrap(), Parsed::Response(_)));
        assert!(buffer.is_empty());

        parser.reset();
        let mut next = BytesMut::from(&b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n"[..]);
        match parser.parse(&mut next).unwrap() {
            Parsed::Response(response) => assert_eq!(response.status(), 407),
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_non_http_bytes() {
        let mut parser = ResponseParser::new();
        let mut buffer = BytesMut::from(&b"\x81\x05hello"[..]);
        assert!(matches!(parser.parse(&mut buffer).unwrap(), Parsed::NotHttpResponse));
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_multi_value_headers_kept_separate() {
        let mut parser = ResponseParser::new();
        let mut buffer = BytesMut::from(
            &b"HTTP/1.1 101 OK\r\nsec-websocket-extensions: a\r\nsec-websocket-extensions: b\r\n\r\n"[..],
        );
        match parser.parse(&mut buffer).unwrap() {
            Parsed::Response(response) => {
                assert_eq!(response.headers().all("sec-websocket-extensions").len(), 2);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }
}
