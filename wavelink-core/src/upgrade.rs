//! Upgrade message model
//!
//! Representations of the HTTP exchange that converts a plain connection into
//! a WebSocket connection: a logical upgrade request, the server's response,
//! and the multi-value header map both carry. These types are pure data; the
//! wire encoding lives with the transport-facing client crate.

use std::collections::HashMap;

use http::Uri;

/// Case-insensitive multi-value header map.
///
/// Keys are normalized to lowercase on insertion. Values keep the order in
/// which they were added, one entry per header occurrence.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    map: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Create an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `name` with a single value
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(name.to_lowercase(), vec![value.into()]);
    }

    /// Add a value to `name`, keeping existing values
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.map
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Get the first value of `name`, if any
    pub fn first(&self, name: &str) -> Option<&str> {
        self.map
            .get(&name.to_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Get all values of `name`
    pub fn all(&self, name: &str) -> &[String] {
        self.map
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_lowercase())
    }

    /// Iterate over `(name, values)` pairs in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Logical WebSocket upgrade request.
///
/// Built once per handshake attempt by the client engine; treated as
/// immutable after it has been handed to the protocol filter for sending.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    uri: Uri,
    headers: Headers,
    secure: bool,
}

impl UpgradeRequest {
    /// Create a request targeting `uri`.
    ///
    /// The secure flag is derived from the `wss` scheme.
    pub fn new(uri: Uri) -> Self {
        let secure = uri.scheme_str() == Some("wss");
        Self {
            uri,
            headers: Headers::new(),
            secure,
        }
    }

    /// Target URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable request headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Whether this request targets a `wss` endpoint
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Target host
    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    /// Target port, defaulting to 80/443 by scheme
    pub fn port(&self) -> u16 {
        self.uri
            .port_u16()
            .unwrap_or(if self.secure { 443 } else { 80 })
    }

    /// Request path including the query string, `/` when absent
    pub fn path_and_query(&self) -> String {
        match self.uri.path_and_query() {
            Some(pq) => {
                let s = pq.as_str();
                if s.is_empty() {
                    "/".to_string()
                } else {
                    s.to_string()
                }
            }
            None => "/".to_string(),
        }
    }
}

/// Parsed HTTP response to an upgrade (or CONNECT) request.
///
/// Created fresh for each response received on the wire; read-only to
/// consumers after construction.
#[derive(Debug, Clone)]
pub struct UpgradeResponse {
    status: u16,
    reason: String,
    headers: Headers,
}

impl UpgradeResponse {
    /// Create a response from its parsed parts
    pub fn new(status: u16, reason: impl Into<String>, headers: Headers) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// HTTP reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}
