//! Upgrade protocol constants
//!
//! Header names, header values and the handshake GUID from RFC 6455. Header
//! names are kept lowercase because [`Headers`](crate::upgrade::Headers)
//! normalizes keys on insertion.

/// The GUID appended to the client key when computing `Sec-WebSocket-Accept`
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The WebSocket protocol version this engine speaks
pub const WEBSOCKET_VERSION: &str = "13";

/// HTTP status code completing a successful upgrade
pub const SWITCHING_PROTOCOLS: u16 = 101;

/// Header names used during the upgrade exchange
pub mod header {
    /// `Upgrade`
    pub const UPGRADE: &str = "upgrade";
    /// `Connection`
    pub const CONNECTION: &str = "connection";
    /// `Host`
    pub const HOST: &str = "host";
    /// `Proxy-Connection`
    pub const PROXY_CONNECTION: &str = "proxy-connection";
    /// `Proxy-Authorization`
    pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";
    /// `Sec-WebSocket-Key`
    pub const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
    /// `Sec-WebSocket-Accept`
    pub const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";
    /// `Sec-WebSocket-Version`
    pub const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
    /// `Sec-WebSocket-Protocol`
    pub const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";
    /// `Sec-WebSocket-Extensions`
    pub const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";
}

/// Header values used during the upgrade exchange
pub mod value {
    /// `websocket`
    pub const WEBSOCKET: &str = "websocket";
    /// `Upgrade`
    pub const UPGRADE: &str = "Upgrade";
    /// `keep-alive`
    pub const KEEP_ALIVE: &str = "keep-alive";
}
