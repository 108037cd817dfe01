//! Client transport configuration
//!
//! This module provides configuration options for connection attempts:
//! timeouts, explicit forward proxies, the transport mode (shared pool or
//! dedicated runtime) and an optional TLS configuration override.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};

use crate::pool::TransportPool;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upgrade handshake timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of I/O worker threads for a dedicated transport
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// How a socket obtains its I/O runtime
#[derive(Debug, Clone, Default)]
pub enum TransportMode {
    /// Each socket runs its own runtime, shut down with the socket
    #[default]
    Dedicated,
    /// Sockets share a pooled runtime that is created on first use and shut
    /// down after its idle timeout once the last connection closes
    Shared(Arc<TransportPool>),
}

/// A forward proxy to attempt before falling back to a direct connection
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Extra headers for the CONNECT request, such as authentication
    pub headers: Vec<(String, String)>,
}

impl ProxyConfig {
    /// Create a proxy entry
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            headers: Vec::new(),
        }
    }

    /// Add a `Proxy-Authorization: Basic` header for `user`/`password`
    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        let credentials = general_purpose::STANDARD.encode(format!("{user}:{password}"));
        self.headers
            .push(("Proxy-Authorization".to_string(), format!("Basic {credentials}")));
        self
    }

    /// Add a custom header to the CONNECT request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Client transport configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// TCP connect timeout, per candidate
    pub connect_timeout: Duration,
    /// Upgrade handshake timeout, per attempt
    pub handshake_timeout: Duration,
    /// Transport mode
    pub transport: TransportMode,
    /// I/O worker threads for a dedicated transport
    pub worker_threads: usize,
    /// Explicit proxies, tried in order before the environment and a direct
    /// connection
    pub proxies: Vec<ProxyConfig>,
    /// TLS configuration for `wss` targets; system roots when `None`
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("transport", &self.transport)
            .field("worker_threads", &self.worker_threads)
            .field("proxies", &self.proxies)
            .field("custom_tls", &self.tls.is_some())
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            transport: TransportMode::default(),
            worker_threads: DEFAULT_WORKER_THREADS,
            proxies: Vec::new(),
            tls: None,
        }
    }
}

impl ClientConfig {
    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the upgrade handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Use a shared transport pool
    pub fn shared_transport(mut self, pool: Arc<TransportPool>) -> Self {
        self.transport = TransportMode::Shared(pool);
        self
    }

    /// Set the worker thread count for a dedicated transport
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Add an explicit proxy candidate
    pub fn add_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxies.push(proxy);
        self
    }

    /// Override the TLS configuration
    pub fn tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(matches!(config.transport, TransportMode::Dedicated));
        assert!(config.proxies.is_empty());
    }

    #[test]
    fn test_proxy_basic_auth() {
        let proxy = ProxyConfig::new("proxy.example.com", 3128).basic_auth("aladdin", "opensesame");
        let (name, value) = &proxy.headers[0];
        assert_eq!(name, "Proxy-Authorization");
        // RFC 7617 example credentials
        assert_eq!(value, "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
    }

    #[test]
    fn test_worker_threads_floor() {
        let config = ClientConfig::default().worker_threads(0);
        assert_eq!(config.worker_threads, 1);
    }
}
