//! Error types for the client transport
//!
//! [`DeploymentError`] covers everything that can go wrong between "connect
//! to this URI" and an established connection: socket failures, proxy
//! refusals, TLS failures and handshake rejections. Failures of individual
//! connection candidates are collected into
//! [`DeploymentError::CandidatesExhausted`] when nothing worked.

use thiserror::Error;

/// Error establishing a WebSocket connection
#[derive(Error, Debug)]
pub enum DeploymentError {
    /// A forward proxy refused the CONNECT request
    #[error("proxy refused tunnel: {status} {reason}")]
    Proxy {
        /// HTTP status of the proxy's response
        status: u16,
        /// Reason phrase of the proxy's response
        reason: String,
    },

    /// TLS handshake or record processing failed
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The server rejected the upgrade handshake
    #[error("server rejected the upgrade handshake")]
    HandshakeRejected,

    /// No handshake response arrived within the handshake timeout
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The TCP connection could not be established in time
    #[error("connect timed out")]
    ConnectTimeout,

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The target or proxy URI could not be interpreted
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// Every connection candidate failed.
    ///
    /// `failures` holds one entry per attempted candidate, in attempt order.
    #[error("connection failed after {attempts} attempt(s)")]
    CandidatesExhausted {
        /// Number of candidates tried
        attempts: usize,
        /// Failure of each candidate
        failures: Vec<DeploymentError>,
    },
}

impl DeploymentError {
    /// Whether this failure is specific to one candidate, leaving the next
    /// candidate worth trying
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            DeploymentError::HandshakeRejected | DeploymentError::CandidatesExhausted { .. }
        )
    }
}
