//! # Wavelink
//!
//! Client-side WebSocket protocol engine: upgrade handshake, proxy
//! tunneling and serialized frame dispatch over a pluggable engine.
//!
//! Wavelink is not a full WebSocket stack. It establishes the connection —
//! candidate walking across proxies, CONNECT tunneling, TLS inside the
//! tunnel, the HTTP upgrade exchange — and hands the resulting byte stream
//! to a [`ClientEngine`](wavelink_core::ClientEngine) supplied by the
//! caller. Framing, extensions and the endpoint API live above this crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wavelink::prelude::*;
//! use wavelink::{ClientConfig, ClientSocket};
//!
//! # async fn run(engine: Arc<dyn ClientEngine>) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let socket = ClientSocket::new(
//!     "wss://example.com/chat".parse()?,
//!     engine,
//!     ClientConfig::default(),
//! )?;
//! let connection = socket.connect().await?;
//! connection.writer().write(Bytes::from_static(b"hello")).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wavelink/")]

// Re-export core components
pub use wavelink_core::*;

pub use wavelink_client as client;
pub use wavelink_client::{ClientConfig, ClientSocket, DeploymentError, ProxyConfig, TransportMode, TransportPool};

/// Prelude module with common imports
pub mod prelude {
    pub use wavelink_client::{ClientConfig, ClientSocket, DeploymentError, TransportPool};
    pub use wavelink_core::prelude::*;
}
