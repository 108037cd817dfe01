//! # Wavelink Client
//!
//! Transport layer of the Wavelink WebSocket client engine. It turns a
//! [`ClientEngine`](wavelink_core::ClientEngine) plus a target URI into an
//! established connection, handling everything in between:
//!
//! - Connection candidates: configured proxies, environment proxies, direct
//! - HTTP CONNECT tunneling through forward proxies
//! - TLS for `wss` targets, deferred until after a tunnel is established
//! - The upgrade exchange itself, including engine-driven retries
//! - A shared, reference-counted transport with idle shutdown
//!
//! The entry point is [`ClientSocket`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wavelink-client/")]

pub mod client_filter;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod pool;
pub mod proxy;
pub mod socket;
pub mod tls;
pub mod wire;

pub use config::{ClientConfig, ProxyConfig, TransportMode};
pub use error::DeploymentError;
pub use pool::TransportPool;
pub use socket::ClientSocket;
