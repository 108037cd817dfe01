//! # Wavelink Core
//!
//! SPI layer of the Wavelink WebSocket client engine. It contains the pieces
//! that the transport-facing client crate and higher-level endpoint layers
//! share:
//!
//! - Error types and close codes
//! - The upgrade message model (request/response + multi-value headers)
//! - RFC 6455 handshake key utilities
//! - The `ClientEngine` / `Connection` / `Writer` contracts
//! - The task processor that serializes per-connection event handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wavelink-core/")]

// Core modules
pub mod connection;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod task;
pub mod upgrade;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use connection::{CloseListener, CloseReason, Connection, ReadHandler, Writer};
pub use engine::{ClientEngine, TimeoutHandler, UpgradeOutcome};
pub use error::{CloseCode, Error, ProtocolError, Result};
pub use task::{Condition, Task, TaskProcessor};
pub use upgrade::{Headers, UpgradeRequest, UpgradeResponse};
