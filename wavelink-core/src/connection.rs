//! Established-connection contracts
//!
//! Once the upgrade completes, the transport exposes a [`Connection`]: a
//! bundle of the handlers the endpoint layer registered plus a [`Writer`]
//! the endpoint uses to send data. The transport calls into the handlers;
//! the endpoint calls into the writer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{CloseCode, Result};

/// Reason a connection was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code
    pub code: CloseCode,
    /// Human-readable reason phrase, possibly empty
    pub reason: String,
}

impl CloseReason {
    /// Create a close reason
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure (1000)
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal, "")
    }

    /// Abnormal closure (1006), used when the transport drops without a
    /// close handshake
    pub fn abnormal() -> Self {
        Self::new(CloseCode::Abnormal, "")
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.reason)
        }
    }
}

/// Receives inbound payload bytes from the transport.
///
/// Invoked from the connection's task processor, so calls never overlap and
/// arrive in wire order.
pub trait ReadHandler: Send + Sync {
    /// Handle a chunk of inbound data
    fn handle(&self, data: Bytes);
}

/// Notified when the connection closes, whatever the cause
pub trait CloseListener: Send + Sync {
    /// Handle connection closure
    fn on_close(&self, reason: &CloseReason);
}

/// Outbound half of an established connection
#[async_trait]
pub trait Writer: Send + Sync {
    /// Write `data` to the peer, resolving once the transport accepted it
    async fn write(&self, data: Bytes) -> Result<()>;

    /// Initiate connection teardown
    fn close(&self);
}

/// An established WebSocket connection.
///
/// Cheap to clone; all parts are shared handles.
#[derive(Clone)]
pub struct Connection {
    read_handler: Arc<dyn ReadHandler>,
    writer: Arc<dyn Writer>,
    close_listener: Arc<dyn CloseListener>,
}

impl Connection {
    /// Assemble a connection from its parts
    pub fn new(
        read_handler: Arc<dyn ReadHandler>,
        writer: Arc<dyn Writer>,
        close_listener: Arc<dyn CloseListener>,
    ) -> Self {
        Self {
            read_handler,
            writer,
            close_listener,
        }
    }

    /// Handler for inbound data
    pub fn read_handler(&self) -> &Arc<dyn ReadHandler> {
        &self.read_handler
    }

    /// Outbound writer
    pub fn writer(&self) -> &Arc<dyn Writer> {
        &self.writer
    }

    /// Close listener
    pub fn close_listener(&self) -> &Arc<dyn CloseListener> {
        &self.close_listener
    }

    /// Notify the close listener and tear the transport down
    pub fn close(&self, reason: &CloseReason) {
        self.close_listener.on_close(reason);
        self.writer.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
