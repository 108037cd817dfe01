//! Client engine contract
//!
//! The transport-facing client crate knows how to move bytes; the engine
//! knows what the upgrade exchange should contain and what to do with the
//! result. [`ClientEngine`] is the seam between the two: the transport asks
//! it for an upgrade request, feeds it the server's response and acts on the
//! returned [`UpgradeOutcome`].

use std::sync::Arc;

use crate::connection::{CloseListener, Connection, Writer};
use crate::error::Error;
use crate::upgrade::{UpgradeRequest, UpgradeResponse};

/// Callback invoked when a handshake attempt exceeds its deadline.
///
/// Handed to the engine when the upgrade request is created so the engine
/// can wire it into whatever is awaiting the handshake result.
pub trait TimeoutHandler: Send + Sync {
    /// Handle the timeout
    fn handle_timeout(&self);
}

/// Engine verdict on an upgrade response.
pub enum UpgradeOutcome {
    /// Handshake accepted; calling the closure finalizes the connection.
    ///
    /// The closure registers the endpoint's handlers and returns the
    /// resulting [`Connection`]. The transport must invoke it before
    /// dispatching any payload bytes that arrived with the response.
    Success(Box<dyn FnOnce() -> Connection + Send>),
    /// The exchange must be repeated on a fresh socket (for example after an
    /// authentication challenge). The transport discards the current socket
    /// and asks the engine for a new upgrade request.
    AnotherRequestRequired,
    /// Handshake rejected; the connection attempt fails
    Failed,
}

impl std::fmt::Debug for UpgradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeOutcome::Success(_) => f.write_str("Success"),
            UpgradeOutcome::AnotherRequestRequired => f.write_str("AnotherRequestRequired"),
            UpgradeOutcome::Failed => f.write_str("Failed"),
        }
    }
}

/// Handshake authority driven by the transport.
///
/// One engine instance serves one logical connection attempt, possibly over
/// several sockets when [`UpgradeOutcome::AnotherRequestRequired`] is
/// returned.
pub trait ClientEngine: Send + Sync {
    /// Produce the upgrade request for the next handshake attempt.
    ///
    /// Called once per socket. `timeout_handler` fires if the attempt's
    /// deadline elapses before a response is processed.
    fn create_upgrade_request(&self, timeout_handler: Box<dyn TimeoutHandler>) -> UpgradeRequest;

    /// Judge the server's response to the most recent upgrade request.
    ///
    /// On success the engine captures `writer` and `close_listener` into the
    /// returned connection-building closure.
    fn process_response(
        &self,
        response: &UpgradeResponse,
        writer: Arc<dyn Writer>,
        close_listener: Arc<dyn CloseListener>,
    ) -> UpgradeOutcome;

    /// Report a transport-level failure that prevented a response from ever
    /// reaching [`ClientEngine::process_response`]
    fn process_error(&self, error: Error);
}
