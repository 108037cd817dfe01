//! Protocol filter
//!
//! Topmost filter of a connection attempt. It owns the handshake state
//! machine: sending the CONNECT request when a proxy is in play, opening the
//! TLS gate once the tunnel is up, sending the upgrade request, delegating
//! the server's response to the [`ClientEngine`] and, once the connection is
//! established, dispatching inbound payload through the connection's task
//! processor.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use wavelink_core::connection::{CloseListener, CloseReason, Connection, Writer};
use wavelink_core::engine::{ClientEngine, UpgradeOutcome};
use wavelink_core::task::TaskProcessor;
use wavelink_core::upgrade::UpgradeRequest;

use crate::error::DeploymentError;
use crate::filter::{Filter, FilterOutput, GateHandle, Verdict};
use crate::wire::{encode_connect_request, encode_upgrade_request, Parsed, ResponseParser};

/// Result of one handshake attempt on one socket
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The upgrade completed and the connection is live
    Success(Connection),
    /// The engine wants the exchange repeated on a fresh socket
    RetryRequired,
    /// The proxy refused the CONNECT request
    ProxyError {
        /// HTTP status of the refusal
        status: u16,
        /// Reason phrase of the refusal
        reason: String,
    },
    /// The engine rejected the server's handshake response
    HandshakeFailed,
    /// The attempt failed below the protocol layer
    Failed(DeploymentError),
}

/// Send-once channel reporting the attempt outcome to the orchestrator
pub type OutcomeSink = Arc<Mutex<Option<oneshot::Sender<AttemptOutcome>>>>;

/// Create an outcome sink and its receiving half
pub fn outcome_channel() -> (OutcomeSink, oneshot::Receiver<AttemptOutcome>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

/// Report `outcome` unless one was already reported
pub fn send_outcome(sink: &OutcomeSink, outcome: AttemptOutcome) {
    if let Some(tx) = sink.lock().take() {
        let _ = tx.send(outcome);
    }
}

/// Forward-proxy tunnel parameters for one attempt
#[derive(Debug, Clone)]
pub struct TunnelTarget {
    /// Target host for the CONNECT request
    pub host: String,
    /// Target port for the CONNECT request
    pub port: u16,
    /// Extra headers for the CONNECT request
    pub headers: Vec<(String, String)>,
}

/// Everything attached to an established connection
struct ConnectionContext {
    connection: Connection,
    processor: Arc<TaskProcessor>,
}

/// Handshake phase of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the proxy's CONNECT response
    Tunneling,
    /// Waiting for the server's upgrade response
    Upgrading,
    /// The connection is established
    Established,
}

/// The protocol filter; see the module docs
pub struct ClientFilter {
    engine: Arc<dyn ClientEngine>,
    request: UpgradeRequest,
    tunnel: Option<TunnelTarget>,
    tls_gate: Option<GateHandle>,
    writer: Arc<dyn Writer>,
    close_listener: Arc<dyn CloseListener>,
    sink: OutcomeSink,

    phase: Phase,
    /// The upgrade response is processed at most once per socket, even if
    /// spurious bytes arrive behind it.
    response_processed: bool,
    parser: ResponseParser,
    buffer: BytesMut,
    context: Option<ConnectionContext>,
}

impl std::fmt::Debug for ClientFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFilter")
            .field("phase", &self.phase)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl ClientFilter {
    /// Create the filter for one attempt.
    ///
    /// `tls_gate`, when present, is opened after the proxy tunnel succeeds;
    /// for direct connections the gate is opened by the caller up front.
    pub fn new(
        engine: Arc<dyn ClientEngine>,
        request: UpgradeRequest,
        tunnel: Option<TunnelTarget>,
        tls_gate: Option<GateHandle>,
        writer: Arc<dyn Writer>,
        close_listener: Arc<dyn CloseListener>,
        sink: OutcomeSink,
    ) -> Self {
        let phase = if tunnel.is_some() {
            Phase::Tunneling
        } else {
            Phase::Upgrading
        };
        Self {
            engine,
            request,
            tunnel,
            tls_gate,
            writer,
            close_listener,
            sink,
            phase,
            response_processed: false,
            parser: ResponseParser::new(),
            buffer: BytesMut::new(),
            context: None,
        }
    }

    /// Hand every buffered byte to the read handler, serialized through the
    /// task processor
    fn dispatch_payload(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Some(context) = &self.context else {
            return;
        };
        let payload = self.buffer.split().freeze();
        let handler = Arc::clone(context.connection.read_handler());
        context
            .processor
            .process(Box::new(move || handler.handle(payload)));
    }

    fn handle_tunnel_response(
        &mut self,
        status: u16,
        reason: String,
        out: &mut FilterOutput,
    ) -> Result<(), DeploymentError> {
        if !(200..300).contains(&status) {
            tracing::debug!(status, %reason, "proxy refused CONNECT");
            send_outcome(
                &self.sink,
                AttemptOutcome::ProxyError {
                    status,
                    reason: reason.clone(),
                },
            );
            return Err(DeploymentError::Proxy { status, reason });
        }

        tracing::debug!("proxy tunnel established");
        self.phase = Phase::Upgrading;
        self.parser.reset();
        // TLS, if any, may now run inside the tunnel; its opening bytes go
        // out ahead of the upgrade request when the gate activates.
        if let Some(gate) = &self.tls_gate {
            gate.enable();
        }
        out.write(encode_upgrade_request(&self.request));
        Ok(())
    }

    fn handle_upgrade_response(
        &mut self,
        response: wavelink_core::upgrade::UpgradeResponse,
    ) -> Result<Verdict, DeploymentError> {
        if self.response_processed {
            return Ok(Verdict::Stop);
        }
        self.response_processed = true;

        let outcome = self.engine.process_response(
            &response,
            Arc::clone(&self.writer),
            Arc::clone(&self.close_listener),
        );
        match outcome {
            UpgradeOutcome::Success(build) => {
                let connection = build();
                tracing::debug!("upgrade complete, connection established");
                self.phase = Phase::Established;
                self.context = Some(ConnectionContext {
                    connection: connection.clone(),
                    processor: Arc::new(TaskProcessor::new()),
                });
                send_outcome(&self.sink, AttemptOutcome::Success(connection));
                // Payload that arrived in the same read as the response.
                self.dispatch_payload();
                Ok(Verdict::Stop)
            }
            UpgradeOutcome::AnotherRequestRequired => {
                tracing::debug!(
                    status = response.status(),
                    "engine requested a fresh upgrade exchange"
                );
                send_outcome(&self.sink, AttemptOutcome::RetryRequired);
                Ok(Verdict::Stop)
            }
            UpgradeOutcome::Failed => {
                tracing::debug!(status = response.status(), "engine rejected the handshake");
                send_outcome(&self.sink, AttemptOutcome::HandshakeFailed);
                Err(DeploymentError::HandshakeRejected)
            }
        }
    }
}

impl Filter for ClientFilter {
    fn on_connect(&mut self, out: &mut FilterOutput) -> Result<(), DeploymentError> {
        match &self.tunnel {
            Some(tunnel) => {
                tracing::debug!(host = %tunnel.host, port = tunnel.port, "sending CONNECT");
                out.write(encode_connect_request(
                    &tunnel.host,
                    tunnel.port,
                    &tunnel.headers,
                ));
            }
            None => {
                tracing::debug!(uri = %self.request.uri(), "sending upgrade request");
                out.write(encode_upgrade_request(&self.request));
            }
        }
        Ok(())
    }

    fn on_read(
        &mut self,
        data: &mut BytesMut,
        out: &mut FilterOutput,
    ) -> Result<Verdict, DeploymentError> {
        self.buffer.extend_from_slice(data);
        data.clear();

        loop {
            if self.phase == Phase::Established {
                self.dispatch_payload();
                return Ok(Verdict::Stop);
            }

            let parsed = match self.parser.parse(&mut self.buffer) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let error = DeploymentError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    ));
                    send_outcome(
                        &self.sink,
                        AttemptOutcome::Failed(DeploymentError::Io(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e.to_string(),
                        ))),
                    );
                    return Err(error);
                }
            };
            match parsed {
                Parsed::Incomplete => return Ok(Verdict::Stop),
                Parsed::NotHttpResponse => {
                    // Not ours; hand the bytes back untouched.
                    let leftover = self.buffer.split();
                    data.extend_from_slice(&leftover);
                    return Ok(Verdict::Continue);
                }
                Parsed::Response(response) => match self.phase {
                    Phase::Tunneling => {
                        self.handle_tunnel_response(
                            response.status(),
                            response.reason().to_string(),
                            out,
                        )?;
                        if self.buffer.is_empty() {
                            return Ok(Verdict::Stop);
                        }
                        // Bytes behind the CONNECT response loop back into
                        // the parser (or TLS, once established).
                    }
                    Phase::Upgrading => return self.handle_upgrade_response(response),
                    Phase::Established => unreachable!("parse only runs before establishment"),
                },
            }
        }
    }

    fn on_close(&mut self) {
        if let Some(context) = self.context.take() {
            tracing::debug!("transport closed, notifying connection");
            let connection = context.connection;
            context.processor.process(Box::new(move || {
                connection.close_listener().on_close(&CloseReason::abnormal());
            }));
        }
    }
}
