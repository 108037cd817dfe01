//! Connection orchestration
//!
//! [`ClientSocket`] owns one logical connection attempt: it resolves the
//! candidate list, obtains a transport runtime (shared or dedicated), spins
//! up a socket driver per attempt and classifies each attempt's outcome.
//! Proxy refusals, socket failures and timeouts move on to the next
//! candidate; an engine-level handshake rejection fails the whole attempt
//! immediately.

use std::sync::Arc;

use http::Uri;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use wavelink_core::connection::{CloseListener, Connection, Writer};
use wavelink_core::engine::{ClientEngine, TimeoutHandler};
use wavelink_core::error::Error;

use crate::client_filter::{AttemptOutcome, ClientFilter, TunnelTarget, outcome_channel};
use crate::config::{ClientConfig, TransportMode};
use crate::driver::{drive, ChannelCloseListener, Command, SocketWriter};
use crate::error::DeploymentError;
use crate::filter::{Filter, FilterChain, GatedFilter, SharedTransportFilter};
use crate::proxy::{resolve_candidates, Candidate};
use crate::tls::{default_client_config, TlsFilter};

const COMMAND_QUEUE_DEPTH: usize = 32;

/// Fires the attempt's shutdown notifier when the engine reports a timeout
struct NotifyTimeout(Arc<Notify>);

impl TimeoutHandler for NotifyTimeout {
    fn handle_timeout(&self) {
        self.0.notify_one();
    }
}

/// A client WebSocket connection attempt
pub struct ClientSocket {
    uri: Uri,
    config: ClientConfig,
    engine: Arc<dyn ClientEngine>,
    /// Keeps a dedicated runtime alive for the lifetime of the socket.
    runtime: Mutex<Option<Runtime>>,
}

impl std::fmt::Debug for ClientSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSocket")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

impl ClientSocket {
    /// Create a socket for `uri`, driven by `engine`
    pub fn new(
        uri: Uri,
        engine: Arc<dyn ClientEngine>,
        config: ClientConfig,
    ) -> Result<Self, DeploymentError> {
        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            _ => return Err(DeploymentError::InvalidUri(uri.to_string())),
        }
        if uri.host().is_none() {
            return Err(DeploymentError::InvalidUri(uri.to_string()));
        }
        Ok(Self {
            uri,
            config,
            engine,
            runtime: Mutex::new(None),
        })
    }

    /// Establish the connection, walking candidates until one succeeds
    pub async fn connect(&self) -> Result<Connection, DeploymentError> {
        let secure = self.uri.scheme_str() == Some("wss");
        let candidates = resolve_candidates(&self.config, secure);
        tracing::debug!(uri = %self.uri, candidates = candidates.len(), "connecting");

        let mut failures = Vec::new();
        for candidate in candidates {
            match self.try_candidate(&candidate, secure).await {
                Ok(connection) => return Ok(connection),
                Err(error) => {
                    if !error.is_retriable() {
                        // The engine produced this verdict itself; there is
                        // no transport failure to report back to it.
                        return Err(error);
                    }
                    tracing::debug!(%candidate, error = %error, "candidate failed");
                    failures.push(error);
                }
            }
        }

        let error = DeploymentError::CandidatesExhausted {
            attempts: failures.len(),
            failures,
        };
        self.engine
            .process_error(Error::Connection(error.to_string()));
        Err(error)
    }

    /// Run attempts against one candidate until it succeeds, fails, or the
    /// engine stops asking for retries
    async fn try_candidate(
        &self,
        candidate: &Candidate,
        secure: bool,
    ) -> Result<Connection, DeploymentError> {
        enum Transport {
            Shared(Arc<crate::pool::SharedTransport>),
            Dedicated(Runtime),
        }

        let transport = match &self.config.transport {
            TransportMode::Shared(pool) => Transport::Shared(pool.get_or_create()?),
            TransportMode::Dedicated => Transport::Dedicated(
                Builder::new_multi_thread()
                    .worker_threads(self.config.worker_threads)
                    .thread_name("wavelink-io")
                    .enable_all()
                    .build()?,
            ),
        };
        let handle = match &transport {
            Transport::Shared(shared) => shared.handle().clone(),
            Transport::Dedicated(runtime) => runtime.handle().clone(),
        };

        let result = loop {
            let shutdown = Arc::new(Notify::new());
            let request = self
                .engine
                .create_upgrade_request(Box::new(NotifyTimeout(Arc::clone(&shutdown))));
            let host = request.host().to_string();
            let port = request.port();

            let (command_tx, command_rx) = mpsc::channel::<Command>(COMMAND_QUEUE_DEPTH);
            let (sink, outcome_rx) = outcome_channel();

            let mut filters: Vec<Box<dyn Filter>> = Vec::with_capacity(3);
            let mut tls_gate = None;
            let mut tls_state = None;
            if secure {
                let tls_config = self
                    .config
                    .tls
                    .clone()
                    .unwrap_or_else(default_client_config);
                let (tls, state) = match TlsFilter::new(tls_config, &host) {
                    Ok(parts) => parts,
                    Err(error) => break Err(error),
                };
                tls_state = Some(state);
                match candidate {
                    Candidate::Direct => {
                        filters.push(Box::new(GatedFilter::new_enabled(Box::new(tls))));
                    }
                    Candidate::Proxy(_) => {
                        // Kept dormant until the CONNECT exchange succeeds.
                        let (gated, gate) = GatedFilter::new(Box::new(tls));
                        filters.push(Box::new(gated));
                        tls_gate = Some(gate);
                    }
                }
            }
            if let Transport::Shared(shared) = &transport {
                filters.push(Box::new(SharedTransportFilter::new(Arc::clone(shared))));
            }

            let (tunnel, addr) = match candidate {
                Candidate::Proxy(proxy) => (
                    Some(TunnelTarget {
                        host: host.clone(),
                        port,
                        headers: proxy.headers.clone(),
                    }),
                    format!("{}:{}", proxy.host, proxy.port),
                ),
                Candidate::Direct => (None, format!("{host}:{port}")),
            };

            let writer: Arc<dyn Writer> = Arc::new(SocketWriter::new(command_tx.clone()));
            let close_listener: Arc<dyn CloseListener> =
                Arc::new(ChannelCloseListener::new(command_tx));
            filters.push(Box::new(ClientFilter::new(
                Arc::clone(&self.engine),
                request,
                tunnel,
                tls_gate,
                writer,
                close_listener,
                Arc::clone(&sink),
            )));

            handle.spawn(drive(
                addr,
                self.config.connect_timeout,
                FilterChain::new(filters),
                command_rx,
                Arc::clone(&shutdown),
                sink,
            ));

            match timeout(self.config.handshake_timeout, outcome_rx).await {
                Ok(Ok(AttemptOutcome::Success(connection))) => {
                    // The upgrade response travelled through TLS, so by now
                    // the handshake must have completed.
                    if let Some(state) = &tls_state {
                        if *state.borrow() != crate::tls::TlsState::Established {
                            shutdown.notify_one();
                            break Err(DeploymentError::Tls(rustls::Error::General(
                                "handshake did not complete".to_string(),
                            )));
                        }
                    }
                    break Ok(connection);
                }
                Ok(Ok(AttemptOutcome::RetryRequired)) => {
                    // Fresh socket, same candidate.
                    shutdown.notify_one();
                    continue;
                }
                Ok(Ok(AttemptOutcome::ProxyError { status, reason })) => {
                    break Err(DeploymentError::Proxy { status, reason });
                }
                Ok(Ok(AttemptOutcome::HandshakeFailed)) => {
                    break Err(DeploymentError::HandshakeRejected);
                }
                Ok(Ok(AttemptOutcome::Failed(error))) => break Err(error),
                Ok(Err(_)) => {
                    // Driver died without reporting.
                    break Err(DeploymentError::Io(std::io::Error::from(
                        std::io::ErrorKind::ConnectionAborted,
                    )));
                }
                Err(_) => {
                    shutdown.notify_one();
                    break Err(DeploymentError::HandshakeTimeout);
                }
            }
        };

        if let Transport::Dedicated(runtime) = transport {
            match &result {
                Ok(_) => {
                    if let Some(previous) = self.runtime.lock().replace(runtime) {
                        previous.shutdown_background();
                    }
                }
                Err(_) => runtime.shutdown_background(),
            }
        }
        result
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}
