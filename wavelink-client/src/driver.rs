//! Socket driver
//!
//! One driver task per socket: it owns the TCP stream and the filter chain,
//! pumps inbound bytes up the chain, and services write commands coming from
//! the connection's [`Writer`]. Everything above the chain communicates with
//! the driver through its command channel or the shutdown notifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;

use wavelink_core::connection::{CloseListener, CloseReason, Writer};
use wavelink_core::error::Error;

use crate::client_filter::{send_outcome, AttemptOutcome, OutcomeSink};
use crate::error::DeploymentError;
use crate::filter::FilterChain;

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// Command sent from the writer side to the driver task
pub enum Command {
    /// Send `data` down the filter chain and onto the wire
    Write {
        /// Application bytes to send
        data: Bytes,
        /// Resolved once the bytes reached the socket
        done: Option<oneshot::Sender<wavelink_core::Result<()>>>,
    },
    /// Tear the connection down
    Close,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Write { data, .. } => {
                f.debug_struct("Write").field("len", &data.len()).finish()
            }
            Command::Close => f.write_str("Close"),
        }
    }
}

/// [`Writer`] half handed to the engine; forwards to the driver task
#[derive(Debug, Clone)]
pub struct SocketWriter {
    tx: mpsc::Sender<Command>,
}

impl SocketWriter {
    /// Create a writer feeding `tx`
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Writer for SocketWriter {
    async fn write(&self, data: Bytes) -> wavelink_core::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Write {
                data,
                done: Some(done_tx),
            })
            .await
            .map_err(|_| Error::Connection("transport closed".to_string()))?;
        done_rx
            .await
            .map_err(|_| Error::Connection("transport closed".to_string()))?
    }

    fn close(&self) {
        // Best effort; a full channel means the driver is already busy
        // tearing down or will see the channel close.
        let _ = self.tx.try_send(Command::Close);
    }
}

/// [`CloseListener`] handed to the engine; closing the connection from the
/// API side funnels into the driver's command channel
#[derive(Debug, Clone)]
pub struct ChannelCloseListener {
    tx: mpsc::Sender<Command>,
}

impl ChannelCloseListener {
    /// Create a listener feeding `tx`
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }
}

impl CloseListener for ChannelCloseListener {
    fn on_close(&self, reason: &CloseReason) {
        tracing::debug!(%reason, "connection close requested");
        let _ = self.tx.try_send(Command::Close);
    }
}

/// Run one socket to completion.
///
/// Reports the attempt outcome through `sink` if the handshake layer has not
/// already done so by the time the socket dies.
pub async fn drive(
    addr: String,
    connect_timeout: Duration,
    mut chain: FilterChain,
    mut commands: mpsc::Receiver<Command>,
    shutdown: Arc<Notify>,
    sink: OutcomeSink,
) {
    let mut stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "connect failed");
            send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::Io(e)));
            return;
        }
        Err(_) => {
            tracing::debug!(%addr, "connect timed out");
            send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::ConnectTimeout));
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    tracing::debug!(%addr, "transport connected");

    match chain.connect() {
        Ok(wire) => {
            for buffer in wire {
                if let Err(e) = stream.write_all(&buffer).await {
                    send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::Io(e)));
                    return;
                }
            }
        }
        Err(e) => {
            chain.close();
            send_outcome(&sink, AttemptOutcome::Failed(e));
            return;
        }
    }

    let mut read_buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    loop {
        tokio::select! {
            read = stream.read_buf(&mut read_buffer) => {
                match read {
                    Ok(0) => {
                        tracing::debug!(%addr, "peer closed the connection");
                        chain.close();
                        send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::Io(
                            std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                        )));
                        break;
                    }
                    Ok(_) => {
                        match chain.read(&mut read_buffer) {
                            Ok(wire) => {
                                // Bytes mid-handshake are buffered inside the
                                // filters; anything handed back out of the top
                                // of the chain has no consumer up here.
                                if !read_buffer.is_empty() {
                                    tracing::warn!(
                                        %addr,
                                        len = read_buffer.len(),
                                        "dropping inbound bytes no filter consumed"
                                    );
                                    read_buffer.clear();
                                }
                                let mut failed = false;
                                for buffer in wire {
                                    if let Err(e) = stream.write_all(&buffer).await {
                                        send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::Io(e)));
                                        failed = true;
                                        break;
                                    }
                                }
                                if failed {
                                    chain.close();
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(%addr, error = %e, "filter chain error");
                                chain.close();
                                send_outcome(&sink, AttemptOutcome::Failed(e));
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(%addr, error = %e, "read error");
                        chain.close();
                        send_outcome(&sink, AttemptOutcome::Failed(DeploymentError::Io(e)));
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Write { data, done }) => {
                        let result = match chain.write(data) {
                            Ok(wire) => stream
                                .write_all(&wire)
                                .await
                                .map_err(|e| Error::Connection(e.to_string())),
                            Err(e) => Err(Error::Connection(e.to_string())),
                        };
                        let fatal = result.is_err();
                        if let Some(done) = done {
                            let _ = done.send(result);
                        }
                        if fatal {
                            chain.close();
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        tracing::debug!(%addr, "closing transport");
                        chain.close();
                        let _ = stream.shutdown().await;
                        break;
                    }
                }
            }
            _ = shutdown.notified() => {
                tracing::debug!(%addr, "attempt abandoned");
                chain.close();
                let _ = stream.shutdown().await;
                break;
            }
        }
    }
}
