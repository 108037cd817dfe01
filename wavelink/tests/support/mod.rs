//! Shared fixtures: a minimal WebSocket-upgrade echo server, a CONNECT
//! proxy, and a test engine driving the handshake.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use wavelink::connection::{CloseListener, Connection, ReadHandler, Writer};
use wavelink::engine::{ClientEngine, TimeoutHandler, UpgradeOutcome};
use wavelink::handshake::{compute_accept_key, generate_key, validate_upgrade_response};
use wavelink::protocol::{header, value, WEBSOCKET_VERSION};
use wavelink::upgrade::{UpgradeRequest, UpgradeResponse};
use wavelink::Error;

/// Pushes inbound payload into a channel the test can await
pub struct ChannelReader(mpsc::UnboundedSender<Bytes>);

impl ReadHandler for ChannelReader {
    fn handle(&self, data: Bytes) {
        let _ = self.0.send(data);
    }
}

/// Handshake engine for tests: standard key exchange, optional forced
/// retries, validation via the accept key.
pub struct TestEngine {
    uri: http::Uri,
    key: Mutex<Option<String>>,
    reads: mpsc::UnboundedSender<Bytes>,
    /// `create_upgrade_request` invocations, one per socket
    pub connects: AtomicUsize,
    retries_remaining: AtomicUsize,
    /// Last transport error reported through `process_error`
    pub errors: Mutex<Vec<String>>,
}

impl TestEngine {
    pub fn new(uri: http::Uri) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        Self::with_retries(uri, 0)
    }

    /// The first `retries` responses are answered with
    /// `AnotherRequestRequired`, forcing fresh sockets.
    pub fn with_retries(
        uri: http::Uri,
        retries: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                uri,
                key: Mutex::new(None),
                reads: tx,
                connects: AtomicUsize::new(0),
                retries_remaining: AtomicUsize::new(retries),
                errors: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }
}

impl ClientEngine for TestEngine {
    fn create_upgrade_request(&self, _timeout_handler: Box<dyn TimeoutHandler>) -> UpgradeRequest {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let key = generate_key();
        let mut request = UpgradeRequest::new(self.uri.clone());
        request.headers_mut().insert(header::UPGRADE, value::WEBSOCKET);
        request.headers_mut().insert(header::CONNECTION, value::UPGRADE);
        request.headers_mut().insert(header::SEC_WEBSOCKET_KEY, key.clone());
        request
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_VERSION, WEBSOCKET_VERSION);
        *self.key.lock() = Some(key);
        request
    }

    fn process_response(
        &self,
        response: &UpgradeResponse,
        writer: Arc<dyn Writer>,
        close_listener: Arc<dyn CloseListener>,
    ) -> UpgradeOutcome {
        if self
            .retries_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return UpgradeOutcome::AnotherRequestRequired;
        }

        let key = self.key.lock().clone().unwrap_or_default();
        match validate_upgrade_response(response, &key) {
            Ok(()) => {
                let reads = self.reads.clone();
                UpgradeOutcome::Success(Box::new(move || {
                    Connection::new(Arc::new(ChannelReader(reads)), writer, close_listener)
                }))
            }
            Err(_) => UpgradeOutcome::Failed,
        }
    }

    fn process_error(&self, error: Error) {
        self.errors.lock().push(error.to_string());
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn extract_header(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
    })
}

async fn read_head(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        if find(&buf, b"\r\n\r\n").is_some() {
            return Some(buf);
        }
        match stream.read(&mut tmp).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    }
}

/// Accepts upgrade requests and echoes every byte that follows
pub async fn spawn_echo_server() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Some(buf) = read_head(&mut stream).await else {
                    return;
                };
                let head_end = find(&buf, b"\r\n\r\n").unwrap() + 4;
                let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                let key = extract_header(&head, "sec-websocket-key").unwrap_or_default();
                let response = format!(
                    "HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: {}\r\n\r\n",
                    compute_accept_key(&key)
                );
                if stream.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                if buf.len() > head_end && stream.write_all(&buf[head_end..]).await.is_err() {
                    return;
                }
                let mut tmp = [0u8; 1024];
                loop {
                    match stream.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&tmp[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    Ok(addr)
}

/// Accepts the upgrade request but answers with a wrong accept key
pub async fn spawn_bad_upgrade_server() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                if read_head(&mut stream).await.is_none() {
                    return;
                }
                let response = "HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: bm90LXRoZS1yaWdodC1rZXk=\r\n\r\n";
                let _ = stream.write_all(response.as_bytes()).await;
                let mut tmp = [0u8; 1024];
                while matches!(stream.read(&mut tmp).await, Ok(n) if n > 0) {}
            });
        }
    });
    Ok(addr)
}

/// Greets every connection with a non-HTTP banner and then stays silent
pub async fn spawn_garbage_server() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = stream.write_all(b"SSH-2.0-NotAWebServer\r\n").await;
                let mut tmp = [0u8; 1024];
                while matches!(stream.read(&mut tmp).await, Ok(n) if n > 0) {}
            });
        }
    });
    Ok(addr)
}

/// Behavior of the mock forward proxy
#[derive(Debug, Clone, Copy)]
pub enum ProxyMode {
    /// Accept the CONNECT and splice bytes to the requested target
    Tunnel,
    /// Refuse the CONNECT with this status
    Reject(u16),
}

/// Accepts CONNECT requests; counts them in the returned counter
pub async fn spawn_proxy(mode: ProxyMode) -> std::io::Result<(SocketAddr, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connects);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let Some(buf) = read_head(&mut stream).await else {
                    return;
                };
                let head = String::from_utf8_lossy(&buf).to_string();
                if !head.starts_with("CONNECT ") {
                    return;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                match mode {
                    ProxyMode::Reject(status) => {
                        let response = format!("HTTP/1.1 {status} No Tunnel For You\r\n\r\n");
                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    ProxyMode::Tunnel => {
                        let target = head
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or_default()
                            .to_string();
                        let Ok(mut upstream) = TcpStream::connect(&target).await else {
                            let _ = stream
                                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                                .await;
                            return;
                        };
                        if stream
                            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                            .await
                            .is_err()
                        {
                            return;
                        }
                        let _ = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await;
                    }
                }
            });
        }
    });
    Ok((addr, connects))
}

/// An address nothing listens on; connecting gets refused immediately
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr")
}

/// Receive from `rx` until `expected` bytes have arrived, preserving order
pub async fn recv_bytes(rx: &mut mpsc::UnboundedReceiver<Bytes>, expected: usize) -> Vec<u8> {
    let mut collected = Vec::new();
    while collected.len() < expected {
        match rx.recv().await {
            Some(chunk) => collected.extend_from_slice(&chunk),
            None => break,
        }
    }
    collected
}
