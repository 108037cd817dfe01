//! TLS filter
//!
//! TLS runs as a filter so it can sit *above* a proxy tunnel: for a `wss`
//! target behind a forward proxy, the handshake must not start until the
//! CONNECT exchange (which happens in plaintext) has succeeded. The filter
//! drives a [`rustls::ClientConnection`] directly against the chain's byte
//! buffers instead of wrapping the socket.

use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerName};
use tokio::sync::watch;

use crate::error::DeploymentError;
use crate::filter::{Filter, FilterOutput, Verdict};

/// Progress of the TLS handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    /// Handshake not yet complete
    Pending,
    /// Handshake complete; application data flows
    Established,
    /// Handshake failed
    Failed,
}

/// Build a client configuration trusting the bundled webpki roots
pub fn default_client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut root_store = RootCertStore::empty();
            root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));

            Arc::new(
                ClientConfig::builder()
                    .with_safe_defaults()
                    .with_root_certificates(root_store)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

/// Filter encrypting traffic above it and decrypting traffic below it.
///
/// Always certified against the *target* host, never the proxy: when the
/// connection runs through a CONNECT tunnel, the proxy only ever sees
/// ciphertext.
pub struct TlsFilter {
    session: ClientConnection,
    state_tx: watch::Sender<TlsState>,
}

impl std::fmt::Debug for TlsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsFilter")
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl TlsFilter {
    /// Create a filter for `server_name` (the target host).
    ///
    /// Returns the filter and a watch receiver reporting handshake progress.
    pub fn new(
        config: Arc<ClientConfig>,
        server_name: &str,
    ) -> Result<(Self, watch::Receiver<TlsState>), DeploymentError> {
        let name = ServerName::try_from(server_name)
            .map_err(|_| DeploymentError::InvalidUri(server_name.to_string()))?;
        let session = ClientConnection::new(config, name)?;
        let (state_tx, state_rx) = watch::channel(TlsState::Pending);
        Ok((Self { session, state_tx }, state_rx))
    }

    /// Drain pending TLS records into `out`
    fn flush_tls(&mut self, out: &mut Vec<u8>) -> Result<(), DeploymentError> {
        while self.session.wants_write() {
            self.session.write_tls(out)?;
        }
        Ok(())
    }

    fn update_state(&self) {
        if !self.session.is_handshaking() && *self.state_tx.borrow() == TlsState::Pending {
            let _ = self.state_tx.send(TlsState::Established);
        }
    }

    fn fail(&self, error: rustls::Error) -> DeploymentError {
        let _ = self.state_tx.send(TlsState::Failed);
        DeploymentError::Tls(error)
    }
}

impl Filter for TlsFilter {
    fn on_connect(&mut self, out: &mut FilterOutput) -> Result<(), DeploymentError> {
        // First flight: the ClientHello.
        let mut flight = Vec::new();
        self.flush_tls(&mut flight)?;
        if !flight.is_empty() {
            out.write(flight.into());
        }
        Ok(())
    }

    fn on_read(
        &mut self,
        data: &mut BytesMut,
        out: &mut FilterOutput,
    ) -> Result<Verdict, DeploymentError> {
        let mut cursor = std::io::Cursor::new(&data[..]);
        loop {
            match self.session.read_tls(&mut cursor) {
                Ok(0) => break,
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|e| self.fail(e))?;
                }
                Err(e) => return Err(DeploymentError::Io(e)),
            }
        }
        let consumed = cursor.position() as usize;
        let _ = data.split_to(consumed);

        // Handshake responses (and close_notify acks) generated while
        // processing go back to the wire.
        let mut flight = Vec::new();
        self.flush_tls(&mut flight)?;
        if !flight.is_empty() {
            out.write(flight.into());
        }
        self.update_state();

        // Surface any decrypted plaintext to the filter above.
        let mut plaintext = Vec::new();
        match self.session.reader().read_to_end(&mut plaintext) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(DeploymentError::Io(e)),
        }
        data.clear();
        data.extend_from_slice(&plaintext);

        Ok(Verdict::Continue)
    }

    fn on_write(&mut self, data: &mut BytesMut) -> Result<(), DeploymentError> {
        // Plaintext written mid-handshake is buffered by the session and
        // flushed in the Finished flight.
        self.session
            .writer()
            .write_all(data)
            .map_err(DeploymentError::Io)?;

        let mut ciphertext = Vec::new();
        self.flush_tls(&mut ciphertext)?;
        data.clear();
        data.extend_from_slice(&ciphertext);
        Ok(())
    }

    fn on_close(&mut self) {
        self.session.send_close_notify();
    }
}
