//! Byte-level filter chain
//!
//! A connection is a stack of filters between the socket and the protocol
//! logic. Index 0 sits closest to the wire; reads travel up the stack,
//! writes travel down. Filters transform the buffer in place (TLS) or
//! consume it (the protocol filter) and may emit writes of their own, which
//! are routed down through the filters below them before reaching the wire.

use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DeploymentError;
use crate::pool::SharedTransport;

/// Read-path result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Pass the (possibly transformed) buffer to the next filter up
    Continue,
    /// The buffer was consumed; stop propagating
    Stop,
}

/// Writes emitted by a filter while handling connect or read events
#[derive(Debug, Default)]
pub struct FilterOutput {
    /// Buffers to send, each routed down through the filters below the
    /// emitting filter
    pub writes: Vec<Bytes>,
}

impl FilterOutput {
    /// Queue a buffer for sending
    pub fn write(&mut self, data: Bytes) {
        self.writes.push(data);
    }
}

/// One layer of the connection stack
pub trait Filter: Send {
    /// The transport is connected; emit any opening bytes
    fn on_connect(&mut self, _out: &mut FilterOutput) -> Result<(), DeploymentError> {
        Ok(())
    }

    /// Bytes arrived from the filter below
    fn on_read(
        &mut self,
        data: &mut BytesMut,
        out: &mut FilterOutput,
    ) -> Result<Verdict, DeploymentError>;

    /// Bytes are on their way down from the filter above; transform in place
    fn on_write(&mut self, _data: &mut BytesMut) -> Result<(), DeploymentError> {
        Ok(())
    }

    /// The transport closed or is being torn down
    fn on_close(&mut self) {}
}

/// An ordered stack of filters, index 0 closest to the wire
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("depth", &self.filters.len())
            .finish()
    }
}

impl FilterChain {
    /// Build a chain from `filters`, bottom first
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Run connect handling bottom-up, returning the wire bytes to send
    pub fn connect(&mut self) -> Result<Vec<Bytes>, DeploymentError> {
        let mut wire = Vec::new();
        for i in 0..self.filters.len() {
            let (lower, rest) = self.filters.split_at_mut(i);
            let mut out = FilterOutput::default();
            rest[0].on_connect(&mut out)?;
            route_down(lower, out, &mut wire)?;
        }
        Ok(wire)
    }

    /// Feed wire bytes up the stack, returning wire bytes to send in
    /// response (TLS flights, handshake requests)
    pub fn read(&mut self, data: &mut BytesMut) -> Result<Vec<Bytes>, DeploymentError> {
        let mut wire = Vec::new();
        for i in 0..self.filters.len() {
            let (lower, rest) = self.filters.split_at_mut(i);
            let mut out = FilterOutput::default();
            let verdict = rest[0].on_read(data, &mut out)?;
            route_down(lower, out, &mut wire)?;
            if verdict == Verdict::Stop || data.is_empty() {
                break;
            }
        }
        Ok(wire)
    }

    /// Send application bytes down the whole stack, returning the wire bytes
    pub fn write(&mut self, data: Bytes) -> Result<Bytes, DeploymentError> {
        let mut buffer = BytesMut::from(&data[..]);
        for filter in self.filters.iter_mut().rev() {
            filter.on_write(&mut buffer)?;
        }
        Ok(buffer.freeze())
    }

    /// Propagate close handling top-down
    pub fn close(&mut self) {
        for filter in self.filters.iter_mut().rev() {
            filter.on_close();
        }
    }
}

fn route_down(
    lower: &mut [Box<dyn Filter>],
    out: FilterOutput,
    wire: &mut Vec<Bytes>,
) -> Result<(), DeploymentError> {
    for write in out.writes {
        let mut buffer = BytesMut::from(&write[..]);
        for filter in lower.iter_mut().rev() {
            filter.on_write(&mut buffer)?;
        }
        if !buffer.is_empty() {
            wire.push(buffer.freeze());
        }
    }
    Ok(())
}

/// Shared switch controlling a [`GatedFilter`]
#[derive(Debug, Clone, Default)]
pub struct GateHandle {
    enabled: Arc<AtomicBool>,
}

impl GateHandle {
    /// Create a handle in the disabled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate; the wrapped filter activates on the next traffic
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Whether the gate is open
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Wraps a filter that must stay dormant until some milestone is reached.
///
/// Used to hold TLS back while a proxy tunnel is still being negotiated: the
/// wrapped filter sees no traffic and emits nothing until the gate opens.
/// Once it opens, the wrapped filter's connect handling runs before the
/// first byte passes through it.
pub struct GatedFilter {
    inner: Box<dyn Filter>,
    gate: GateHandle,
    started: bool,
}

impl GatedFilter {
    /// Wrap `inner`; returns the filter and the handle that opens the gate
    pub fn new(inner: Box<dyn Filter>) -> (Self, GateHandle) {
        let gate = GateHandle::new();
        (
            Self {
                inner,
                gate: gate.clone(),
                started: false,
            },
            gate,
        )
    }

    /// Wrap `inner` with the gate already open, for connections that need no
    /// tunnel
    pub fn new_enabled(inner: Box<dyn Filter>) -> Self {
        let gate = GateHandle::new();
        gate.enable();
        Self {
            inner,
            gate,
            started: false,
        }
    }

    /// Run the wrapped filter's connect handling once the gate is open,
    /// prepending its opening bytes to `data`
    fn start_inner(&mut self, data: &mut BytesMut) -> Result<(), DeploymentError> {
        let mut out = FilterOutput::default();
        self.inner.on_connect(&mut out)?;
        self.started = true;

        if !out.writes.is_empty() {
            let tail = data.split();
            for write in out.writes {
                data.extend_from_slice(&write);
            }
            data.extend_from_slice(&tail);
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedFilter")
            .field("enabled", &self.gate.is_enabled())
            .field("started", &self.started)
            .finish()
    }
}

impl Filter for GatedFilter {
    fn on_connect(&mut self, out: &mut FilterOutput) -> Result<(), DeploymentError> {
        if self.gate.is_enabled() {
            self.started = true;
            self.inner.on_connect(out)?;
        }
        Ok(())
    }

    fn on_read(
        &mut self,
        data: &mut BytesMut,
        out: &mut FilterOutput,
    ) -> Result<Verdict, DeploymentError> {
        if !self.gate.is_enabled() {
            return Ok(Verdict::Continue);
        }
        if !self.started {
            // Opening bytes (a TLS ClientHello) must reach the wire; emit
            // them as a response write.
            let mut opening = BytesMut::new();
            self.start_inner(&mut opening)?;
            if !opening.is_empty() {
                out.write(opening.freeze());
            }
        }
        self.inner.on_read(data, out)
    }

    fn on_write(&mut self, data: &mut BytesMut) -> Result<(), DeploymentError> {
        if !self.gate.is_enabled() {
            return Ok(());
        }
        if !self.started {
            let payload = data.split();
            self.start_inner(data)?;
            let mut buffer = BytesMut::from(&payload[..]);
            self.inner.on_write(&mut buffer)?;
            data.extend_from_slice(&buffer);
            return Ok(());
        }
        self.inner.on_write(data)
    }

    fn on_close(&mut self) {
        if self.gate.is_enabled() && self.started {
            self.inner.on_close();
        }
    }
}

/// Ties a connection's lifecycle to the shared transport's connection count
pub struct SharedTransportFilter {
    transport: Arc<SharedTransport>,
    registered: bool,
}

impl SharedTransportFilter {
    /// Create a filter reporting to `transport`
    pub fn new(transport: Arc<SharedTransport>) -> Self {
        Self {
            transport,
            registered: false,
        }
    }
}

impl std::fmt::Debug for SharedTransportFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransportFilter")
            .field("registered", &self.registered)
            .finish()
    }
}

impl Filter for SharedTransportFilter {
    fn on_connect(&mut self, _out: &mut FilterOutput) -> Result<(), DeploymentError> {
        self.transport.register_connect();
        self.registered = true;
        Ok(())
    }

    fn on_read(
        &mut self,
        _data: &mut BytesMut,
        _out: &mut FilterOutput,
    ) -> Result<Verdict, DeploymentError> {
        self.transport.touch();
        Ok(Verdict::Continue)
    }

    fn on_close(&mut self) {
        if self.registered {
            self.registered = false;
            self.transport.register_close();
        }
    }
}
