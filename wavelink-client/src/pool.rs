//! Shared transport pool
//!
//! Sockets configured with [`TransportMode::Shared`](crate::TransportMode)
//! draw their I/O runtime from a [`TransportPool`]. The pooled runtime is
//! created lazily on first use, counts its open connections, and shuts
//! itself down once it has been idle with zero connections for the
//! configured timeout. The next connection attempt after a shutdown creates
//! a fresh runtime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

/// Default idle timeout before a pooled runtime shuts down
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazily-created, reference-counted runtime shared between sockets
#[derive(Debug)]
pub struct TransportPool {
    idle_timeout: Duration,
    worker_threads: usize,
    current: Mutex<Option<Arc<SharedTransport>>>,
}

impl TransportPool {
    /// Create a pool; the runtime itself is not created until the first
    /// [`TransportPool::get_or_create`]
    pub fn new(idle_timeout: Duration, worker_threads: usize) -> Arc<Self> {
        Arc::new(Self {
            idle_timeout,
            worker_threads: worker_threads.max(1),
            current: Mutex::new(None),
        })
    }

    /// Create a pool with the default idle timeout
    pub fn with_defaults(worker_threads: usize) -> Arc<Self> {
        Self::new(DEFAULT_IDLE_TIMEOUT, worker_threads)
    }

    /// Get the live shared transport, creating one if none is running
    pub fn get_or_create(self: &Arc<Self>) -> std::io::Result<Arc<SharedTransport>> {
        let mut current = self.current.lock();
        if let Some(transport) = current.as_ref() {
            if transport.is_running() {
                return Ok(Arc::clone(transport));
            }
        }

        tracing::debug!(
            worker_threads = self.worker_threads,
            "creating shared transport runtime"
        );
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name("wavelink-io")
            .enable_all()
            .build()?;
        let transport = Arc::new(SharedTransport {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            open_connections: AtomicUsize::new(0),
            last_accessed: Mutex::new(Instant::now()),
            reaper_scheduled: AtomicBool::new(false),
            idle_timeout: self.idle_timeout,
            pool: Arc::downgrade(self),
        });
        *current = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Whether a runtime is currently live
    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|t| t.is_running())
    }

    /// Forget `transport` if it is still the pool's current one
    fn clear(&self, transport: &SharedTransport) {
        let mut current = self.current.lock();
        if let Some(live) = current.as_ref() {
            if std::ptr::eq(live.as_ref(), transport) {
                *current = None;
            }
        }
    }
}

/// A pooled runtime plus its connection accounting
pub struct SharedTransport {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    open_connections: AtomicUsize,
    last_accessed: Mutex<Instant>,
    /// At most one reaper countdown runs at a time.
    reaper_scheduled: AtomicBool,
    idle_timeout: Duration,
    pool: Weak<TransportPool>,
}

impl std::fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransport")
            .field("open_connections", &self.open_connections.load(Ordering::SeqCst))
            .field("running", &self.is_running())
            .finish()
    }
}

impl SharedTransport {
    /// Handle for spawning socket drivers onto this runtime
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether the runtime has not been shut down
    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Number of connections currently open on this transport
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Record activity, pushing the idle deadline out
    pub fn touch(&self) {
        *self.last_accessed.lock() = Instant::now();
    }

    /// A connection opened on this transport
    pub fn register_connect(&self) {
        self.touch();
        self.open_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// A connection closed; the last one arms the idle countdown
    pub fn register_close(self: &Arc<Self>) {
        self.touch();
        if self.open_connections.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.schedule_reaper();
        }
    }

    fn schedule_reaper(self: &Arc<Self>) {
        if self
            .reaper_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::debug!(timeout = ?self.idle_timeout, "transport idle, scheduling shutdown");
        let transport = Arc::clone(self);
        std::thread::Builder::new()
            .name("wavelink-reaper".to_string())
            .spawn(move || transport.reap())
            .ok();
    }

    fn reap(self: Arc<Self>) {
        let mut delay = self.idle_timeout;
        loop {
            std::thread::sleep(delay);

            if self.open_connections.load(Ordering::SeqCst) > 0 {
                if self.stand_down() {
                    delay = self.idle_timeout;
                    continue;
                }
                return;
            }

            let idle = self.last_accessed.lock().elapsed();
            if idle >= self.idle_timeout {
                tracing::debug!("shutting down idle shared transport");
                if let Some(pool) = self.pool.upgrade() {
                    pool.clear(&self);
                }
                if let Some(runtime) = self.runtime.lock().take() {
                    runtime.shutdown_background();
                }
                return;
            }
            // Activity moved the deadline; sleep out the remainder.
            delay = self.idle_timeout - idle;
        }
    }

    /// Release the countdown when connections have come back.
    ///
    /// The last close can race this release: it drops the counter to zero
    /// while the flag is still held, so its re-arm CAS fails. Returns true
    /// when this countdown reclaimed the flag for that lost close and must
    /// keep running.
    fn stand_down(&self) -> bool {
        self.reaper_scheduled.store(false, Ordering::SeqCst);
        self.open_connections.load(Ordering::SeqCst) == 0
            && self
                .reaper_scheduled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}

impl Drop for SharedTransport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}
