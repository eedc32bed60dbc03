//! Server-side accept loop for the capacity pool.
//!
//! Each accepted connection carries exactly one exchange and moves through
//! [`ConnectionState`]: await request, process it against the pool, send the
//! response, close. Processing happens on a worker chosen by the configured
//! [`WorkerPolicy`], so the accept loop itself never waits on the pool.
//!
//! Shutdown sets a shared flag and wakes the blocking `accept` with a
//! loopback connection; the loop then returns and drops the listener.
//! Connections accepted before that point are still served.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::config::WorkerPolicy;
use crate::core::connection_pool::ConnectionWorkerPool;
use crate::core::protocol::{read_code, write_code, Request, REFUSED};
use crate::core::{BoundedPool, PoolError};

/// Lifecycle of a single accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the request frame.
    AwaitRequest,
    /// Applying the request to the pool; may block in `acquire`.
    Processing,
    /// Response frame written.
    RespondSent,
    /// Connection dropped.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitRequest => "await_request",
            Self::Processing => "processing",
            Self::RespondSent => "respond_sent",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lock-free dispatcher counters.
#[derive(Debug, Default)]
pub(crate) struct DispatcherCounters {
    accepted: AtomicU64,
    served: AtomicU64,
    refused: AtomicU64,
    failed: AtomicU64,
}

impl DispatcherCounters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            served: self.served.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time dispatcher statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Connections accepted.
    pub accepted: u64,
    /// Exchanges that wrote a response, including refusals.
    pub served: u64,
    /// Responses that were [`REFUSED`].
    pub refused: u64,
    /// Connections that failed before a response could be written.
    pub failed: u64,
}

/// Accept loop bound to a listening socket and a capacity pool.
pub struct ConnectionDispatcher {
    listener: TcpListener,
    local_addr: SocketAddr,
    pool: Arc<BoundedPool>,
    policy: WorkerPolicy,
    shutdown: Arc<AtomicBool>,
    counters: Arc<DispatcherCounters>,
}

impl ConnectionDispatcher {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Propagates bind failures.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        pool: Arc<BoundedPool>,
        policy: WorkerPolicy,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, capacity = pool.capacity(), ?policy, "capacity server listening");
        Ok(Self {
            listener,
            local_addr,
            pool,
            policy,
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(DispatcherCounters::default()),
        })
    }

    /// Address actually bound, useful when binding port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The pool this dispatcher serves.
    #[must_use]
    pub const fn pool(&self) -> &Arc<BoundedPool> {
        &self.pool
    }

    /// Handle that stops the accept loop from any thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            wake_addr: loopback_for(self.local_addr),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Run the accept loop on the calling thread until shut down.
    ///
    /// Accept errors are logged and the loop continues.
    ///
    /// # Errors
    ///
    /// Fails only if the bounded worker pool cannot spawn its threads.
    pub fn run(self) -> io::Result<()> {
        let mut workers = match self.policy {
            WorkerPolicy::ThreadPerConnection => None,
            WorkerPolicy::Bounded { workers } => Some(ConnectionWorkerPool::start(
                workers,
                &self.pool,
                &self.counters,
            )?),
        };

        for incoming in self.listener.incoming() {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            self.counters.accepted.fetch_add(1, Ordering::Relaxed);

            match workers.as_ref() {
                Some(pool) => pool.dispatch(stream),
                None => self.spawn_connection_thread(stream),
            }
        }

        if let Some(pool) = workers.as_mut() {
            pool.shutdown();
        }
        info!(local_addr = %self.local_addr, stats = ?self.counters.snapshot(), "capacity server stopped");
        Ok(())
    }

    /// Run the accept loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn(self) -> io::Result<DispatcherHandle> {
        let shutdown = self.shutdown_handle();
        let counters = Arc::clone(&self.counters);
        let pool = Arc::clone(&self.pool);
        let local_addr = self.local_addr;
        let thread = thread::Builder::new()
            .name(format!("tunnel-dispatcher-{}", local_addr.port()))
            .spawn(move || self.run())?;
        Ok(DispatcherHandle {
            shutdown,
            counters,
            pool,
            local_addr,
            thread: Some(thread),
        })
    }

    // Thread per connection; the count is bounded only by concurrent clients.
    fn spawn_connection_thread(&self, stream: TcpStream) {
        let pool = Arc::clone(&self.pool);
        let counters = Arc::clone(&self.counters);
        let spawned = thread::Builder::new()
            .name("tunnel-connection".into())
            .spawn(move || handle_stream(stream, &pool, &counters));
        if let Err(e) = spawned {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "could not spawn connection worker");
        }
    }
}

/// Stops a running [`ConnectionDispatcher`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Set the shutdown flag and wake the accept loop. Idempotent.
    ///
    /// Connections accepted before the loop observes the flag are served to
    /// completion. A connection the loop takes from the backlog after the flag
    /// is set, or one still queued when the listener closes, is closed without
    /// a response: the client's read fails with EOF or a reset rather than
    /// waiting.
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(addr = %self.wake_addr, "shutting down capacity server");
        // The loop only observes the flag after accept returns.
        if let Err(e) = TcpStream::connect(self.wake_addr) {
            warn!(error = %e, "could not wake accept loop");
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Owner of a dispatcher running on its own thread.
///
/// Dropping the handle requests shutdown without waiting for the thread.
pub struct DispatcherHandle {
    shutdown: ShutdownHandle,
    counters: Arc<DispatcherCounters>,
    pool: Arc<BoundedPool>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl DispatcherHandle {
    /// Address the dispatcher is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The pool the dispatcher serves.
    #[must_use]
    pub const fn pool(&self) -> &Arc<BoundedPool> {
        &self.pool
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// A clonable shutdown trigger.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop accepting and wait for the accept loop to return.
    ///
    /// # Errors
    ///
    /// Returns the accept loop's error, or `Other` if its thread panicked.
    pub fn shutdown_and_join(mut self) -> io::Result<()> {
        self.shutdown.shutdown();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| io::Error::other("dispatcher thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown.shutdown();
        }
    }
}

/// Apply one request code to the pool and produce the response code.
///
/// Acquire blocks the calling thread until capacity frees up.
pub fn respond(pool: &BoundedPool, code: i32) -> i32 {
    let outcome = match Request::decode(code) {
        Some(Request::Query) => Ok(i32::try_from(pool.peek()).unwrap_or(i32::MAX)),
        Some(Request::Acquire(units)) => pool.acquire(units).map(|_| units),
        Some(Request::Release(units)) => pool.release(units).map(|_| units),
        None => Err(PoolError::InvalidArgument {
            units: i64::from(code),
            capacity: pool.capacity(),
            available: pool.peek(),
        }),
    };
    outcome.unwrap_or_else(|e| {
        warn!(pool = %pool.name(), code, error = %e, "request refused");
        REFUSED
    })
}

/// Serve a single exchange on `stream`: read one code, write one response.
///
/// # Errors
///
/// Propagates read and write failures; nothing is written if the read fails.
pub fn serve_connection<S: Read + Write>(stream: &mut S, pool: &BoundedPool) -> io::Result<i32> {
    let mut state = ConnectionState::AwaitRequest;
    let code = read_code(stream)?;

    state = transition(state, ConnectionState::Processing, code);
    let response = respond(pool, code);

    write_code(stream, response)?;
    transition(state, ConnectionState::RespondSent, code);
    Ok(response)
}

fn transition(from: ConnectionState, to: ConnectionState, code: i32) -> ConnectionState {
    debug!(%from, %to, code, "connection state");
    to
}

/// Serve and close one accepted TCP connection, recording the outcome.
pub(crate) fn handle_stream(
    mut stream: TcpStream,
    pool: &BoundedPool,
    counters: &DispatcherCounters,
) {
    let peer = stream.peer_addr().ok();
    match serve_connection(&mut stream, pool) {
        Ok(response) => {
            counters.served.fetch_add(1, Ordering::Relaxed);
            if response == REFUSED {
                counters.refused.fetch_add(1, Ordering::Relaxed);
            }
            debug!(?peer, response, "exchange complete");
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!(?peer, error = %e, "exchange aborted");
        }
    }
    drop(stream);
    debug!(?peer, state = %ConnectionState::Closed, "connection state");
}

fn loopback_for(addr: SocketAddr) -> SocketAddr {
    let mut wake = addr;
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => wake.set_ip(std::net::Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => wake.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    wake
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Exchange {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Exchange {
        fn new(code: i32) -> Self {
            Self {
                input: Cursor::new(code.to_be_bytes().to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Exchange {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Exchange {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_respond_follows_code_conventions() {
        let pool = BoundedPool::new("visitors", 50);
        assert_eq!(respond(&pool, 7), 7);
        assert_eq!(respond(&pool, 0), 43);
        assert_eq!(respond(&pool, -7), 7);
        assert_eq!(pool.peek(), 50);
    }

    #[test]
    fn test_respond_refuses_invalid_counts() {
        let pool = BoundedPool::new("visitors", 50);
        assert_eq!(respond(&pool, 51), REFUSED);
        assert_eq!(respond(&pool, -1), REFUSED);
        assert_eq!(respond(&pool, i32::MIN), REFUSED);
        assert_eq!(pool.peek(), 50);
    }

    #[test]
    fn test_serve_connection_writes_one_frame() {
        let pool = BoundedPool::new("visitors", 50);
        let mut exchange = Exchange::new(12);
        assert_eq!(serve_connection(&mut exchange, &pool).unwrap(), 12);
        assert_eq!(exchange.output, 12_i32.to_be_bytes().to_vec());
        assert_eq!(pool.peek(), 38);
    }

    #[test]
    fn test_serve_connection_without_request_writes_nothing() {
        let pool = BoundedPool::new("visitors", 50);
        let mut exchange = Exchange {
            input: Cursor::new(vec![0, 0]),
            output: Vec::new(),
        };
        assert!(serve_connection(&mut exchange, &pool).is_err());
        assert!(exchange.output.is_empty());
        assert_eq!(pool.peek(), 50);
    }

    #[test]
    fn test_loopback_for_unspecified_address() {
        let addr: SocketAddr = "0.0.0.0:65535".parse().unwrap();
        assert_eq!(loopback_for(addr), "127.0.0.1:65535".parse().unwrap());
        let addr: SocketAddr = "10.0.0.5:80".parse().unwrap();
        assert_eq!(loopback_for(addr), addr);
    }
}
