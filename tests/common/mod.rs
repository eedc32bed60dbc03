//! Shared helpers for the network-level integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tunnel_admission::config::WorkerPolicy;
use tunnel_admission::core::protocol::exchange;
use tunnel_admission::core::{AdmissionEvent, BoundedPool, ConnectionDispatcher, DispatcherHandle};

/// Upper bound for anything that is expected to happen.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to watch for something that is expected *not* to happen.
pub const SETTLE: Duration = Duration::from_millis(150);

/// Start a dispatcher on an ephemeral loopback port.
pub fn start_server(capacity: u32, policy: WorkerPolicy) -> DispatcherHandle {
    let pool = Arc::new(BoundedPool::new("visitors", capacity));
    ConnectionDispatcher::bind("127.0.0.1:0", pool, policy)
        .expect("bind loopback")
        .spawn()
        .expect("spawn dispatcher")
}

/// One raw exchange against `addr`.
///
/// Panics instead of hanging if no reply arrives within [`EVENT_TIMEOUT`].
pub fn send(addr: SocketAddr, code: i32) -> i32 {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(EVENT_TIMEOUT))
        .expect("set read timeout");
    exchange(&mut stream, code).expect("exchange")
}

/// A loopback address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

/// Drain `rx` until `pred` matches, returning every event seen on the way.
///
/// Panics if nothing matches within [`EVENT_TIMEOUT`].
pub fn wait_for<F>(rx: &Receiver<AdmissionEvent>, mut pred: F) -> Vec<AdmissionEvent>
where
    F: FnMut(&AdmissionEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let mut seen = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(event) => {
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            Err(_) => panic!("no matching event within {EVENT_TIMEOUT:?}; saw {seen:?}"),
        }
    }
}

/// Poll `cond` until it holds or [`EVENT_TIMEOUT`] passes.
pub fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
