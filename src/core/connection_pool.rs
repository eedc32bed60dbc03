//! Fixed set of worker threads serving accepted connections.
//!
//! Backs [`WorkerPolicy::Bounded`](crate::config::WorkerPolicy::Bounded).
//! Connections are queued on an unbounded crossbeam channel so the accept
//! loop never waits on a worker; workers block on `recv` and exit once the
//! sender is dropped and the queue is drained.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::core::dispatcher::{handle_stream, DispatcherCounters};
use crate::core::BoundedPool;

/// Worker threads fed from a shared connection queue.
pub(crate) struct ConnectionWorkerPool {
    /// `None` once shut down.
    tx: Option<Sender<TcpStream>>,
    workers: Vec<JoinHandle<()>>,
}

impl ConnectionWorkerPool {
    /// Spawn `worker_count` named worker threads.
    pub(crate) fn start(
        worker_count: usize,
        pool: &Arc<BoundedPool>,
        counters: &Arc<DispatcherCounters>,
    ) -> io::Result<Self> {
        let (tx, rx) = unbounded::<TcpStream>();
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(spawn_worker(
                worker_id,
                rx.clone(),
                Arc::clone(pool),
                Arc::clone(counters),
            )?);
        }
        info!(worker_count, "connection worker pool started");
        Ok(Self {
            tx: Some(tx),
            workers,
        })
    }

    /// Queue a connection for the next free worker.
    pub(crate) fn dispatch(&self, stream: TcpStream) {
        let Some(tx) = self.tx.as_ref() else {
            warn!("connection worker pool already shut down; dropping connection");
            return;
        };
        if tx.send(stream).is_err() {
            warn!("every connection worker has exited; dropping connection");
        }
    }

    /// Stop accepting work. Queued connections are still served.
    ///
    /// Workers are detached rather than joined: one may be parked in
    /// `acquire` until some other entrance releases capacity.
    pub(crate) fn shutdown(&mut self) {
        if self.tx.take().is_some() {
            debug!(
                worker_count = self.workers.len(),
                "connection queue closed; workers exit after draining"
            );
            self.workers.clear();
        }
    }
}

impl Drop for ConnectionWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    worker_id: usize,
    rx: Receiver<TcpStream>,
    pool: Arc<BoundedPool>,
    counters: Arc<DispatcherCounters>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("tunnel-worker-{worker_id}"))
        .spawn(move || {
            debug!(worker_id, "connection worker started");
            // recv fails once the sender is dropped and the queue is empty
            while let Ok(stream) = rx.recv() {
                handle_stream(stream, &pool, &counters);
            }
            debug!(worker_id, "connection worker exiting");
        })
}
