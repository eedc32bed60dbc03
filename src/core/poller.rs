//! Periodic capacity polling.
//!
//! Fires a detached query intent at a fixed rate after an initial delay.
//! Ticks do not wait for earlier queries to finish.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::RequestCoordinator;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleep until `deadline` or until stopped; returns `true` if stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Background timer issuing capacity queries through a coordinator.
pub struct PollingAdapter {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl PollingAdapter {
    /// Start polling: first query after `delay`, then one every `interval`.
    ///
    /// # Errors
    ///
    /// Fails if the timer thread cannot be spawned.
    pub fn start(
        coordinator: RequestCoordinator,
        delay: Duration,
        interval: Duration,
    ) -> io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(format!("poller-{}", coordinator.entrance()))
            .spawn(move || {
                let mut next = Instant::now() + delay;
                while !thread_signal.wait_until(next) {
                    coordinator.query_remaining_capacity();
                    next += interval;
                }
                debug!(entrance = coordinator.entrance(), "capacity polling stopped");
            })?;
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Stop the timer and wait for its thread. Queries already launched run on.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollingAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AdmissionEvent, BoundedPool, ChannelEvents};
    use crate::infra::Transport;

    struct FixedCapacity;

    impl Transport for FixedCapacity {
        fn exchange(&self, code: i32) -> io::Result<i32> {
            assert_eq!(code, 0, "poller must only send queries");
            Ok(17)
        }
    }

    #[test]
    fn test_polls_repeatedly_until_stopped() {
        let (events, rx) = ChannelEvents::new();
        let coordinator = RequestCoordinator::new(
            Arc::new(BoundedPool::new("guides", 4)),
            Arc::new(FixedCapacity),
            Arc::new(events),
        );
        let guides = Arc::clone(coordinator.guides());

        let mut poller = PollingAdapter::start(
            coordinator,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )
        .unwrap();

        for _ in 0..3 {
            let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(event, AdmissionEvent::CapacityChanged(17));
        }
        poller.stop();
        assert_eq!(guides.peek(), 4);
    }

    #[test]
    fn test_stop_before_first_tick_sends_nothing() {
        let (events, rx) = ChannelEvents::new();
        let coordinator = RequestCoordinator::new(
            Arc::new(BoundedPool::new("guides", 4)),
            Arc::new(FixedCapacity),
            Arc::new(events),
        );

        let mut poller =
            PollingAdapter::start(coordinator, Duration::from_secs(60), Duration::from_secs(1))
                .unwrap();
        poller.stop();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
