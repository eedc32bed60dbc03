//! One entrance: its guide pool, coordinator and capacity poller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::core::coordinator::IntentId;
use crate::core::{AdmissionError, BoundedPool, PollingAdapter, RequestCoordinator};
use crate::util::parse_group_size;

/// Operator-facing surface of an entrance process.
///
/// Every request method returns immediately; outcomes arrive through the
/// coordinator's [`AdmissionEvents`](crate::core::AdmissionEvents).
pub struct Entrance {
    coordinator: RequestCoordinator,
    max_group_size: u32,
    poll_delay: Duration,
    poll_interval: Duration,
    poller: Mutex<Option<PollingAdapter>>,
}

impl Entrance {
    /// Wrap a coordinator. Publishes the initial guide count.
    pub fn new(
        coordinator: RequestCoordinator,
        max_group_size: u32,
        poll_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        info!(
            entrance = coordinator.entrance(),
            guides = coordinator.guides().capacity(),
            "entrance ready"
        );
        let entrance = Self {
            coordinator,
            max_group_size,
            poll_delay,
            poll_interval,
            poller: Mutex::new(None),
        };
        entrance.publish_guide_count();
        entrance
    }

    /// Entrance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.coordinator.entrance()
    }

    /// Local guide pool.
    #[must_use]
    pub const fn guides(&self) -> &Arc<BoundedPool> {
        self.coordinator.guides()
    }

    /// Underlying coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Admit `count` visitors in the background.
    pub fn request_admission(&self, count: i32) -> IntentId {
        self.coordinator.request_admission(count)
    }

    /// End a visit of `group_size` visitors in the background.
    pub fn request_release(&self, group_size: i32) -> IntentId {
        self.coordinator.request_release(group_size)
    }

    /// Refresh remaining capacity in the background.
    pub fn query_remaining_capacity(&self) -> IntentId {
        self.coordinator.query_remaining_capacity()
    }

    /// Parse typed input and, if valid, admit that many visitors.
    ///
    /// # Errors
    ///
    /// `AdmissionError::InvalidArgument` with an operator-facing message;
    /// nothing is launched in that case.
    pub fn admit_from_input(&self, raw: &str) -> Result<IntentId, AdmissionError> {
        let group = parse_group_size(raw, self.max_group_size)?;
        let count = i32::try_from(group)
            .map_err(|_| AdmissionError::InvalidArgument(format!("group of {group} is too large")))?;
        Ok(self.request_admission(count))
    }

    /// Start periodic capacity polling, replacing any running poller.
    ///
    /// # Errors
    ///
    /// Fails if the timer thread cannot be spawned.
    pub fn start_polling(&self) -> io::Result<()> {
        let mut poller = self.poller.lock();
        if let Some(mut previous) = poller.take() {
            previous.stop();
        }
        *poller = Some(PollingAdapter::start(
            self.coordinator.clone(),
            self.poll_delay,
            self.poll_interval,
        )?);
        Ok(())
    }

    /// Stop periodic polling if it is running.
    pub fn stop_polling(&self) {
        if let Some(mut poller) = self.poller.lock().take() {
            poller.stop();
        }
    }

    /// Whether a poller is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn publish_guide_count(&self) {
        self.coordinator
            .events()
            .on_guide_count_changed(self.guides().peek());
    }
}

impl Drop for Entrance {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
