//! Status callbacks delivered to the operator-facing layer.
//!
//! Intents run on background tasks, so every outcome reaches the caller only
//! through an [`AdmissionEvents`] implementation. Callbacks are invoked from
//! those background tasks; implementations must hand off to their own thread
//! if they touch thread-affine state. [`ChannelEvents`] does exactly that.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::AdmissionError;

/// Receiver of asynchronous admission feedback.
pub trait AdmissionEvents: Send + Sync + 'static {
    /// Human-readable progress or failure text.
    fn on_status(&self, text: &str);
    /// Guides now free at this entrance.
    fn on_guide_count_changed(&self, available: u32);
    /// Visitor capacity still free in the tunnel.
    fn on_capacity_changed(&self, available: u32);
    /// A group of `group_size` visitors was admitted and holds a guide.
    fn on_admission_confirmed(&self, group_size: u32);
    /// The server confirmed the end of a visit of `group_size` visitors.
    fn on_release_confirmed(&self, group_size: u32) {
        let _ = group_size;
    }
    /// An admission or release intent failed.
    fn on_failure(&self, error: &AdmissionError);
}

/// Owned form of a callback, suitable for queues and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "value")]
pub enum AdmissionEvent {
    /// See [`AdmissionEvents::on_status`].
    Status(String),
    /// See [`AdmissionEvents::on_guide_count_changed`].
    GuideCountChanged(u32),
    /// See [`AdmissionEvents::on_capacity_changed`].
    CapacityChanged(u32),
    /// See [`AdmissionEvents::on_admission_confirmed`].
    AdmissionConfirmed(u32),
    /// See [`AdmissionEvents::on_release_confirmed`].
    ReleaseConfirmed(u32),
    /// See [`AdmissionEvents::on_failure`]; carries the error text.
    Failure(String),
}

/// Forwards every callback as an [`AdmissionEvent`] over a channel.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: Sender<AdmissionEvent>,
}

impl ChannelEvents {
    /// Create the sink and the receiver the operator thread drains.
    #[must_use]
    pub fn new() -> (Self, Receiver<AdmissionEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: AdmissionEvent) {
        // The receiver may be gone when the operator layer shuts down first.
        let _ = self.tx.send(event);
    }
}

impl AdmissionEvents for ChannelEvents {
    fn on_status(&self, text: &str) {
        self.send(AdmissionEvent::Status(text.to_owned()));
    }

    fn on_guide_count_changed(&self, available: u32) {
        self.send(AdmissionEvent::GuideCountChanged(available));
    }

    fn on_capacity_changed(&self, available: u32) {
        self.send(AdmissionEvent::CapacityChanged(available));
    }

    fn on_admission_confirmed(&self, group_size: u32) {
        self.send(AdmissionEvent::AdmissionConfirmed(group_size));
    }

    fn on_release_confirmed(&self, group_size: u32) {
        self.send(AdmissionEvent::ReleaseConfirmed(group_size));
    }

    fn on_failure(&self, error: &AdmissionError) {
        self.send(AdmissionEvent::Failure(error.to_string()));
    }
}

/// Writes every callback to the tracing log. Useful for headless entrances.
#[derive(Debug, Clone, Default)]
pub struct TracingEvents {
    entrance: String,
}

impl TracingEvents {
    /// Log under the given entrance name.
    pub fn new(entrance: impl Into<String>) -> Self {
        Self {
            entrance: entrance.into(),
        }
    }
}

impl AdmissionEvents for TracingEvents {
    fn on_status(&self, text: &str) {
        info!(entrance = %self.entrance, "{text}");
    }

    fn on_guide_count_changed(&self, available: u32) {
        info!(entrance = %self.entrance, available, "available guides");
    }

    fn on_capacity_changed(&self, available: u32) {
        info!(entrance = %self.entrance, available, "available visitors");
    }

    fn on_admission_confirmed(&self, group_size: u32) {
        info!(entrance = %self.entrance, group_size, "visit started");
    }

    fn on_release_confirmed(&self, group_size: u32) {
        info!(entrance = %self.entrance, group_size, "visit finished");
    }

    fn on_failure(&self, error: &AdmissionError) {
        warn!(entrance = %self.entrance, error = %error, "intent failed");
    }
}
