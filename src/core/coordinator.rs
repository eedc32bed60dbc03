//! Client-side coordination of the guide pool and the remote capacity pool.
//!
//! An admission is a two-step saga without a shared transaction:
//!
//! 1. take a guide from the local pool (blocks while all guides are out)
//! 2. ask the capacity server for the group's places
//!
//! If step 2 fails for any reason the guide is handed back before the failure
//! is reported. A successful admission keeps the guide; it now belongs to the
//! visit and is returned by the matching release.
//!
//! Ending a visit frees the guide first and only then tells the server. If
//! the server does not confirm, the guide stays free and the server's count
//! is not corrected: the two pools can disagree until an operator
//! intervenes. There is no remote rollback primitive to do better.
//!
//! Queries never touch the guide pool and fail silently.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_GROUP_SIZE;
use crate::core::protocol::{Request, REFUSED};
use crate::core::{AdmissionError, AdmissionEvents, BoundedPool};
use crate::infra::Transport;
use crate::runtime::{IntentSpawner, ThreadSpawner};

/// Correlates a launched intent with its log output.
pub type IntentId = Uuid;

/// One operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Ask for the tunnel's free capacity.
    Query,
    /// Admit a group of the given size.
    Admit(i32),
    /// End a visit of the given group size.
    Release(i32),
}

impl Intent {
    /// Interpret a signed count: positive admits, negative releases `-code`,
    /// zero queries.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Query
        } else if code > 0 {
            Self::Admit(code)
        } else {
            Self::Release(code.saturating_neg())
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Admit(_) => "admit",
            Self::Release(_) => "release",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Admit(n) => write!(f, "admit {n}"),
            Self::Release(n) => write!(f, "release {n}"),
        }
    }
}

/// Successful result of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    /// Free capacity reported by the server.
    Capacity(u32),
    /// Group admitted; the guide stays with the visit.
    Admitted(u32),
    /// Visit ended and confirmed by the server.
    Released(u32),
}

/// Runs admission, release and query intents for one entrance.
#[derive(Clone)]
pub struct RequestCoordinator {
    entrance: Arc<str>,
    guides: Arc<BoundedPool>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn AdmissionEvents>,
    spawner: Arc<dyn IntentSpawner>,
    max_group_size: u32,
}

impl RequestCoordinator {
    /// Coordinator over `guides`, talking to the server through `transport`.
    ///
    /// Intents run on detached OS threads until
    /// [`with_spawner`](Self::with_spawner) says otherwise.
    pub fn new(
        guides: Arc<BoundedPool>,
        transport: Arc<dyn Transport>,
        events: Arc<dyn AdmissionEvents>,
    ) -> Self {
        Self {
            entrance: Arc::from(guides.name()),
            guides,
            transport,
            events,
            spawner: Arc::new(ThreadSpawner),
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
        }
    }

    /// Name used in logs and task names.
    #[must_use]
    pub fn with_entrance_name(mut self, name: &str) -> Self {
        self.entrance = Arc::from(name);
        self
    }

    /// Run intents through `spawner`.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn IntentSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Reject groups larger than `max` before touching any pool.
    #[must_use]
    pub const fn with_max_group_size(mut self, max: u32) -> Self {
        self.max_group_size = max;
        self
    }

    /// Entrance name.
    #[must_use]
    pub fn entrance(&self) -> &str {
        &self.entrance
    }

    /// The local guide pool.
    #[must_use]
    pub const fn guides(&self) -> &Arc<BoundedPool> {
        &self.guides
    }

    /// Callback sink every intent reports to.
    #[must_use]
    pub const fn events(&self) -> &Arc<dyn AdmissionEvents> {
        &self.events
    }

    /// Admit `count` visitors in the background.
    pub fn request_admission(&self, count: i32) -> IntentId {
        self.launch(Intent::Admit(count))
    }

    /// End a visit of `group_size` visitors in the background.
    pub fn request_release(&self, group_size: i32) -> IntentId {
        self.launch(Intent::Release(group_size))
    }

    /// Refresh the remaining tunnel capacity in the background.
    pub fn query_remaining_capacity(&self) -> IntentId {
        self.launch(Intent::Query)
    }

    /// Start `intent` on the spawner and return immediately.
    pub fn launch(&self, intent: Intent) -> IntentId {
        let id = Uuid::new_v4();
        let this = self.clone();
        let name = format!("{}-{}", self.entrance, intent.label());
        self.spawner.spawn(
            &name,
            Box::new(move || {
                let _ = this.run(id, intent);
            }),
        );
        id
    }

    /// Run `intent` on the calling thread, reporting through the callbacks.
    ///
    /// # Errors
    ///
    /// The same failure that was reported through `on_failure`, or the
    /// silent failure of a query.
    pub fn execute(&self, intent: Intent) -> Result<IntentOutcome, AdmissionError> {
        self.run(Uuid::new_v4(), intent)
    }

    fn run(&self, id: IntentId, intent: Intent) -> Result<IntentOutcome, AdmissionError> {
        let span = info_span!("intent", entrance = %self.entrance, %id, %intent);
        let _guard = span.enter();
        match intent {
            Intent::Query => self.query(),
            Intent::Admit(count) => self.admit(count),
            Intent::Release(group_size) => self.release(group_size),
        }
    }

    fn query(&self) -> Result<IntentOutcome, AdmissionError> {
        let response = self.transport.exchange(Request::Query.code()).map_err(|e| {
            debug!(error = %e, "capacity poll failed");
            AdmissionError::from(e)
        })?;
        let available = u32::try_from(response).map_err(|_| {
            debug!(response, "capacity poll returned a negative count");
            AdmissionError::ProtocolMismatch {
                expected: 0,
                actual: response,
            }
        })?;
        self.events.on_capacity_changed(available);
        Ok(IntentOutcome::Capacity(available))
    }

    fn admit(&self, count: i32) -> Result<IntentOutcome, AdmissionError> {
        let group = self.validate_group(count).map_err(|e| self.fail(e, Phase::Start))?;

        let remaining = self
            .guides
            .acquire(1)
            .map_err(|e| self.fail(e.into(), Phase::Start))?;
        self.events.on_guide_count_changed(remaining);

        let requested = || {
            self.events
                .on_status(&format!("Visit with {group} visitors requested..."));
        };
        match self.confirm(Request::Acquire(count), requested) {
            Ok(()) => {
                self.events
                    .on_status(&format!("Visit with {group} visitors enter the tunnel"));
                self.events.on_admission_confirmed(group);
                Ok(IntentOutcome::Admitted(group))
            }
            Err(err) => {
                warn!(error = %err, "admission failed; returning guide");
                self.return_guide();
                Err(self.fail(err, Phase::Start))
            }
        }
    }

    fn release(&self, group_size: i32) -> Result<IntentOutcome, AdmissionError> {
        let group = self
            .validate_group(group_size)
            .map_err(|e| self.fail(e, Phase::End))?;

        // The guide is free as soon as the visit ends, whatever the server says.
        let remaining = self
            .guides
            .release(1)
            .map_err(|e| self.fail(e.into(), Phase::End))?;
        self.events.on_guide_count_changed(remaining);

        match self.confirm(Request::Release(group_size), || {}) {
            Ok(()) => {
                self.events
                    .on_status(&format!("Visit with {group} visitors finished"));
                self.events.on_release_confirmed(group);
                Ok(IntentOutcome::Released(group))
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "server did not confirm release; guide stays free, remote capacity may be short"
                );
                Err(self.fail(err, Phase::End))
            }
        }
    }

    fn validate_group(&self, count: i32) -> Result<u32, AdmissionError> {
        match u32::try_from(count) {
            Ok(group) if group > 0 && group <= self.max_group_size => Ok(group),
            Ok(group) if group > 0 => Err(AdmissionError::InvalidArgument(format!(
                "A maximum of {} visitors is allowed per group, got {group}",
                self.max_group_size
            ))),
            _ => Err(AdmissionError::InvalidArgument(format!(
                "The number of visitors must be positive, got {count}"
            ))),
        }
    }

    // One exchange, no retry.
    fn confirm(
        &self,
        request: Request,
        mut on_connected: impl FnMut(),
    ) -> Result<(), AdmissionError> {
        let response = self
            .transport
            .exchange_connected(request.code(), &mut on_connected)?;
        match (request, request.confirmation()) {
            (_, Some(expected)) if response == expected => Ok(()),
            (Request::Acquire(requested), _) if response == REFUSED => {
                Err(AdmissionError::Rejected { requested })
            }
            (_, expected) => Err(AdmissionError::ProtocolMismatch {
                expected: expected.unwrap_or_default(),
                actual: response,
            }),
        }
    }

    fn return_guide(&self) {
        match self.guides.release(1) {
            Ok(remaining) => self.events.on_guide_count_changed(remaining),
            Err(e) => error!(error = %e, "compensating guide release rejected"),
        }
    }

    fn fail(&self, err: AdmissionError, phase: Phase) -> AdmissionError {
        self.events.on_status(&failure_status(&err, phase));
        self.events.on_failure(&err);
        err
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("entrance", &self.entrance)
            .field("guides", &self.guides)
            .field("max_group_size", &self.max_group_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    End,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

fn failure_status(err: &AdmissionError, phase: Phase) -> String {
    match (err, phase) {
        (AdmissionError::InvalidArgument(msg), _) => format!("Err:{msg}"),
        (AdmissionError::NetworkUnavailable(e), phase) => {
            format!("Err:Network error ({}): {e}", phase.as_str())
        }
        (AdmissionError::Rejected { .. }, _) => "Err:Server error during start request.".into(),
        (AdmissionError::ProtocolMismatch { actual, .. }, Phase::Start) => {
            format!("Err:Server denied start request (Code: {actual})")
        }
        (AdmissionError::ProtocolMismatch { actual, .. }, Phase::End) => {
            format!("Err:Server did not confirm end correctly (Code: {actual})")
        }
        (AdmissionError::Interrupted, _) => "Err:Operation interrupted (waiting for guide?).".into(),
    }
}
