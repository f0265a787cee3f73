//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Lifecycle action coordinator enforcing the permission table."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use culvert_proto::{ControlAction, LifecycleState};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::cache::{CacheInvalidator, StatusCache, StatusSnapshot};
use crate::client::ControlClient;
use crate::error::ControlError;

#[derive(Default)]
struct Flags {
    start: AtomicBool,
    stop: AtomicBool,
    restart: AtomicBool,
}

impl Flags {
    fn slot(&self, action: ControlAction) -> &AtomicBool {
        match action {
            ControlAction::Start => &self.start,
            ControlAction::Stop => &self.stop,
            ControlAction::Restart => &self.restart,
        }
    }

    fn any(&self) -> bool {
        self.start.load(Ordering::SeqCst)
            || self.stop.load(Ordering::SeqCst)
            || self.restart.load(Ordering::SeqCst)
    }
}

/// Per-action view of in-flight mutations, for labelling controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight {
    /// A start request is awaiting its response.
    pub start: bool,
    /// A stop request is awaiting its response.
    pub stop: bool,
    /// A restart request is awaiting its response.
    pub restart: bool,
}

impl InFlight {
    /// Whether any action is awaiting its response.
    pub fn any(self) -> bool {
        self.start || self.stop || self.restart
    }
}

/// Dispatches lifecycle actions and overlays the transitioning state.
///
/// At most one action can be in flight; while one is, the effective state is
/// [`LifecycleState::Transitioning`] and every action is refused locally.
/// Each dispatched request is followed by exactly one cache invalidation,
/// whatever its outcome. Locally refused dispatches touch neither the wire
/// nor the cache.
#[derive(Clone)]
pub struct ActionCoordinator {
    client: Arc<ControlClient>,
    snapshot: watch::Receiver<StatusSnapshot>,
    invalidator: CacheInvalidator,
    flags: Arc<Flags>,
    // Permission check and flag set happen under this lock so two racing
    // dispatches cannot both pass the check.
    gate: Arc<Mutex<()>>,
}

impl ActionCoordinator {
    /// Build a coordinator wired to `cache` for state reads and
    /// invalidation.
    pub fn new(client: Arc<ControlClient>, cache: &StatusCache) -> Self {
        Self {
            client,
            snapshot: cache.subscribe(),
            invalidator: cache.invalidator(),
            flags: Arc::new(Flags::default()),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Current per-action in-flight flags.
    pub fn in_flight(&self) -> InFlight {
        InFlight {
            start: self.flags.start.load(Ordering::SeqCst),
            stop: self.flags.stop.load(Ordering::SeqCst),
            restart: self.flags.restart.load(Ordering::SeqCst),
        }
    }

    /// Effective lifecycle state: transitioning while any dispatch is in
    /// flight, otherwise the classification of the cached status.
    pub fn effective_state(&self) -> LifecycleState {
        if self.flags.any() {
            LifecycleState::Transitioning
        } else {
            self.snapshot.borrow().lifecycle()
        }
    }

    /// Whether `action` would currently be accepted for dispatch.
    pub fn permitted(&self, action: ControlAction) -> bool {
        self.effective_state().permits(action)
    }

    /// Dispatch `action`, returning the agent's acknowledgement message.
    pub async fn dispatch(&self, action: ControlAction) -> Result<String, ControlError> {
        {
            let _guard = self.gate.lock();
            let state = self.effective_state();
            if !state.permits(action) {
                return Err(ControlError::NotPermitted { action, state });
            }
            self.flags.slot(action).store(true, Ordering::SeqCst);
        }

        info!(action = %action, "dispatching lifecycle action");
        let result = self.client.control(action).await;

        self.flags.slot(action).store(false, Ordering::SeqCst);
        // Exactly one invalidation per dispatched request, success or not.
        self.invalidator.invalidate();

        match result {
            Ok(envelope) if envelope.success => Ok(envelope
                .message
                .unwrap_or_else(|| format!("{action} requested"))),
            Ok(envelope) => Err(ControlError::application(envelope.error_text())),
            Err(err) => Err(err.into()),
        }
    }
}
