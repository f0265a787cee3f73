//! ---
//! culvert_section: "01-wire-contract"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Service status report, lifecycle classification and action permissions."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time status of the supervised unit as reported by the host
/// service manager. Read-only for clients; mutations go through the
/// lifecycle actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Raw unit state string, e.g. `active`, `inactive`, `failed`,
    /// `activating`. Open set; unrecognized values classify as unknown.
    pub active_state: String,
    /// Finer-grained unit sub-state, e.g. `running`, `dead`.
    pub sub_state: String,
    /// Whether the unit definition itself loaded, e.g. `loaded`.
    pub load_state: String,
    /// Human-readable unit description.
    pub description: String,
    /// Main process id, zero when the unit has none.
    #[serde(rename = "mainPID")]
    pub main_pid: u32,
    /// Resident memory in bytes, zero when unavailable.
    pub memory_current: u64,
    /// Cumulative CPU time in nanoseconds, zero when unavailable.
    #[serde(rename = "cpuUsageNSec")]
    pub cpu_usage_nsec: u64,
}

impl ServiceStatus {
    /// Coarse lifecycle classification of this report.
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::classify(&self.active_state)
    }
}

/// Mutating lifecycle actions a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    /// Bring the unit up.
    Start,
    /// Take the unit down.
    Stop,
    /// Stop then start the unit.
    Restart,
}

impl ControlAction {
    /// The verb used in endpoint paths and operator-facing text.
    pub fn verb(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Coarse lifecycle state driving which actions are offered.
///
/// `Transitioning` never comes from classification; it is overlaid by the
/// action coordinator while a mutation it issued is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// The unit is running.
    Active,
    /// The unit is stopped or has failed.
    Inactive,
    /// A lifecycle action is in flight.
    Transitioning,
    /// No status available, or an unrecognized state string.
    Unknown,
}

impl LifecycleState {
    /// Classify a raw `active_state` string. Never yields `Transitioning`.
    pub fn classify(active_state: &str) -> Self {
        match active_state {
            "active" => LifecycleState::Active,
            "inactive" | "failed" => LifecycleState::Inactive,
            _ => LifecycleState::Unknown,
        }
    }

    /// Whether `action` may be dispatched from this state.
    ///
    /// Nothing is permitted while transitioning. Unknown permits only a
    /// start attempt.
    pub fn permits(self, action: ControlAction) -> bool {
        match (self, action) {
            (LifecycleState::Transitioning, _) => false,
            (LifecycleState::Active, ControlAction::Stop | ControlAction::Restart) => true,
            (LifecycleState::Inactive, ControlAction::Start | ControlAction::Restart) => true,
            (LifecycleState::Unknown, ControlAction::Start) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Transitioning => "transitioning",
            LifecycleState::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(active_state: &str) -> ServiceStatus {
        ServiceStatus {
            active_state: active_state.to_string(),
            sub_state: "running".to_string(),
            load_state: "loaded".to_string(),
            description: "demo unit".to_string(),
            main_pid: 4321,
            memory_current: 1024,
            cpu_usage_nsec: 5_000_000,
        }
    }

    #[test]
    fn serde_uses_the_wire_field_names() {
        let value = serde_json::to_value(status("active")).expect("serialize");
        let object = value.as_object().expect("object");
        for key in [
            "activeState",
            "subState",
            "loadState",
            "description",
            "mainPID",
            "memoryCurrent",
            "cpuUsageNSec",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
    }

    #[test]
    fn classification_covers_the_open_state_set() {
        assert_eq!(LifecycleState::classify("active"), LifecycleState::Active);
        assert_eq!(LifecycleState::classify("inactive"), LifecycleState::Inactive);
        assert_eq!(LifecycleState::classify("failed"), LifecycleState::Inactive);
        assert_eq!(
            LifecycleState::classify("activating"),
            LifecycleState::Unknown
        );
        assert_eq!(
            LifecycleState::classify("deactivating"),
            LifecycleState::Unknown
        );
        assert_eq!(LifecycleState::classify(""), LifecycleState::Unknown);
    }

    #[test]
    fn active_permits_stop_and_restart_only() {
        let state = LifecycleState::Active;
        assert!(!state.permits(ControlAction::Start));
        assert!(state.permits(ControlAction::Stop));
        assert!(state.permits(ControlAction::Restart));
    }

    #[test]
    fn inactive_permits_start_and_restart_only() {
        let state = LifecycleState::Inactive;
        assert!(state.permits(ControlAction::Start));
        assert!(!state.permits(ControlAction::Stop));
        assert!(state.permits(ControlAction::Restart));
    }

    #[test]
    fn unknown_permits_start_only() {
        let state = LifecycleState::Unknown;
        assert!(state.permits(ControlAction::Start));
        assert!(!state.permits(ControlAction::Stop));
        assert!(!state.permits(ControlAction::Restart));
    }

    #[test]
    fn transitioning_permits_nothing() {
        let state = LifecycleState::Transitioning;
        for action in [
            ControlAction::Start,
            ControlAction::Stop,
            ControlAction::Restart,
        ] {
            assert!(!state.permits(action), "{action} permitted while transitioning");
        }
    }

    #[test]
    fn status_lifecycle_follows_active_state() {
        assert_eq!(status("active").lifecycle(), LifecycleState::Active);
        assert_eq!(status("failed").lifecycle(), LifecycleState::Inactive);
        assert_eq!(status("reloading").lifecycle(), LifecycleState::Unknown);
    }
}
