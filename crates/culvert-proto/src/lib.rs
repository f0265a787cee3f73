//! ---
//! culvert_section: "01-wire-contract"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Types exchanged between the Culvert agent and its clients."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod config;
pub mod envelope;
pub mod logs;
pub mod status;

pub use config::{Config, ConfigError, IngressRule};
pub use envelope::ApiResponse;
pub use logs::LogEntry;
pub use status::{ControlAction, LifecycleState, ServiceStatus};
