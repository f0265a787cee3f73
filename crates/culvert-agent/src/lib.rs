//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Agent-side control endpoint: REST + WebSocket over systemd."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---

pub mod api;
pub mod journal;
pub mod manager;
pub mod settings;
pub mod store;
pub mod systemd;

pub use api::{spawn_api_server, ApiServer, ApiState};
pub use journal::{spawn_journal_follower, JournalFollower, LogBroadcaster};
pub use manager::{ManagerError, ServiceManager};
pub use settings::{AgentSettings, SettingsSource};
pub use store::ConfigStore;
pub use systemd::SystemdManager;
