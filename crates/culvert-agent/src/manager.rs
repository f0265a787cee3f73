//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Seam to the host service manager."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use async_trait::async_trait;
use culvert_proto::{LogEntry, ServiceStatus};
use thiserror::Error;

/// Failures bridging to the host service manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The helper binary could not be launched at all.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// The command line that failed to launch.
        command: String,
        /// Underlying launch error.
        #[source]
        source: std::io::Error,
    },
    /// The helper ran and reported failure.
    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed stderr of the helper.
        stderr: String,
    },
}

/// Lifecycle and status operations on the supervised unit.
///
/// `SystemdManager` implements this against the host; tests substitute
/// scripted doubles.
#[async_trait]
pub trait ServiceManager: Send + Sync + 'static {
    /// Bring the unit up.
    async fn start(&self) -> Result<(), ManagerError>;

    /// Take the unit down.
    async fn stop(&self) -> Result<(), ManagerError>;

    /// Stop then start the unit.
    async fn restart(&self) -> Result<(), ManagerError>;

    /// Current status report.
    async fn status(&self) -> Result<ServiceStatus, ManagerError>;

    /// The last `count` journal entries, oldest first.
    async fn recent_logs(&self, count: usize) -> Result<Vec<LogEntry>, ManagerError>;
}
