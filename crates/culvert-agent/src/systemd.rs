//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "systemctl/journalctl bridge implementing the service manager seam."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use async_trait::async_trait;
use culvert_proto::{LogEntry, ServiceStatus};
use tokio::process::Command;
use tracing::debug;

use crate::journal::parse_journal_stream;
use crate::manager::{ManagerError, ServiceManager};

const STATUS_PROPERTIES: &str =
    "ActiveState,SubState,LoadState,Description,MainPID,MemoryCurrent,CPUUsageNSec";

/// Service manager backed by the host's systemd via `systemctl` and
/// `journalctl`.
#[derive(Debug, Clone)]
pub struct SystemdManager {
    unit: String,
}

impl SystemdManager {
    /// Manage `unit`, e.g. `cloudflared.service`.
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    /// The managed unit name.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ManagerError> {
        let command = format!("{program} {}", args.join(" "));
        debug!(command = %command, "running service manager helper");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ManagerError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ManagerError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn systemctl(&self, verb: &str) -> Result<(), ManagerError> {
        self.run("systemctl", &[verb, &self.unit]).await.map(|_| ())
    }
}

#[async_trait]
impl ServiceManager for SystemdManager {
    async fn start(&self) -> Result<(), ManagerError> {
        self.systemctl("start").await
    }

    async fn stop(&self) -> Result<(), ManagerError> {
        self.systemctl("stop").await
    }

    async fn restart(&self) -> Result<(), ManagerError> {
        self.systemctl("restart").await
    }

    async fn status(&self) -> Result<ServiceStatus, ManagerError> {
        let output = self
            .run(
                "systemctl",
                &[
                    "show",
                    &self.unit,
                    "--property",
                    STATUS_PROPERTIES,
                    "--no-pager",
                ],
            )
            .await?;
        Ok(parse_show_output(&output))
    }

    async fn recent_logs(&self, count: usize) -> Result<Vec<LogEntry>, ManagerError> {
        let count_arg = count.to_string();
        let output = self
            .run(
                "journalctl",
                &["-u", &self.unit, "-n", &count_arg, "-o", "json", "--no-pager"],
            )
            .await?;
        Ok(parse_journal_stream(&output))
    }
}

fn parse_show_output(output: &str) -> ServiceStatus {
    let mut status = ServiceStatus {
        active_state: String::new(),
        sub_state: String::new(),
        load_state: String::new(),
        description: String::new(),
        main_pid: 0,
        memory_current: 0,
        cpu_usage_nsec: 0,
    };
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "ActiveState" => status.active_state = value.to_string(),
            "SubState" => status.sub_state = value.to_string(),
            "LoadState" => status.load_state = value.to_string(),
            "Description" => status.description = value.to_string(),
            "MainPID" => status.main_pid = value.parse().unwrap_or(0),
            "MemoryCurrent" => status.memory_current = parse_counter(value),
            "CPUUsageNSec" => status.cpu_usage_nsec = parse_counter(value),
            _ => {}
        }
    }
    status
}

// systemd reports unset accounting counters as "[not set]" or as (uint64) -1
// depending on version; both mean "no data".
fn parse_counter(value: &str) -> u64 {
    match value.parse::<u64>() {
        Ok(u64::MAX) => 0,
        Ok(parsed) => parsed,
        Err(_) => 0,
    }
}
