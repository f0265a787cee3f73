//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "binary"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Operator CLI for interacting with a culvertd endpoint."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use culvert_client::{
    ActionCoordinator, ControlClient, ControlError, LogSession, StatusCache, StatusSnapshot,
    StreamState,
};
use culvert_proto::{ControlAction, ServiceStatus};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

/// Options for the status command.
#[derive(Debug, Args)]
pub struct StatusOptions {
    /// Keep polling and print every update until interrupted.
    #[arg(long)]
    pub watch: bool,
}

/// Options for the logs command.
#[derive(Debug, Args)]
pub struct LogsOptions {
    /// Keep the stream open and print live lines until interrupted.
    #[arg(short, long)]
    pub follow: bool,
}

/// Execute the status command.
pub fn status(base_url: &str, options: StatusOptions) -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let client = Arc::new(ControlClient::new(base_url)?);
        if options.watch {
            return watch_status(client).await;
        }

        let envelope = client.status().await.context("status request failed")?;
        if !envelope.success {
            bail!("agent reported failure: {}", envelope.error_text());
        }
        match envelope.data {
            Some(status) => print_status(&status),
            None => println!("no status data returned"),
        }
        Ok(())
    })
}

async fn watch_status(client: Arc<ControlClient>) -> Result<()> {
    let cache = StatusCache::spawn(client);
    let mut updates = cache.subscribe();
    println!("watching status; press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                println!("{}", snapshot_line(&snapshot));
            }
        }
    }
    cache.shutdown().await;
    Ok(())
}

/// Execute one lifecycle action against the agent.
pub fn control(base_url: &str, action: ControlAction) -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let client = Arc::new(ControlClient::new(base_url)?);
        let cache = StatusCache::spawn(client.clone());
        let coordinator = ActionCoordinator::new(client, &cache);

        // Wait for the initial poll so the permission check runs against a
        // real state rather than the empty placeholder.
        let mut updates = cache.subscribe();
        let _ = updates.changed().await;

        let outcome = coordinator.dispatch(action).await;
        cache.shutdown().await;
        match outcome {
            Ok(message) => {
                println!("{message}");
                Ok(())
            }
            Err(ControlError::NotPermitted { action, state }) => {
                bail!("cannot {action} while the service is {state}")
            }
            Err(err) => Err(err).with_context(|| format!("{action} request failed")),
        }
    })
}

/// Execute the logs command.
pub fn logs(base_url: &str, options: LogsOptions) -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async move {
        let client = ControlClient::new(base_url)?;
        if !options.follow {
            let envelope = client
                .recent_logs()
                .await
                .context("recent logs request failed")?;
            if !envelope.success {
                bail!("agent reported failure: {}", envelope.error_text());
            }
            for entry in envelope.data.unwrap_or_default() {
                println!("{}", entry.display_line());
            }
            return Ok(());
        }

        let session = LogSession::open(&client)
            .await
            .context("failed to open the log stream")?;
        let mut live = session.subscribe_lines();
        for line in session.lines() {
            println!("{line}");
        }

        let mut connection = session.watch_connection();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                line = live.recv() => match line {
                    Ok(line) => println!("{line}"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("output fell behind; {skipped} lines dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *connection.borrow_and_update() == StreamState::Disconnected {
                        eprintln!("log stream disconnected");
                        break;
                    }
                }
            }
        }
        while let Ok(line) = live.try_recv() {
            println!("{line}");
        }
        session.close().await;
        Ok(())
    })
}

fn print_status(status: &ServiceStatus) {
    println!("State: {} ({})", status.active_state, status.sub_state);
    println!("Loaded: {}", status.load_state);
    if !status.description.is_empty() {
        println!("Description: {}", status.description);
    }
    if status.main_pid != 0 {
        println!("Main PID: {}", status.main_pid);
    }
    if status.memory_current != 0 {
        println!("Memory: {}", format_memory(status.memory_current));
    }
    if status.cpu_usage_nsec != 0 {
        println!("CPU: {}", format_cpu(status.cpu_usage_nsec));
    }
}

fn snapshot_line(snapshot: &StatusSnapshot) -> String {
    let stamp = snapshot
        .fetched_at
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let mut line = match &snapshot.status {
        Some(status) => format!(
            "[{stamp}] {} ({}/{})",
            snapshot.lifecycle(),
            status.active_state,
            status.sub_state
        ),
        None => format!("[{stamp}] {}", snapshot.lifecycle()),
    };
    if let Some(err) = &snapshot.last_error {
        line.push_str(&format!(" [stale: {err}]"));
    }
    line
}

fn format_memory(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}

fn format_cpu(nanoseconds: u64) -> String {
    format!("{:.3}s", nanoseconds as f64 / 1_000_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use culvert_proto::LifecycleState;

    fn sample_status() -> ServiceStatus {
        ServiceStatus {
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
            load_state: "loaded".to_string(),
            description: "demo".to_string(),
            main_pid: 7,
            memory_current: 10 * 1024 * 1024,
            cpu_usage_nsec: 1_234_000_000,
        }
    }

    #[test]
    fn memory_and_cpu_render_in_operator_units() {
        assert_eq!(format_memory(10 * 1024 * 1024), "10.0 MiB");
        assert_eq!(format_cpu(1_234_000_000), "1.234s");
    }

    #[test]
    fn snapshot_line_carries_state_and_staleness() {
        let healthy = StatusSnapshot {
            status: Some(sample_status()),
            fetched_at: None,
            last_error: None,
        };
        let line = snapshot_line(&healthy);
        assert!(line.contains("active (active/running)"));
        assert!(line.starts_with("[--:--:--]"));

        let stale = StatusSnapshot {
            status: Some(sample_status()),
            fetched_at: None,
            last_error: Some("connection refused".to_string()),
        };
        assert!(snapshot_line(&stale).contains("[stale: connection refused]"));

        let empty = StatusSnapshot::default();
        assert_eq!(snapshot_line(&empty), format!("[--:--:--] {}", LifecycleState::Unknown));
    }
}
