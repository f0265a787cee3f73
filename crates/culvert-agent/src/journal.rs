//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Journald export parsing and the live log follower."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::process::Stdio;

use chrono::DateTime;
use culvert_proto::LogEntry;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Fan-out of live log lines to WebSocket subscribers.
///
/// Slow subscribers lag and drop lines rather than backpressure the
/// follower.
#[derive(Clone)]
pub struct LogBroadcaster {
    tx: broadcast::Sender<String>,
}

impl LogBroadcaster {
    /// Create a broadcaster holding up to `capacity` undelivered lines per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish one display line. Returns how many subscribers received it.
    pub fn send(&self, line: String) -> usize {
        self.tx.send(line).unwrap_or(0)
    }

    /// Subscribe to lines published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// Handle to the running journald follower task.
pub struct JournalFollower {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JournalFollower {
    /// Stop following and wait for the task (and child process) to wind
    /// down.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Follow the journal of `unit` from its tail, publishing each new entry as
/// a display line.
///
/// The follower starts at the tail: history is served by the recent-logs
/// endpoint, the stream carries only lines emitted after attach. The task
/// ends if journalctl exits; it is not restarted.
pub fn spawn_journal_follower(unit: String, broadcaster: LogBroadcaster) -> JournalFollower {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut child = match Command::new("journalctl")
            .args(["-u", &unit, "-f", "-n", "0", "-o", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                error!(unit = %unit, error = %err, "failed to spawn journal follower");
                return;
            }
        };
        let Some(stdout) = child.stdout.take() else {
            error!(unit = %unit, "journal follower has no stdout");
            return;
        };
        let mut lines = BufReader::new(stdout).lines();
        debug!(unit = %unit, "journal follower attached");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let _ = child.kill().await;
                    break;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(raw)) => {
                            if let Some(entry) = parse_journal_line(&raw) {
                                broadcaster.send(entry.display_line());
                            }
                        }
                        Ok(None) => {
                            warn!(unit = %unit, "journal follower stream ended");
                            break;
                        }
                        Err(err) => {
                            warn!(unit = %unit, error = %err, "journal follower read failed");
                            break;
                        }
                    }
                }
            }
        }
    });

    JournalFollower {
        shutdown: shutdown_tx,
        task,
    }
}

/// Parse a whole `journalctl -o json` export, skipping unusable entries.
pub(crate) fn parse_journal_stream(output: &str) -> Vec<LogEntry> {
    output.lines().filter_map(parse_journal_line).collect()
}

/// Parse one journald JSON export line. Entries without a textual message
/// are skipped, as are lines that are not JSON objects.
pub(crate) fn parse_journal_line(line: &str) -> Option<LogEntry> {
    let value: Value = serde_json::from_str(line).ok()?;
    // Binary payloads export MESSAGE as a byte array; only text is useful
    // here.
    let message = value.get("MESSAGE")?.as_str()?;
    if message.is_empty() {
        return None;
    }

    let micros: i64 = value
        .get("__REALTIME_TIMESTAMP")?
        .as_str()?
        .parse()
        .ok()?;
    let timestamp = DateTime::from_timestamp_micros(micros)?;

    let priority = value
        .get("PRIORITY")
        .and_then(Value::as_str)
        .map(priority_name)
        .unwrap_or("info");

    Some(LogEntry::new(timestamp, message, priority))
}

/// Map a journald numeric priority onto its syslog level name.
fn priority_name(raw: &str) -> &str {
    match raw {
        "0" => "emerg",
        "1" => "alert",
        "2" => "crit",
        "3" => "err",
        "4" => "warning",
        "5" => "notice",
        "6" => "info",
        "7" => "debug",
        other => other,
    }
}
