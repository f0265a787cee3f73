//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Polling status cache with an explicit invalidation channel."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use culvert_proto::{LifecycleState, ServiceStatus};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::client::ControlClient;

/// Poll cadence while a status consumer is attached.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Latest status knowledge published by the cache.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Most recent successfully fetched status. Retained across failed
    /// refreshes so a blip does not blank the display.
    pub status: Option<ServiceStatus>,
    /// When `status` was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Error text of the most recent refresh, if it failed.
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Lifecycle classification of the held status; `Unknown` before the
    /// first successful fetch.
    pub fn lifecycle(&self) -> LifecycleState {
        self.status
            .as_ref()
            .map(ServiceStatus::lifecycle)
            .unwrap_or(LifecycleState::Unknown)
    }
}

/// Cloneable handle mutation paths use to force an immediate refresh.
#[derive(Clone)]
pub struct CacheInvalidator {
    notify: Arc<Notify>,
}

impl CacheInvalidator {
    /// Mark the cached status stale. The cache refreshes immediately instead
    /// of waiting out the interval; a signal arriving mid-refresh is held
    /// and serviced right after, never lost.
    pub fn invalidate(&self) {
        self.notify.notify_one();
    }
}

/// Single background task polling the agent and publishing snapshots.
///
/// Refreshes are awaited inline in the task loop, so polls never overlap;
/// ticks that fire while a refresh is still running are skipped.
pub struct StatusCache {
    snapshot: watch::Receiver<StatusSnapshot>,
    notify: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StatusCache {
    /// Spawn the cache task with the default poll interval.
    pub fn spawn(client: Arc<ControlClient>) -> Self {
        Self::spawn_with_interval(client, DEFAULT_POLL_INTERVAL)
    }

    /// Spawn the cache task polling every `poll_interval`. The first refresh
    /// runs immediately.
    pub fn spawn_with_interval(client: Arc<ControlClient>, poll_interval: Duration) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());
        let notify = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task_notify = notify.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("status cache shutdown received");
                        break;
                    }
                    _ = ticker.tick() => {
                        refresh(&client, &snapshot_tx).await;
                    }
                    _ = task_notify.notified() => {
                        refresh(&client, &snapshot_tx).await;
                        // The forced refresh counts as a poll; start the next
                        // full interval from now.
                        ticker.reset();
                    }
                }
            }
        });

        Self {
            snapshot: snapshot_rx,
            notify,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Watch snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Handle for mutation paths to signal staleness.
    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator {
            notify: self.notify.clone(),
        }
    }

    /// Stop the poll task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn refresh(client: &ControlClient, snapshot_tx: &watch::Sender<StatusSnapshot>) {
    let mut next = snapshot_tx.borrow().clone();
    match client.status().await {
        Ok(envelope) if envelope.success => match envelope.data {
            Some(status) => {
                next.status = Some(status);
                next.fetched_at = Some(Utc::now());
                next.last_error = None;
            }
            None => {
                next.last_error = Some("status response carried no data".to_string());
            }
        },
        Ok(envelope) => {
            let error = envelope.error_text().to_string();
            warn!(error = %error, "status refresh rejected by agent");
            next.last_error = Some(error);
        }
        Err(err) => {
            warn!(error = %err, "status refresh failed");
            next.last_error = Some(err.to_string());
        }
    }
    let _ = snapshot_tx.send(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use culvert_proto::ApiResponse;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    #[derive(Clone, Default)]
    struct StubState {
        hits: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        fail_after: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    async fn status_route(State(state): State<StubState>) -> axum::response::Response {
        use axum::response::IntoResponse;

        let running = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = state.delay {
            sleep(delay).await;
        }
        let hit = state.hits.fetch_add(1, Ordering::SeqCst);
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if hit >= state.fail_after.load(Ordering::SeqCst) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ServiceStatus>::failure("probe exploded")),
            )
                .into_response();
        }
        let status = ServiceStatus {
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
            load_state: "loaded".to_string(),
            description: "demo".to_string(),
            main_pid: 7,
            memory_current: 1,
            cpu_usage_nsec: 1,
        };
        Json(ApiResponse::ok(status)).into_response()
    }

    async fn spawn_stub(state: StubState) -> SocketAddr {
        let router = Router::new()
            .route("/api/service/status", get(status_route))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn stub_state() -> StubState {
        StubState {
            fail_after: Arc::new(AtomicUsize::new(usize::MAX)),
            ..StubState::default()
        }
    }

    async fn wait_for_status(cache: &StatusCache) {
        let mut rx = cache.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.borrow().status.is_none() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("first refresh");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn polls_immediately_and_then_on_cadence() {
        let state = stub_state();
        let addr = spawn_stub(state.clone()).await;
        let client = Arc::new(ControlClient::new(&format!("http://{addr}")).unwrap());

        let cache = StatusCache::spawn_with_interval(client, Duration::from_millis(50));
        wait_for_status(&cache).await;
        assert_eq!(cache.snapshot().lifecycle(), LifecycleState::Active);

        sleep(Duration::from_millis(180)).await;
        assert!(state.hits.load(Ordering::SeqCst) >= 3);
        cache.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalidation_forces_an_immediate_refresh() {
        let state = stub_state();
        let addr = spawn_stub(state.clone()).await;
        let client = Arc::new(ControlClient::new(&format!("http://{addr}")).unwrap());

        let cache = StatusCache::spawn_with_interval(client, Duration::from_secs(60));
        wait_for_status(&cache).await;
        let before = state.hits.load(Ordering::SeqCst);

        cache.invalidator().invalidate();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(state.hits.load(Ordering::SeqCst), before + 1);
        cache.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_refresh_keeps_the_previous_status() {
        let state = stub_state();
        state.fail_after.store(1, Ordering::SeqCst);
        let addr = spawn_stub(state.clone()).await;
        let client = Arc::new(ControlClient::new(&format!("http://{addr}")).unwrap());

        let cache = StatusCache::spawn_with_interval(client, Duration::from_secs(60));
        wait_for_status(&cache).await;

        cache.invalidator().invalidate();
        sleep(Duration::from_millis(200)).await;

        let snapshot = cache.snapshot();
        assert!(snapshot.status.is_some(), "stale status retained");
        assert_eq!(snapshot.last_error.as_deref(), Some("probe exploded"));
        cache.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refreshes_never_overlap() {
        let mut state = stub_state();
        state.delay = Some(Duration::from_millis(40));
        let addr = spawn_stub(state.clone()).await;
        let client = Arc::new(ControlClient::new(&format!("http://{addr}")).unwrap());

        let cache = StatusCache::spawn_with_interval(client, Duration::from_millis(10));
        sleep(Duration::from_millis(300)).await;

        assert!(state.hits.load(Ordering::SeqCst) >= 2);
        assert_eq!(state.max_in_flight.load(Ordering::SeqCst), 1);
        cache.shutdown().await;
    }
}
