//! ---
//! culvert_section: "02-control-client"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "Log session merging seeded history with the live stream."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::sync::Arc;

use culvert_proto::LogEntry;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, warn};

use crate::client::ControlClient;
use crate::error::TransportError;

const APPEND_CHANNEL_CAPACITY: usize = 256;

/// Connection state of the live stream. Terminal once `Disconnected`; the
/// session never reconnects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The WebSocket handshake is underway.
    Connecting,
    /// Live lines are flowing.
    Connected,
    /// The stream ended or failed; open a new session to resume.
    Disconnected,
}

/// One log view: history seeded once, then live lines appended in arrival
/// order.
///
/// The historical fetch and the stream attach are not fenced against each
/// other, so a line emitted right at the boundary can be duplicated or
/// dropped. Consumers treat the merged sequence as display text, not as an
/// exact record.
pub struct LogSession {
    lines: Arc<Mutex<Vec<String>>>,
    appended: broadcast::Sender<String>,
    state: watch::Receiver<StreamState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LogSession {
    /// Seed history from the agent and attach the live stream.
    ///
    /// A failed historical fetch seeds nothing but never blocks the session;
    /// the stream is attached regardless.
    pub async fn open(client: &ControlClient) -> Result<Self, TransportError> {
        let mut seeded = Vec::new();
        match client.recent_logs().await {
            Ok(envelope) if envelope.success => {
                seeded = envelope
                    .data
                    .unwrap_or_default()
                    .iter()
                    .map(LogEntry::display_line)
                    .collect();
            }
            Ok(envelope) => {
                warn!(error = %envelope.error_text(), "historical log fetch rejected");
            }
            Err(err) => {
                warn!(error = %err, "historical log fetch failed");
            }
        }

        let url = client.log_stream_url()?;
        let lines = Arc::new(Mutex::new(seeded));
        let (appended, _) = broadcast::channel(APPEND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(stream_task(
            url.into(),
            lines.clone(),
            appended.clone(),
            state_tx,
            shutdown_rx,
        ));

        Ok(Self {
            lines,
            appended,
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Snapshot of the merged line sequence.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Receive lines appended after this call.
    pub fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        self.appended.subscribe()
    }

    /// Current connection state.
    pub fn connection(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Empty the visible sequence. The connection is untouched; lines
    /// arriving afterwards append to the now-empty sequence.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Close the stream and wait for the task to exit.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn stream_task(
    url: String,
    lines: Arc<Mutex<Vec<String>>>,
    appended: broadcast::Sender<String>,
    state_tx: watch::Sender<StreamState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(err) => {
            warn!(error = %err, "log stream connect failed");
            let _ = state_tx.send(StreamState::Disconnected);
            return;
        }
    };
    let _ = state_tx.send(StreamState::Connected);
    debug!(url = %url, "log stream connected");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = socket.close(None).await;
                break;
            }
            message = socket.next() => {
                match message {
                    Some(Ok(WsMessage::Text(line))) => {
                        lines.lock().push(line.clone());
                        let _ = appended.send(line);
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if socket.send(WsMessage::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("log stream closed by agent");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "log stream failed");
                        break;
                    }
                }
            }
        }
    }

    let _ = state_tx.send(StreamState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::Utc;
    use culvert_proto::ApiResponse;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[derive(Clone)]
    struct StubState {
        live: broadcast::Sender<String>,
        hangup: broadcast::Sender<()>,
        history_available: bool,
    }

    async fn recent_route(State(state): State<StubState>) -> axum::response::Response {
        if !state.history_available {
            return (StatusCode::INTERNAL_SERVER_ERROR, "journal offline").into_response();
        }
        let entries = vec![
            LogEntry::new(Utc::now(), "first historical", "info"),
            LogEntry::new(Utc::now(), "second historical", "info"),
        ];
        Json(ApiResponse::ok(entries)).into_response()
    }

    async fn logs_ws_route(
        ws: WebSocketUpgrade,
        State(state): State<StubState>,
    ) -> axum::response::Response {
        // Subscribe before the handshake response so sends right after the
        // client observes Connected cannot miss the receiver.
        let live = state.live.subscribe();
        let hangup = state.hangup.subscribe();
        ws.on_upgrade(move |socket| feed_client(socket, live, hangup))
    }

    async fn feed_client(
        mut socket: WebSocket,
        mut live: broadcast::Receiver<String>,
        mut hangup: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                line = live.recv() => {
                    let Ok(line) = line else { break };
                    if socket.send(Message::Text(line)).await.is_err() {
                        break;
                    }
                }
                _ = hangup.recv() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    async fn spawn_stub(history_available: bool) -> (SocketAddr, StubState) {
        let state = StubState {
            live: broadcast::channel(64).0,
            hangup: broadcast::channel(4).0,
            history_available,
        };
        let router = Router::new()
            .route("/api/service/logs/recent", get(recent_route))
            .route("/api/service/logs", get(logs_ws_route))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, state)
    }

    async fn wait_for(session: &LogSession, wanted: StreamState) {
        let mut rx = session.watch_connection();
        timeout(Duration::from_secs(2), async {
            while *rx.borrow() != wanted {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("stream never reached {wanted:?}"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn history_seeds_before_live_lines_append() {
        let (addr, stub) = spawn_stub(true).await;
        let client = ControlClient::new(&format!("http://{addr}")).unwrap();

        let session = LogSession::open(&client).await.unwrap();
        let seeded = session.lines();
        assert_eq!(seeded.len(), 2);
        assert!(seeded[0].ends_with("first historical"));

        wait_for(&session, StreamState::Connected).await;
        let mut incoming = session.subscribe_lines();
        stub.live.send("[2024-01-01 00:00:00] live one".to_string()).unwrap();

        let line = timeout(Duration::from_secs(2), incoming.recv())
            .await
            .expect("live line")
            .unwrap();
        assert_eq!(line, "[2024-01-01 00:00:00] live one");

        let merged = session.lines();
        assert_eq!(merged.len(), 3);
        assert!(merged[2].ends_with("live one"));
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_the_view_but_keeps_streaming() {
        let (addr, stub) = spawn_stub(true).await;
        let client = ControlClient::new(&format!("http://{addr}")).unwrap();

        let session = LogSession::open(&client).await.unwrap();
        wait_for(&session, StreamState::Connected).await;

        session.clear();
        assert!(session.lines().is_empty());
        assert_eq!(session.connection(), StreamState::Connected);

        let mut incoming = session.subscribe_lines();
        stub.live.send("[2024-01-01 00:00:01] after clear".to_string()).unwrap();
        timeout(Duration::from_secs(2), incoming.recv())
            .await
            .expect("line after clear")
            .unwrap();
        assert_eq!(session.lines().len(), 1);
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn agent_hangup_is_terminal() {
        let (addr, stub) = spawn_stub(true).await;
        let client = ControlClient::new(&format!("http://{addr}")).unwrap();

        let session = LogSession::open(&client).await.unwrap();
        wait_for(&session, StreamState::Connected).await;

        stub.hangup.send(()).unwrap();
        wait_for(&session, StreamState::Disconnected).await;

        // No reconnect: lines retained, state stays terminal.
        assert_eq!(session.lines().len(), 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.connection(), StreamState::Disconnected);
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_history_fetch_does_not_block_the_stream() {
        let (addr, stub) = spawn_stub(false).await;
        let client = ControlClient::new(&format!("http://{addr}")).unwrap();

        let session = LogSession::open(&client).await.unwrap();
        assert!(session.lines().is_empty());
        wait_for(&session, StreamState::Connected).await;

        let mut incoming = session.subscribe_lines();
        stub.live.send("[2024-01-01 00:00:02] still live".to_string()).unwrap();
        timeout(Duration::from_secs(2), incoming.recv())
            .await
            .expect("live line")
            .unwrap();
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_stream_goes_straight_to_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ControlClient::new(&format!("http://{addr}")).unwrap();

        let session = LogSession::open(&client).await.unwrap();
        wait_for(&session, StreamState::Disconnected).await;
        assert!(session.lines().is_empty());
        session.close().await;
    }
}
