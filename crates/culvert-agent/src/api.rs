//! ---
//! culvert_section: "03-agent-surface"
//! culvert_subsection: "module"
//! culvert_type: "source"
//! culvert_scope: "code"
//! culvert_description: "REST and WebSocket control endpoint over the service manager seam."
//! culvert_version: "v0.1.0"
//! culvert_owner: "tbd"
//! ---
use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use culvert_proto::{ApiResponse, Config, LogEntry, ServiceStatus};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::journal::LogBroadcaster;
use crate::manager::ServiceManager;
use crate::store::ConfigStore;

/// Shared state behind every control endpoint handler.
pub struct ApiState {
    manager: Arc<dyn ServiceManager>,
    store: ConfigStore,
    logs: LogBroadcaster,
    recent_log_count: usize,
}

impl ApiState {
    /// Assemble the handler state.
    pub fn new(
        manager: Arc<dyn ServiceManager>,
        store: ConfigStore,
        logs: LogBroadcaster,
        recent_log_count: usize,
    ) -> Self {
        Self {
            manager,
            store,
            logs,
            recent_log_count,
        }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("config_path", &self.store.path())
            .field("recent_log_count", &self.recent_log_count)
            .finish_non_exhaustive()
    }
}

/// Handle to the running control endpoint.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// The address the listener actually bound, port resolved.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Trigger graceful shutdown and wait for in-flight requests to drain.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the control endpoint with optional static asset hosting.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> Result<ApiServer> {
    let api_routes = Router::new()
        .route("/api/service/start", post(start_service))
        .route("/api/service/stop", post(stop_service))
        .route("/api/service/restart", post(restart_service))
        .route("/api/service/status", get(get_status))
        .route("/api/service/logs", get(stream_logs))
        .route("/api/service/logs/recent", get(get_recent_logs))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/health", get(health_check))
        .layer(cors_layer())
        .with_state(state);

    let router = if let Some(dir) = static_dir {
        let service = get_service(ServeDir::new(dir).append_index_html_on_directories(true));
        Router::new()
            .merge(api_routes)
            .fallback_service(service)
            .layer(TraceLayer::new_for_http())
    } else {
        api_routes.layer(TraceLayer::new_for_http())
    };

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind control listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure control listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read control listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "control endpoint listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "control endpoint exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

// Browser dev-server origins of the bundled frontend.
fn cors_layer() -> CorsLayer {
    let origins = [
        HeaderValue::from_static("http://localhost:5173"),
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:5173"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}

/// Failed operation, rendered as the standard envelope with `success`
/// cleared and the user-facing text in `error`.
#[derive(Debug)]
struct ApiFailure {
    status: StatusCode,
    error: String,
}

impl ApiFailure {
    fn internal(err: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.to_string(),
        }
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()>::failure(self.error));
        (self.status, body).into_response()
    }
}

async fn start_service(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    state.manager.start().await.map_err(ApiFailure::internal)?;
    info!("service started");
    Ok(Json(ApiResponse::ok_message("Service started successfully")))
}

async fn stop_service(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    state.manager.stop().await.map_err(ApiFailure::internal)?;
    info!("service stopped");
    Ok(Json(ApiResponse::ok_message("Service stopped successfully")))
}

async fn restart_service(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    state.manager.restart().await.map_err(ApiFailure::internal)?;
    info!("service restarted");
    Ok(Json(ApiResponse::ok_message(
        "Service restarted successfully",
    )))
}

async fn get_status(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<ServiceStatus>>, ApiFailure> {
    let status = state.manager.status().await.map_err(ApiFailure::internal)?;
    Ok(Json(ApiResponse::ok(status)))
}

async fn get_recent_logs(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<Vec<LogEntry>>>, ApiFailure> {
    let entries = state
        .manager
        .recent_logs(state.recent_log_count)
        .await
        .map_err(ApiFailure::internal)?;
    Ok(Json(ApiResponse::ok(entries)))
}

async fn get_config(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ApiResponse<Config>>, ApiFailure> {
    let config = state.store.load().await.map_err(ApiFailure::internal)?;
    Ok(Json(ApiResponse::ok(config)))
}

async fn update_config(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Config>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    let Json(config) = payload.map_err(|_| ApiFailure::bad_request("Invalid JSON"))?;
    config
        .validate()
        .map_err(|err| ApiFailure::bad_request(err.to_string()))?;
    state
        .store
        .save(&config)
        .await
        .map_err(ApiFailure::internal)?;
    Ok(Json(ApiResponse::ok_message(
        "Configuration updated successfully",
    )))
}

async fn health_check() -> Json<ApiResponse<()>> {
    Json(ApiResponse::ok_message("Service is healthy"))
}

/// Upgrade to the raw-text log stream.
///
/// The subscription is taken before the upgrade completes so lines
/// published during the handshake are buffered rather than lost.
async fn stream_logs(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    let lines = state.logs.subscribe();
    ws.on_upgrade(move |socket| client_loop(socket, lines))
}

async fn client_loop(mut socket: WebSocket, mut lines: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            line = lines.recv() => {
                let line = match line {
                    Ok(line) => line,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "log stream client lagged behind; dropping lines");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(Message::Text(line)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // The stream is one-way; inbound frames carry nothing.
                    _ => {}
                }
            }
        }
    }
}
