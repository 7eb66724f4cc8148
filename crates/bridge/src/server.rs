//! Bridge HTTP/WebSocket server
//!
//! Routes:
//! - `GET  /app`               WebSocket endpoint for the in-app client
//! - `GET  /health`            session state
//! - `POST /capture/:name`     capture a screenshot, respond with the PNG
//! - `POST /screenshot/:name`  capture, store and compare against the baseline

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use owl_common::BridgeSettings;

use crate::connection::handle_app_socket;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{SessionHandle, SessionState};
use crate::visual::{validate_name, ScreenshotReport, ScreenshotStore};

/// How long `stop` waits for the listener task before abandoning it
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Bridge server configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Local port; 0 picks a free one
    pub port: u16,
    /// How long a capture waits for the app client to attach
    pub connect_timeout: Duration,
    /// How long a capture waits for the app's response
    pub request_timeout: Duration,
    /// Enables `POST /screenshot/:name`
    pub store: Option<ScreenshotStore>,
}

impl BridgeConfig {
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            port: settings.port,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            store: None,
        }
    }

    pub fn with_store(mut self, store: ScreenshotStore) -> Self {
        self.store = Some(store);
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

#[derive(Clone)]
struct AppState {
    session: SessionHandle,
    store: Option<Arc<ScreenshotStore>>,
}

/// Entry point for starting a bridge
pub struct BridgeServer;

impl BridgeServer {
    /// Bind the port and start serving in the background
    pub async fn start(config: BridgeConfig) -> BridgeResult<BridgeHandle> {
        let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
        let addr = listener.local_addr()?;

        let session = SessionHandle::spawn(config.connect_timeout, config.request_timeout);
        let state = AppState {
            session: session.clone(),
            store: config.store.map(Arc::new),
        };

        let app = Router::new()
            .route("/app", get(app_socket_handler))
            .route("/health", get(health_handler))
            .route("/capture/:name", post(capture_handler))
            .route("/screenshot/:name", post(screenshot_handler))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("[OWL - Bridge] server error: {}", e);
            }
        });

        info!("[OWL - Bridge] listening on {}", addr);

        Ok(BridgeHandle {
            addr,
            session,
            shutdown: Mutex::new(Some((shutdown_tx, task))),
        })
    }
}

/// A running bridge. Dropping it stops the server without waiting.
pub struct BridgeHandle {
    addr: SocketAddr,
    session: SessionHandle,
    shutdown: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl BridgeHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL handed to the test runner
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    /// Stop the server and fail any pending request. Calling it again is a
    /// no-op.
    pub async fn stop(&self) {
        let Some((shutdown_tx, mut task)) = self.shutdown.lock().take() else {
            debug!("[OWL - Bridge] already stopped");
            return;
        };

        self.session.shutdown();
        let _ = shutdown_tx.send(());

        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            warn!("[OWL - Bridge] server did not stop in time, aborting");
            task.abort();
        }
        info!("[OWL - Bridge] stopped");
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if let Some((shutdown_tx, task)) = self.shutdown.lock().take() {
            self.session.shutdown();
            let _ = shutdown_tx.send(());
            task.abort();
        }
    }
}

async fn app_socket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_app_socket(socket, state.session))
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "session": state.session.state(),
        "version": owl_common::VERSION,
    }))
}

async fn capture_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> BridgeResult<Response> {
    let png = state.session.capture(&name).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn screenshot_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> BridgeResult<Json<ScreenshotReport>> {
    let store = state
        .store
        .clone()
        .ok_or_else(|| BridgeError::Protocol("screenshot storage is not configured".into()))?;
    validate_name(&name)?;

    let png = state.session.capture(&name).await?;
    let report = tokio::task::spawn_blocking(move || store.record(&name, &png))
        .await
        .map_err(|e| BridgeError::Io(std::io::Error::other(e)))??;

    Ok(Json(report))
}
