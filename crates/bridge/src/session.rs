//! Bridge session actor
//!
//! One [`SessionActor`] task owns everything mutable about a run's bridge:
//! the lifecycle state, the single app connection, and the map of pending
//! requests. Connection handlers and capture callers only talk to it through
//! its mailbox, so the receive path and the submit path never share a lock.
//!
//! Lifecycle:
//!
//! ```text
//! Listening -> Connected -> Active -> Closing -> Closed
//!                  \           \
//!                   +-----------+--> Broken (app disconnected; terminal until close)
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Request, Response};

/// Bridge session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the app client
    Listening,
    /// App client attached, nothing exchanged yet
    Connected,
    /// At least one request sent to the app
    Active,
    /// App client went away; every request fails
    Broken,
    Closing,
    Closed,
}

impl SessionState {
    fn has_client(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Active)
    }
}

type Reply = oneshot::Sender<BridgeResult<Vec<u8>>>;

enum SessionMsg {
    Attach {
        outbound: mpsc::UnboundedSender<String>,
        reply: oneshot::Sender<Option<u64>>,
    },
    Detach {
        conn_id: u64,
    },
    Incoming {
        conn_id: u64,
        raw: String,
    },
    Submit {
        request: Request,
        reply: Reply,
    },
    Cancel {
        id: String,
    },
    Shutdown,
}

struct SessionActor {
    state: SessionState,
    conn: Option<(u64, mpsc::UnboundedSender<String>)>,
    next_conn_id: u64,
    pending: HashMap<String, Reply>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        while let Some(msg) = rx.recv().await {
            if !self.handle(msg) {
                break;
            }
        }
        if self.state != SessionState::Closed {
            self.close();
        }
        debug!("[OWL - Bridge] session actor stopped");
    }

    /// Returns false once the session is closed
    fn handle(&mut self, msg: SessionMsg) -> bool {
        match msg {
            SessionMsg::Attach { outbound, reply } => {
                let _ = reply.send(self.attach(outbound));
            }
            SessionMsg::Detach { conn_id } => self.detach(conn_id),
            SessionMsg::Incoming { conn_id, raw } => self.incoming(conn_id, &raw),
            SessionMsg::Submit { request, reply } => self.submit(request, reply),
            SessionMsg::Cancel { id } => {
                if self.pending.remove(&id).is_some() {
                    debug!("[OWL - Bridge] dropped timed out request {}", id);
                }
            }
            SessionMsg::Shutdown => {
                self.close();
                return false;
            }
        }
        true
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("[OWL - Bridge] session {:?} -> {:?}", self.state, state);
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn attach(&mut self, outbound: mpsc::UnboundedSender<String>) -> Option<u64> {
        if self.state != SessionState::Listening {
            warn!(
                "[OWL - Bridge] rejecting app client: session is {:?}",
                self.state
            );
            return None;
        }

        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        self.conn = Some((conn_id, outbound));
        self.set_state(SessionState::Connected);
        info!("[OWL - Bridge] app client connected");
        Some(conn_id)
    }

    fn detach(&mut self, conn_id: u64) {
        match &self.conn {
            Some((current, _)) if *current == conn_id => {}
            _ => return,
        }

        self.conn = None;
        if self.state.has_client() {
            warn!("[OWL - Bridge] app client disconnected");
            self.set_state(SessionState::Broken);
        }
        self.fail_pending(|| BridgeError::ConnectionLost("app client disconnected".into()));
    }

    fn incoming(&mut self, conn_id: u64, raw: &str) {
        if !matches!(&self.conn, Some((current, _)) if *current == conn_id) {
            debug!("[OWL - Bridge] ignoring message from stale connection {}", conn_id);
            return;
        }

        let response: Response = match serde_json::from_str(raw) {
            Ok(response) => response,
            Err(e) => {
                warn!("[OWL - Bridge] dropping malformed message: {}", e);
                return;
            }
        };

        match self.pending.remove(&response.id) {
            Some(reply) => {
                debug!("[OWL - Bridge] response for {}", response.id);
                // The caller may have timed out in the meantime
                let _ = reply.send(response.into_result());
            }
            None => warn!(
                "[OWL - Bridge] dropping response with unknown or duplicate id {}",
                response.id
            ),
        }
    }

    fn submit(&mut self, request: Request, reply: Reply) {
        let result = match self.state {
            SessionState::Listening => Err(BridgeError::ConnectionLost(
                "no app client connected".into(),
            )),
            SessionState::Broken => Err(BridgeError::ConnectionLost(
                "app client disconnected".into(),
            )),
            SessionState::Closing | SessionState::Closed => Err(BridgeError::Closed),
            SessionState::Connected | SessionState::Active => self.send(&request),
        };

        match result {
            Ok(()) => {
                self.pending.insert(request.id, reply);
                self.set_state(SessionState::Active);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn send(&mut self, request: &Request) -> BridgeResult<()> {
        if self.pending.contains_key(&request.id) {
            return Err(BridgeError::DuplicateRequest(request.id.clone()));
        }

        let text = serde_json::to_string(request)?;
        let sent = self
            .conn
            .as_ref()
            .map(|(_, outbound)| outbound.send(text).is_ok())
            .unwrap_or(false);

        if sent {
            debug!("[OWL - Bridge] sent {:?} {}", request.command, request.id);
            Ok(())
        } else {
            Err(BridgeError::ConnectionLost("app client disconnected".into()))
        }
    }

    fn fail_pending(&mut self, error: impl Fn() -> BridgeError) {
        for (id, reply) in self.pending.drain() {
            debug!("[OWL - Bridge] failing pending request {}", id);
            let _ = reply.send(Err(error()));
        }
    }

    fn close(&mut self) {
        self.set_state(SessionState::Closing);
        self.fail_pending(|| BridgeError::Closed);
        // Dropping the sender ends the connection's writer and closes the socket
        self.conn = None;
        self.set_state(SessionState::Closed);
    }
}

/// Cloneable handle to a session actor
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
    state_rx: watch::Receiver<SessionState>,
    request_seq: Arc<AtomicU64>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl SessionHandle {
    /// Spawn a new session actor on the current runtime
    pub fn spawn(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Listening);

        let actor = SessionActor {
            state: SessionState::Listening,
            conn: None,
            next_conn_id: 0,
            pending: HashMap::new(),
            state_tx,
        };
        tokio::spawn(actor.run(rx));

        Self {
            tx,
            state_rx,
            request_seq: Arc::new(AtomicU64::new(0)),
            connect_timeout,
            request_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Register an app connection. `None` means the session refused it.
    pub async fn attach(&self, outbound: mpsc::UnboundedSender<String>) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionMsg::Attach { outbound, reply }).ok()?;
        rx.await.ok().flatten()
    }

    pub fn detach(&self, conn_id: u64) {
        let _ = self.tx.send(SessionMsg::Detach { conn_id });
    }

    /// Feed a raw frame received from the app connection
    pub fn on_message(&self, conn_id: u64, raw: String) {
        let _ = self.tx.send(SessionMsg::Incoming { conn_id, raw });
    }

    /// Send a request and wait for the matching response, bounded by the
    /// request timeout.
    pub async fn submit(&self, request: Request) -> BridgeResult<Vec<u8>> {
        let id = request.id.clone();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMsg::Submit { request, reply })
            .map_err(|_| BridgeError::Closed)?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                let _ = self.tx.send(SessionMsg::Cancel { id: id.clone() });
                Err(BridgeError::Timeout {
                    id,
                    after_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Ask the app for a screenshot. Waits up to the connect timeout for the
    /// app client if it has not attached yet.
    pub async fn capture(&self, name: &str) -> BridgeResult<Vec<u8>> {
        self.wait_for_client().await?;

        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}", seq, uuid::Uuid::new_v4());
        info!("[OWL - Bridge] capturing screenshot '{}'", name);
        self.submit(Request::capture(id, name)).await
    }

    async fn wait_for_client(&self) -> BridgeResult<()> {
        let mut state_rx = self.state_rx.clone();
        let waited = tokio::time::timeout(
            self.connect_timeout,
            state_rx.wait_for(|state| *state != SessionState::Listening),
        )
        .await;

        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => Err(BridgeError::ConnectionLost(format!(
                "no app client connected within {} ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }

    /// Fail everything pending and refuse further work. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionMsg::Shutdown);
    }
}
