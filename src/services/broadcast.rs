//! Leader broadcast server
//!
//! Answers follower polls with the leader's current targeting parameters.
//! The HTTP listener runs on its own task once started; `service_once`
//! is what the server task calls each round to publish fresh parameters.

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::NetworkActivityObject;
use crate::error::{FollowerError, Result};
use crate::settings::SharedSettings;

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Leader-side server collaborator driven by the role controller and the server task
#[async_trait]
pub trait RoleServer: Send {
    /// Begin accepting requests. Starting a running server is a no-op.
    async fn start(&mut self) -> Result<()>;

    /// Stop accepting requests. Stopping a stopped server is a no-op.
    async fn stop(&mut self);

    /// One servicing round; returns requests answered since the previous round.
    /// Must return promptly.
    async fn service_once(&mut self) -> u64;

    fn is_running(&self) -> bool;
}

/// State shared with the HTTP handlers
#[derive(Debug, Default)]
pub struct BroadcastState {
    /// `None` while propagation is paused or the server is stopped
    payload: RwLock<Option<NetworkActivityObject>>,
    served: AtomicU64,
    served_total: AtomicU64,
}

impl BroadcastState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, payload: Option<NetworkActivityObject>) {
        *self.payload.write().unwrap_or_else(|p| p.into_inner()) = payload;
    }

    pub fn current(&self) -> Option<NetworkActivityObject> {
        self.payload
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn record_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
        self.served_total.fetch_add(1, Ordering::Relaxed);
    }

    fn take_served(&self) -> u64 {
        self.served.swap(0, Ordering::Relaxed)
    }

    pub fn served_total(&self) -> u64 {
        self.served_total.load(Ordering::Relaxed)
    }
}

/// Routes answered by the broadcast server
pub fn router(state: Arc<BroadcastState>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/status", get(status_handler))
        .route("/healthz", get(liveness_handler))
        .with_state(state)
}

async fn status_handler(State(state): State<Arc<BroadcastState>>) -> impl IntoResponse {
    state.record_served();
    match state.current() {
        Some(payload) => (StatusCode::OK, Json(payload)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

struct RunningServer {
    local_addr: SocketAddr,
    started_at: DateTime<Utc>,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// axum-backed [`RoleServer`]
pub struct BroadcastServer {
    settings: SharedSettings,
    bind_addr: String,
    state: Arc<BroadcastState>,
    running: Option<RunningServer>,
}

impl BroadcastServer {
    pub fn new(settings: SharedSettings, bind_address: &str, port: u16) -> Self {
        Self {
            settings,
            bind_addr: format!("{}:{}", bind_address, port),
            state: Arc::new(BroadcastState::new()),
            running: None,
        }
    }

    /// Address actually bound, available while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn state(&self) -> Arc<BroadcastState> {
        Arc::clone(&self.state)
    }

    fn publish_from_settings(&self) {
        let payload = {
            let settings = self.settings.read();
            settings
                .propagate_working
                .then(|| settings.broadcast_payload())
        };
        self.state.publish(payload);
    }
}

#[async_trait]
impl RoleServer for BroadcastServer {
    async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            trace!("Broadcast server already running");
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| FollowerError::Server(format!("bind {}: {}", self.bind_addr, e)))?;
        let local_addr = listener.local_addr()?;

        self.publish_from_settings();

        let app = router(Arc::clone(&self.state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!("Broadcast server error: {}", e);
            }
        });

        info!("Broadcast server listening on {}", local_addr);
        self.running = Some(RunningServer {
            local_addr,
            started_at: Utc::now(),
            shutdown_tx,
            join,
        });
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(());
        let mut join = running.join;
        if tokio::time::timeout(STOP_TIMEOUT, &mut join).await.is_err() {
            warn!("Broadcast server did not drain within {:?}, aborting", STOP_TIMEOUT);
            join.abort();
        }
        self.state.publish(None);

        let uptime = (Utc::now() - running.started_at).num_seconds();
        info!(
            "Broadcast server on {} stopped after {}s ({} requests served)",
            running.local_addr,
            uptime,
            self.state.served_total()
        );
    }

    async fn service_once(&mut self) -> u64 {
        if self.running.is_none() {
            return 0;
        }
        self.publish_from_settings();
        let served = self.state.take_served();
        if served > 0 {
            debug!("Answered {} follower requests", served);
        }
        served
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}
