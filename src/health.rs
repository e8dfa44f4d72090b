use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthState {
    pub liveness: HealthStatus,
    pub readiness: HealthStatus,
    pub records_converted: u64,
    pub records_rejected: u64,
    pub last_record_at: Option<Instant>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            liveness: HealthStatus::Starting,
            readiness: HealthStatus::Starting,
            records_converted: 0,
            records_rejected: 0,
            last_record_at: None,
        }
    }
}

impl HealthState {
    pub fn set_status(&mut self, status: HealthStatus) {
        self.liveness = status;
        self.readiness = status;
    }

    pub fn record_converted(&mut self) {
        self.records_converted += 1;
        self.last_record_at = Some(Instant::now());
    }

    pub fn record_rejected(&mut self) {
        self.records_rejected += 1;
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            liveness: self.liveness,
            readiness: self.readiness,
            records_converted: self.records_converted,
            records_rejected: self.records_rejected,
            seconds_since_last_record: self.last_record_at.map(|t| t.elapsed().as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub liveness: HealthStatus,
    pub readiness: HealthStatus,
    pub records_converted: u64,
    pub records_rejected: u64,
    pub seconds_since_last_record: Option<u64>,
}

pub type SharedHealthState = Arc<RwLock<HealthState>>;

async fn liveness_probe(State(health_state): State<SharedHealthState>) -> StatusCode {
    let state = health_state.read().await;

    match state.liveness {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Starting => {
            info!("Liveness probe: starting");
            StatusCode::OK // Allow pod to start
        }
        HealthStatus::Unhealthy => {
            error!("Liveness probe: unhealthy");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn readiness_probe(State(health_state): State<SharedHealthState>) -> StatusCode {
    let state = health_state.read().await;

    match state.readiness {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Starting | HealthStatus::Unhealthy => {
            error!("Readiness probe: not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn startup_probe(State(health_state): State<SharedHealthState>) -> StatusCode {
    let state = health_state.read().await;

    match state.liveness {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Starting | HealthStatus::Unhealthy => {
            info!("Startup probe: not started yet");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn status(State(health_state): State<SharedHealthState>) -> Json<HealthSnapshot> {
    Json(health_state.read().await.snapshot())
}

pub fn router(health_state: SharedHealthState) -> Router {
    Router::new()
        .route("/healthz", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .route("/startup", get(startup_probe))
        .route("/status", get(status))
        .with_state(health_state)
}

pub async fn run_health_server(port: u16, health_state: SharedHealthState) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind health server")?;

    info!(event = "health_server_listening", %addr, "Health check server listening");

    axum::serve(listener, router(health_state))
        .await
        .context("Health server error")?;

    Ok(())
}
