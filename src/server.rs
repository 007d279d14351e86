//! Simulated scan service.
//!
//! Speaks the same HTTP/JSON protocol as the scanner-backed service but keeps tasks
//! in memory and walks them through canned states, so the client can be exercised
//! without a scanner.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::types::{Vulnerability, COMPLETED_STATUS, DONE_STATUS, ERROR_STATUS, SUCCESS_STATUS};

/// OpenVAS "Full and fast" scan config.
pub const FULL_AND_FAST_CONFIG_ID: &str = "daba56c8-73ec-11df-a475-002264764cea";
/// OpenVAS "Discovery" scan config.
pub const DISCOVERY_CONFIG_ID: &str = "698f691e-7489-11df-9d8c-002264764cea";

/// Map a scan profile name to the scanner config it runs with.
pub fn scan_config_id(scan_type: Option<&str>) -> &'static str {
    match scan_type {
        Some("discovery") => DISCOVERY_CONFIG_ID,
        // "full", "fast" and anything unknown
        _ => FULL_AND_FAST_CONFIG_ID,
    }
}

/// Behaviour of the simulated service.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Status queries answered before a task reports `Done`.
    pub polls_until_done: u32,
    pub vulnerabilities: Vec<Vulnerability>,
    pub version: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            polls_until_done: 3,
            vulnerabilities: vec![
                Vulnerability::named("OpenSSH Obsolete Version Detection", "High"),
                Vulnerability::named("TLS/SSL Server Supports TLS 1.0", "medium"),
            ],
            version: "22.4 (simulated)".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    config: Arc<MockConfig>,
}

#[derive(Debug, Default)]
struct ServerState {
    next_id: u64,
    tasks: HashMap<String, MockTask>,
}

#[derive(Debug)]
struct MockTask {
    polls: u32,
    stopped: bool,
}

impl MockTask {
    fn status(&self, polls_until_done: u32) -> &'static str {
        if self.stopped {
            "Stopped"
        } else if self.polls >= polls_until_done {
            DONE_STATUS
        } else if self.polls <= 1 {
            "Requested"
        } else {
            "Running"
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default)]
    pub scan_type: Option<String>,
}

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/test-connection", get(test_connection))
        .route("/scan", post(post_scan))
        .route("/scan-status/{task_id}", get(get_status))
        .route("/scan-results/{task_id}", get(get_results))
        .route("/stop-scan/{task_id}", post(stop_scan))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, config: MockConfig) -> Result<()> {
    let app = router(AppState::new(config));
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn spawn_server(bind: &str, config: MockConfig) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "simulated scan service listening");
    serve(listener, config).await
}

async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Backend is running!" }))
}

async fn test_connection(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": SUCCESS_STATUS, "version": app.config.version }))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> impl IntoResponse {
    let target = req.target.trim();
    if target.is_empty() {
        return Json(json!({
            "target": req.target,
            "scan_type": req.scan_type,
            "status": ERROR_STATUS,
            "message": "Failed to start scan: target must not be empty",
        }));
    }

    let task_id = {
        let mut s = app.inner.write().await;
        s.next_id += 1;
        let id = format!("task-{}", s.next_id);
        s.tasks.insert(id.clone(), MockTask { polls: 0, stopped: false });
        id
    };
    info!(%task_id, host = target, "simulated scan started");

    Json(json!({
        "target": target,
        "scan_type": req.scan_type,
        "config_id": scan_config_id(req.scan_type.as_deref()),
        "task_id": task_id,
        "status": "started",
        "message": format!("Scan started successfully. Task ID: {task_id}"),
    }))
}

async fn get_status(State(app): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    match s.tasks.get_mut(&task_id) {
        Some(task) => {
            if !task.stopped {
                task.polls = task.polls.saturating_add(1);
            }
            let status = task.status(app.config.polls_until_done);
            Json(json!({ "task_id": task_id, "status": status }))
        }
        None => Json(not_found(&task_id)),
    }
}

async fn get_results(State(app): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let Some(task) = s.tasks.get(&task_id) else {
        return Json(not_found(&task_id));
    };
    let status = task.status(app.config.polls_until_done);
    if status != DONE_STATUS {
        return Json(json!({
            "task_id": task_id,
            "status": status,
            "message": "Scan is not completed yet",
        }));
    }
    let vulnerabilities: Vec<_> = app
        .config
        .vulnerabilities
        .iter()
        .map(|v| json!({ "name": v.identifier, "severity": v.detail }))
        .collect();
    Json(json!({
        "task_id": task_id,
        "status": COMPLETED_STATUS,
        "vulnerabilities": vulnerabilities,
    }))
}

async fn stop_scan(State(app): State<AppState>, Path(task_id): Path<String>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    match s.tasks.get_mut(&task_id) {
        Some(task) => {
            task.stopped = true;
            info!(%task_id, "simulated scan stopped");
            (
                StatusCode::OK,
                Json(json!({ "task_id": task_id, "message": "Scan stopped successfully" })),
            )
        }
        None => (StatusCode::NOT_FOUND, Json(not_found(&task_id))),
    }
}

fn not_found(task_id: &str) -> serde_json::Value {
    json!({ "task_id": task_id, "status": ERROR_STATUS, "message": "Task not found" })
}
