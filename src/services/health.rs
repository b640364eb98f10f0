//! Status HTTP server
//!
//! Liveness and readiness probes for the supervisor itself, a JSON view of
//! target state and history, a Prometheus metrics endpoint, and target
//! management under `/api/targets`. Changes made through the API apply from
//! the next pass and are not written back to the configuration file.

use crate::config::{StatusAuth, Target, TargetConfig};
use crate::error::{Result, VigilError};
use crate::services::{HistoryRecorder, Metrics, TargetStats};
use crate::supervisor::{SupervisorEvent, TargetState, Watchdog};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One target as reported by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub enabled: bool,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub fail_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart_time: Option<DateTime<Utc>>,
    pub restarts_in_last_hour: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

impl TargetStatus {
    fn new(target: &Target, state: Option<&TargetState>, now: DateTime<Utc>) -> Self {
        let fresh = TargetState::new(&target.name);
        let state = state.unwrap_or(&fresh);
        Self {
            name: target.name.clone(),
            enabled: target.enabled,
            healthy: state.is_healthy,
            consecutive_failures: state.consecutive_failures,
            fail_threshold: target.policy.fail_threshold,
            last_check_time: state.last_check_time,
            last_restart_time: state.last_restart_time,
            restarts_in_last_hour: state.recent_restarts(now),
            last_message: state.last_message.clone(),
        }
    }
}

/// Overall supervisor status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub targets: Vec<TargetStatus>,
}

/// Shared state for the status server
pub struct StatusState {
    pub started_at: DateTime<Utc>,
    pub watchdog: Arc<Watchdog>,
    pub metrics: Option<Arc<Metrics>>,
    pub history: Option<Arc<HistoryRecorder>>,
    pub auth: Option<StatusAuth>,
}

impl StatusState {
    pub fn new(watchdog: Arc<Watchdog>) -> Self {
        Self {
            started_at: Utc::now(),
            metrics: watchdog.metrics(),
            watchdog,
            history: None,
            auth: None,
        }
    }

    pub fn with_metrics(mut self, m: Arc<Metrics>) -> Self {
        self.metrics = Some(m);
        self
    }

    pub fn with_history(mut self, h: Arc<HistoryRecorder>) -> Self {
        self.history = Some(h);
        self
    }

    /// Require HTTP Basic credentials on `/api/*`
    pub fn with_auth(mut self, auth: Option<StatusAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Current status of every configured target
    pub async fn status(&self) -> StatusResponse {
        let now = Utc::now();
        let snapshot = self.watchdog.snapshot().await;
        let targets: Vec<TargetStatus> = self
            .watchdog
            .targets()
            .await
            .iter()
            .map(|t| TargetStatus::new(t, snapshot.targets.get(&t.name), now))
            .collect();

        StatusResponse {
            healthy: targets.iter().filter(|t| t.enabled).all(|t| t.healthy),
            timestamp: now,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            targets,
        }
    }
}

/// Status server
pub struct StatusServer {
    state: Arc<StatusState>,
    addr: SocketAddr,
}

impl StatusServer {
    pub fn new(state: Arc<StatusState>, bind: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", bind, port)
            .parse::<SocketAddr>()
            .map_err(|e| VigilError::Validation(format!("invalid status address {}:{}: {}", bind, port, e)))?;
        Ok(Self { state, addr })
    }

    /// Serve until the process exits
    pub async fn run(&self) -> Result<()> {
        let app = router(Arc::clone(&self.state));

        info!(addr = %self.addr, "starting status server");
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| VigilError::Internal(format!("status server error: {}", e)))?;

        Ok(())
    }

    pub fn state(&self) -> Arc<StatusState> {
        Arc::clone(&self.state)
    }
}

/// Routes served by [`StatusServer`]. Probes and metrics stay open; `/api/*`
/// sits behind Basic auth when credentials are configured.
pub fn router(state: Arc<StatusState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api = Router::new()
        .route("/api/status", get(status_handler))
        .route(
            "/api/targets",
            get(list_targets_handler).post(create_target_handler),
        )
        .route(
            "/api/targets/:name",
            get(target_handler)
                .put(update_target_handler)
                .delete(delete_target_handler),
        )
        .route("/api/history", get(history_handler))
        .route("/api/stats", get(stats_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));

    Router::new()
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn basic_auth(
    State(state): State<Arc<StatusState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.auth else {
        return next.run(request).await;
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64_STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    match provided.as_deref().and_then(|c| c.split_once(':')) {
        Some((user, password)) if user == expected.username && password == expected.password => {
            next.run(request).await
        }
        Some((user, _)) => {
            warn!(user = %user, "status API authentication failed");
            unauthorized()
        }
        None => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"vigil\"")],
        "authentication required",
    )
        .into_response()
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Liveness: the supervisor process is up
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness: every enabled target is healthy
async fn readiness_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    if state.watchdog.all_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(state.status().await)
}

async fn list_targets_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(state.status().await.targets)
}

async fn target_handler(
    State(state): State<Arc<StatusState>>,
    Path(name): Path<String>,
) -> Response {
    match target_status(&state, &name).await {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown target: {}", name)),
    }
}

async fn target_status(state: &StatusState, name: &str) -> Option<TargetStatus> {
    let targets = state.watchdog.targets().await;
    let target = targets.iter().find(|t| t.name == name)?;
    let current = state.watchdog.target_state(name).await;
    Some(TargetStatus::new(target, current.as_ref(), Utc::now()))
}

async fn target_exists(state: &StatusState, name: &str) -> bool {
    state.watchdog.targets().await.iter().any(|t| t.name == name)
}

/// Validate and install a target, answering with its status
async fn apply_target(state: &StatusState, config: TargetConfig, code: StatusCode) -> Response {
    let name = config.name.clone();
    match state.watchdog.upsert_target(config).await {
        Ok(()) => match target_status(state, &name).await {
            Some(status) => (code, Json(status)).into_response(),
            None => error_response(StatusCode::CONFLICT, format!("target {} was removed concurrently", name)),
        },
        Err(VigilError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn create_target_handler(
    State(state): State<Arc<StatusState>>,
    Json(config): Json<TargetConfig>,
) -> Response {
    if target_exists(&state, &config.name).await {
        return error_response(
            StatusCode::CONFLICT,
            format!("target already exists: {}", config.name),
        );
    }
    apply_target(&state, config, StatusCode::CREATED).await
}

async fn update_target_handler(
    State(state): State<Arc<StatusState>>,
    Path(name): Path<String>,
    Json(mut config): Json<TargetConfig>,
) -> Response {
    if config.name.is_empty() {
        config.name = name.clone();
    } else if config.name != name {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("body names target {} but path names {}", config.name, name),
        );
    }
    if !target_exists(&state, &name).await {
        return error_response(StatusCode::NOT_FOUND, format!("unknown target: {}", name));
    }
    apply_target(&state, config, StatusCode::OK).await
}

async fn delete_target_handler(
    State(state): State<Arc<StatusState>>,
    Path(name): Path<String>,
) -> Response {
    if state.watchdog.remove_target(&name).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("unknown target: {}", name))
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    target: Option<String>,
    limit: Option<usize>,
}

async fn history_handler(
    State(state): State<Arc<StatusState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let Some(history) = &state.history else {
        return Json(Vec::<SupervisorEvent>::new());
    };
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(history.events(query.target.as_deref(), limit).await)
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    aggregate: TargetStats,
    targets: BTreeMap<String, TargetStats>,
}

async fn stats_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let Some(history) = &state.history else {
        return Json(StatsResponse {
            aggregate: TargetStats::default(),
            targets: BTreeMap::new(),
        });
    };
    Json(StatsResponse {
        aggregate: history.aggregate_stats().await,
        targets: history.all_stats().await,
    })
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let states: Vec<TargetState> = state
        .watchdog
        .snapshot()
        .await
        .targets
        .into_values()
        .collect();

    let body = match &state.metrics {
        Some(metrics) => metrics.prometheus(&states).await,
        None => Metrics::new().prometheus(&states).await,
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ActionKind, ActionSpec, CheckSpec, ExecActionSpec, HistoryConfig, Policy};
    use crate::supervisor::{EventKind, WatchdogConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn target(name: &str, command: &str) -> Target {
        Target {
            name: name.to_string(),
            enabled: true,
            checks: vec![CheckSpec::Command {
                command: vec![command.to_string()],
            }],
            action: ActionSpec {
                kind: ActionKind::Exec {
                    exec: ExecActionSpec {
                        start: vec![],
                        restart: vec!["false".to_string()],
                    },
                },
                hooks: None,
            },
            policy: Policy {
                fail_threshold: 5,
                ..Default::default()
            },
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
        credentials: Option<&str>,
    ) -> (StatusCode, String) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(credentials) = credentials {
            req = req.header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64_STANDARD.encode(credentials)),
            );
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn target_json(name: &str, command: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "checks": [{"type": "command", "command": [command]}],
            "action": {"type": "exec", "exec": {"restart": ["false"]}},
            "policy": {"fail_threshold": 5}
        })
    }

    async fn state_with(targets: Vec<Target>) -> Arc<StatusState> {
        let metrics = Arc::new(Metrics::new());
        let watchdog = Arc::new(
            Watchdog::new(WatchdogConfig::default(), targets).with_metrics(metrics),
        );
        watchdog.run_once().await;
        Arc::new(StatusState::new(watchdog))
    }

    #[tokio::test]
    async fn test_liveness_and_readiness() {
        let healthy = state_with(vec![target("ok", "true")]).await;
        assert_eq!(get(router(healthy.clone()), "/healthz").await.0, StatusCode::OK);
        assert_eq!(get(router(healthy), "/readyz").await.0, StatusCode::OK);

        let unhealthy = state_with(vec![target("ok", "true"), target("down", "false")]).await;
        assert_eq!(get(router(unhealthy.clone()), "/healthz").await.0, StatusCode::OK);
        assert_eq!(
            get(router(unhealthy), "/readyz").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_status_and_target_endpoints() {
        let state = state_with(vec![target("down", "false")]).await;

        let (code, body) = get(router(state.clone()), "/api/status").await;
        assert_eq!(code, StatusCode::OK);
        let status: StatusResponse = serde_json::from_str(&body).unwrap();
        assert!(!status.healthy);
        assert_eq!(status.targets.len(), 1);
        assert_eq!(status.targets[0].consecutive_failures, 1);
        assert_eq!(status.targets[0].fail_threshold, 5);

        let (code, body) = get(router(state.clone()), "/api/targets/down").await;
        assert_eq!(code, StatusCode::OK);
        let target: TargetStatus = serde_json::from_str(&body).unwrap();
        assert!(!target.healthy);

        let (code, _) = get(router(state), "/api/targets/missing").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state_with(vec![target("down", "false")]).await;
        let (code, body) = get(router(state), "/metrics").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("vigil_passes_total 1"));
        assert!(body.contains("vigil_target_healthy{target=\"down\"} 0"));
    }

    #[tokio::test]
    async fn test_history_endpoints() {
        let history = Arc::new(HistoryRecorder::open(&HistoryConfig::default()).await);
        history
            .record(SupervisorEvent::new(EventKind::CheckFailed, "a", "down"))
            .await
            .unwrap();
        history
            .record(SupervisorEvent::new(EventKind::CheckFailed, "b", "down"))
            .await
            .unwrap();

        let watchdog = Arc::new(Watchdog::new(WatchdogConfig::default(), vec![]));
        let state = Arc::new(StatusState::new(watchdog).with_history(history));

        let (code, body) = get(router(state.clone()), "/api/history?target=a").await;
        assert_eq!(code, StatusCode::OK);
        let events: Vec<SupervisorEvent> = serde_json::from_str(&body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "a");

        let (_, body) = get(router(state), "/api/stats").await;
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["aggregate"]["failed_checks"], 2);
        assert_eq!(stats["targets"]["b"]["total_checks"], 1);
    }

    #[tokio::test]
    async fn test_target_changes_apply_on_next_pass() {
        let state = state_with(vec![target("a", "true")]).await;

        let (code, body) = send(
            router(state.clone()),
            Method::POST,
            "/api/targets",
            Some(target_json("b", "false")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::CREATED, "{}", body);
        let created: TargetStatus = serde_json::from_str(&body).unwrap();
        assert_eq!(created.name, "b");
        assert_eq!(created.fail_threshold, 5);

        let (code, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/targets",
            Some(target_json("b", "true")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::CONFLICT);

        assert!(!state.watchdog.run_once().await);
        assert_eq!(state.watchdog.target_state("b").await.unwrap().consecutive_failures, 1);
        assert!(state.watchdog.target_state("a").await.unwrap().is_healthy);

        let (code, body) = send(
            router(state.clone()),
            Method::PUT,
            "/api/targets/a",
            Some(target_json("a", "false")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::OK, "{}", body);
        state.watchdog.run_once().await;
        assert_eq!(state.watchdog.target_state("a").await.unwrap().consecutive_failures, 1);

        let (code, _) = send(router(state.clone()), Method::DELETE, "/api/targets/b", None, None).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
        state.watchdog.run_once().await;
        assert!(state.watchdog.target_state("b").await.is_none());

        let (code, body) = get(router(state.clone()), "/api/targets").await;
        assert_eq!(code, StatusCode::OK);
        let listed: Vec<TargetStatus> = serde_json::from_str(&body).unwrap();
        assert_eq!(listed.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["a"]);

        let (code, _) = send(router(state), Method::DELETE, "/api/targets/b", None, None).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_target_writes_reject_bad_requests() {
        let state = state_with(vec![target("a", "true")]).await;

        let mut invalid = target_json("c", "true");
        invalid["checks"] = serde_json::json!([]);
        let (code, body) =
            send(router(state.clone()), Method::POST, "/api/targets", Some(invalid), None).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body.contains("at least one check"), "{}", body);

        let (code, _) = send(
            router(state.clone()),
            Method::PUT,
            "/api/targets/a",
            Some(target_json("other", "true")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);

        let (code, _) = send(
            router(state.clone()),
            Method::PUT,
            "/api/targets/missing",
            Some(target_json("missing", "true")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let unnamed = target_json("", "false");
        let (code, _) =
            send(router(state.clone()), Method::PUT, "/api/targets/a", Some(unnamed), None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(state.watchdog.targets().await.len(), 1);
    }

    #[tokio::test]
    async fn test_api_requires_basic_auth_when_configured() {
        let watchdog = Arc::new(Watchdog::new(WatchdogConfig::default(), vec![target("a", "true")]));
        let state = Arc::new(StatusState::new(watchdog).with_auth(Some(StatusAuth {
            username: "admin".to_string(),
            password: "s3cret".to_string(),
        })));

        let resp = router(state.clone())
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

        let (code, _) =
            send(router(state.clone()), Method::GET, "/api/status", None, Some("admin:wrong")).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        let (code, _) =
            send(router(state.clone()), Method::GET, "/api/status", None, Some("admin:s3cret")).await;
        assert_eq!(code, StatusCode::OK);

        let (code, _) = send(
            router(state.clone()),
            Method::POST,
            "/api/targets",
            Some(target_json("b", "true")),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(state.watchdog.targets().await.len(), 1);

        assert_eq!(get(router(state.clone()), "/healthz").await.0, StatusCode::OK);
        assert_eq!(get(router(state), "/readyz").await.0, StatusCode::OK);
    }
}
