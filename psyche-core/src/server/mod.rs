//! HTTP/WebSocket edge.
//!
//! JSON everywhere; bearer gating on `/api/*` when a token is configured;
//! `/hooks/*` exempt from the bearer check but capped at 1 MiB bodies;
//! `/ws` fans every emitted runtime event out to all connected clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{DefaultBodyLimit, Path, Request, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{PsycheError, Result};
use crate::events::{EventBus, EventType};
use crate::infra::Clock;
use crate::orchestrator::Orchestrator;
use crate::reports::ReportStore;
use crate::schedulers::HealthMonitor;
use crate::substrate::{SubstrateFile, SubstrateReader};

const HOOK_BODY_LIMIT: usize = 1024 * 1024;

pub struct ApiContext {
    pub orchestrator: Arc<Orchestrator>,
    pub reader: Arc<SubstrateReader>,
    pub reports: Arc<ReportStore>,
    pub health: Arc<HealthMonitor>,
    pub events: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
    pub auth_token: Option<String>,
}

pub fn router(ctx: Arc<ApiContext>) -> Router {
    let api = Router::new()
        .route("/loop/status", get(loop_status))
        .route("/loop/metrics", get(loop_metrics))
        .route("/loop/start", post(loop_start))
        .route("/loop/pause", post(loop_pause))
        .route("/loop/resume", post(loop_resume))
        .route("/loop/stop", post(loop_stop))
        .route("/loop/audit", post(loop_audit))
        .route("/conversation/send", post(conversation_send))
        .route("/substrate/:id", get(substrate_get))
        .route("/reports", get(reports_list))
        .route("/reports/latest", get(report_latest))
        .route("/health", get(health_report))
        .route("/health/critical", get(health_critical))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), require_bearer));

    let hooks = Router::new()
        .route("/agent", post(hook_agent))
        .layer(DefaultBodyLimit::max(HOOK_BODY_LIMIT));

    Router::new()
        .nest("/api", api)
        .nest("/hooks", hooks)
        .route("/ws", get(ws_upgrade))
        .with_state(ctx)
}

pub async fn serve(router: Router, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PsycheError::Io {
            path: addr.to_string().into(),
            source: e,
        })?;
    info!("HTTP edge listening on {addr}");
    axum::serve(listener, router)
        .await
        .map_err(|e| PsycheError::Io {
            path: addr.to_string().into(),
            source: e,
        })
}

/// Client-side reconnect cadence: exponential from 1 s, capped at 30 s.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    const BASE_MS: u64 = 1_000;
    const CAP_MS: u64 = 30_000;
    let factor = 1u64 << attempt.min(6);
    Duration::from_millis(BASE_MS.saturating_mul(factor).min(CAP_MS))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn require_bearer(
    State(ctx): State<Arc<ApiContext>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &ctx.auth_token {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            return error_body(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }
    next.run(request).await
}

// ─── Loop control ──────────────────────────────────────────────────────────────

async fn loop_status(State(ctx): State<Arc<ApiContext>>) -> Response {
    Json(json!({
        "state": ctx.orchestrator.state(),
        "metrics": ctx.orchestrator.metrics(),
    }))
    .into_response()
}

async fn loop_metrics(State(ctx): State<Arc<ApiContext>>) -> Response {
    Json(ctx.orchestrator.metrics()).into_response()
}

fn transition_response(ctx: &ApiContext, result: Result<()>) -> Response {
    match result {
        Ok(()) => Json(json!({ "ok": true, "state": ctx.orchestrator.state() })).into_response(),
        Err(e @ PsycheError::InvalidTransition { .. }) => {
            error_body(StatusCode::CONFLICT, e.to_string())
        }
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn loop_start(State(ctx): State<Arc<ApiContext>>) -> Response {
    transition_response(&ctx, ctx.orchestrator.start())
}

async fn loop_pause(State(ctx): State<Arc<ApiContext>>) -> Response {
    transition_response(&ctx, ctx.orchestrator.pause())
}

async fn loop_resume(State(ctx): State<Arc<ApiContext>>) -> Response {
    transition_response(&ctx, ctx.orchestrator.resume())
}

async fn loop_stop(State(ctx): State<Arc<ApiContext>>) -> Response {
    transition_response(&ctx, ctx.orchestrator.stop())
}

async fn loop_audit(State(ctx): State<Arc<ApiContext>>) -> Response {
    ctx.orchestrator.request_audit();
    Json(json!({ "ok": true })).into_response()
}

// ─── Conversation ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendBody {
    message: String,
}

async fn conversation_send(
    State(ctx): State<Arc<ApiContext>>,
    payload: std::result::Result<Json<SendBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return error_body(rejection.status(), rejection.body_text()),
    };
    if body.message.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let orchestrator = ctx.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.handle_user_message(&body.message).await;
    });
    ctx.orchestrator.nudge();
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
}

// ─── Substrate & reports ───────────────────────────────────────────────────────

async fn substrate_get(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> Response {
    let Some(file) = SubstrateFile::from_name(&id) else {
        return error_body(StatusCode::BAD_REQUEST, format!("unknown substrate id: {id}"));
    };
    match ctx.reader.read(file).await {
        Ok(snapshot) => {
            let modified_ms = snapshot
                .metadata
                .modified
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            Json(json!({
                "id": file.name(),
                "path": snapshot.metadata.path.display().to_string(),
                "contentHash": snapshot.metadata.content_hash,
                "modified": modified_ms,
                "markdown": snapshot.markdown,
            }))
            .into_response()
        }
        Err(e) if e.is_not_found() => error_body(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn reports_list(State(ctx): State<Arc<ApiContext>>) -> Response {
    match ctx.reports.list().await {
        Ok(reports) => Json(json!({ "reports": reports })).into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn report_latest(State(ctx): State<Arc<ApiContext>>) -> Response {
    match ctx.reports.latest().await {
        Ok(Some((name, content))) => {
            Json(json!({ "name": name, "content": content })).into_response()
        }
        Ok(None) => error_body(StatusCode::NOT_FOUND, "no reports yet"),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ─── Health ────────────────────────────────────────────────────────────────────

async fn health_report(State(ctx): State<Arc<ApiContext>>) -> Response {
    let report = ctx.health.report(ctx.clock.now()).await;
    Json(report).into_response()
}

async fn health_critical(State(ctx): State<Arc<ApiContext>>) -> Response {
    let report = ctx.health.report(ctx.clock.now()).await;
    let status = if report.critical_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

// ─── Hooks & WebSocket ─────────────────────────────────────────────────────────

async fn hook_agent(
    State(ctx): State<Arc<ApiContext>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(envelope) = match payload {
        Ok(envelope) => envelope,
        Err(rejection) => return error_body(rejection.status(), rejection.body_text()),
    };
    let message = envelope
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
        .unwrap_or_else(|| envelope.to_string());

    ctx.events.emit(EventType::AgoraMessage, envelope);
    ctx.orchestrator.inject_message(&message);
    ctx.orchestrator.nudge();
    Json(json!({ "ok": true })).into_response()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<Arc<ApiContext>>) -> Response {
    ws.on_upgrade(move |socket| ws_connection(socket, ctx))
}

async fn ws_connection(socket: WebSocket, ctx: Arc<ApiContext>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = ctx.events.subscribe();
    debug!("WebSocket client connected");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, skipped {skipped} event(s)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                // Client frames are ignored; control traffic uses the HTTP
                // surface.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    debug!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_backoff_reaches_but_never_exceeds_cap() {
        assert_eq!(reconnect_backoff(0), Duration::from_secs(1));
        assert_eq!(reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(reconnect_backoff(2), Duration::from_secs(4));
        assert_eq!(reconnect_backoff(4), Duration::from_secs(16));
        assert_eq!(reconnect_backoff(5), Duration::from_secs(30));
        for attempt in 5..64 {
            assert_eq!(reconnect_backoff(attempt), Duration::from_secs(30));
        }
    }

    #[test]
    fn test_hook_body_limit_is_one_mebibyte() {
        assert_eq!(HOOK_BODY_LIMIT, 1_048_576);
    }
}
