//! # robun-server
//!
//! HTTP gateway over the core services: health/status probes, message
//! injection, session inspection, and cron job management. Every route is
//! a thin wrapper — the agent loop and the cron service do the work.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::info;

use robun_config::RobunConfig;
use robun_runtime::{
    AgentLoop, CronPayloadKind, CronSchedule, CronService, NewCronJob, SessionStore,
    SubAgentManager,
};

/// Shared gateway state.
pub struct AppState {
    pub config: RobunConfig,
    pub agent: Arc<AgentLoop>,
    pub sessions: Arc<SessionStore>,
    pub cron: Arc<CronService>,
    pub subagents: Arc<SubAgentManager>,
    pub started: Instant,
}

/// Build the gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/agent/message", post(agent_message))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{key}", get(get_session))
        .route("/cron/jobs", get(list_cron_jobs).post(create_cron_job))
        .route("/cron/jobs/{id}/run", post(run_cron_job))
        .route("/cron/jobs/{id}", delete(delete_cron_job))
        .route("/config", get(get_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process shuts down.
pub async fn serve(state: Arc<AppState>) -> robun_core::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| robun_core::RobunError::Agent(format!("gateway failed: {e}")))?;
    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cron = state.cron.status().await;
    let sessions = state
        .sessions
        .list_sessions()
        .await
        .map(|s| s.len())
        .unwrap_or(0);
    Json(json!({
        "status": "running",
        "uptimeSecs": state.started.elapsed().as_secs(),
        "sessions": sessions,
        "activeSubagents": state.subagents.active_count().await,
        "cron": cron,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentMessageRequest {
    content: String,
    session_key: Option<String>,
    channel: Option<String>,
    chat_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentMessageResponse {
    response: String,
    session_key: String,
}

async fn agent_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgentMessageRequest>,
) -> Result<Json<AgentMessageResponse>, (StatusCode, String)> {
    let session_key = request.session_key.unwrap_or_else(|| {
        format!(
            "{}:{}",
            request.channel.as_deref().unwrap_or("api"),
            request.chat_id.as_deref().unwrap_or("default"),
        )
    });

    let response = state
        .agent
        .process_direct(
            &request.content,
            &session_key,
            request.channel.as_deref(),
            request.chat_id.as_deref(),
        )
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(AgentMessageResponse {
        response,
        session_key,
    }))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let sessions = state
        .sessions
        .list_sessions()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let rows: Vec<Value> = sessions
        .iter()
        .map(|s| {
            json!({
                "key": s.key,
                "messageCount": s.message_count,
                "updatedAt": s.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "sessions": rows })))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if !state.sessions.exists(&key).await {
        return Err((StatusCode::NOT_FOUND, format!("no session: {key}")));
    }
    let session = state.sessions.get_or_create(&key).await;
    Ok(Json(json!({
        "key": session.key,
        "createdAt": session.created_at,
        "updatedAt": session.updated_at,
        "lastConsolidated": session.last_consolidated,
        "messages": session.messages,
    })))
}

#[derive(Deserialize)]
struct ListJobsParams {
    #[serde(default)]
    include_disabled: bool,
}

async fn list_cron_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Json<Value> {
    let jobs = state.cron.list_jobs(params.include_disabled).await;
    Json(json!({ "jobs": jobs }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    name: Option<String>,
    message: String,
    every_seconds: Option<i64>,
    cron: Option<String>,
    at_ms: Option<i64>,
    tz: Option<String>,
    #[serde(default)]
    deliver: bool,
    channel: Option<String>,
    to: Option<String>,
    #[serde(default)]
    delete_after_run: bool,
}

async fn create_cron_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateJobRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let schedule = if let Some(every) = request.every_seconds {
        CronSchedule::Every {
            every_ms: every * 1000,
        }
    } else if let Some(expr) = request.cron {
        CronSchedule::Cron {
            expr,
            tz: request.tz,
        }
    } else if let Some(at_ms) = request.at_ms {
        CronSchedule::At { at_ms }
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "one of everySeconds, cron, atMs is required".into(),
        ));
    };

    let job = state
        .cron
        .add_job(NewCronJob {
            name: request.name.unwrap_or_else(|| request.message.clone()),
            schedule,
            message: request.message,
            deliver: request.deliver,
            channel: request.channel,
            to: request.to,
            kind: CronPayloadKind::AgentTurn,
            delete_after_run: request.delete_after_run,
        })
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(json!({ "job": job })))
}

#[derive(Deserialize)]
struct RunJobParams {
    #[serde(default)]
    force: bool,
}

async fn run_cron_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RunJobParams>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let ran = state
        .cron
        .run_job(&id, params.force)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(json!({ "ran": ran })))
}

async fn delete_cron_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let removed = state
        .cron
        .remove_job(&id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !removed {
        return Err((StatusCode::NOT_FOUND, format!("no job: {id}")));
    }
    Ok(Json(json!({ "removed": true })))
}

/// Sanitized config view — credentials are blanked before serialization.
async fn get_config(State(state): State<Arc<AppState>>) -> Json<RobunConfig> {
    Json(state.config.sanitized())
}
