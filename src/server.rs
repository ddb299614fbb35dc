//! HTTP surface over the repository engine.
//!
//! Thin request/response plumbing: every route maps onto one coordinator,
//! inspector, or classifier call and performs JSON encoding. Failure
//! mapping: `InvalidArgument` becomes 400, everything else 500, and command
//! output travels with the payload whenever a command actually ran.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::DockhandConfig;
use crate::errors::DeployError;
use crate::oplog::OpLog;
use crate::repo::{MutationCoordinator, MutationOutcome, RepoInspector, RestartPolicy, StaleBranchScanner};

pub struct AppState {
    pub inspector: RepoInspector,
    pub scanner: StaleBranchScanner,
    pub coordinator: MutationCoordinator,
    pub oplog: Arc<OpLog>,
    pub repo_path: String,
}

impl AppState {
    pub fn from_config(config: &DockhandConfig) -> Arc<Self> {
        let oplog = Arc::new(OpLog::new(config.observability.log_buffer_capacity));
        let timeout = Duration::from_secs(config.repository.command_timeout_secs);
        let inspector = RepoInspector::new(
            config.repository.path.clone(),
            Arc::clone(&oplog),
            timeout,
        );
        let restart = RestartPolicy {
            command: config.restart.command.clone(),
            on_checkout: config.restart.on_checkout,
            on_pull: config.restart.on_pull,
            timeout: Duration::from_secs(config.restart.timeout_secs),
        };
        let coordinator =
            MutationCoordinator::new(inspector.clone(), restart, Arc::clone(&oplog));
        Arc::new(Self {
            scanner: StaleBranchScanner::new(inspector.clone()),
            inspector,
            coordinator,
            oplog,
            repo_path: config.repository.path.clone(),
        })
    }
}

// ── Error Handling ──

struct AppError(DeployError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeployError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self.0 {
            DeployError::CommandFailed { result, .. } => json!({
                "error": self.0.to_string(),
                "stdout": result.stdout,
                "stderr": result.stderr,
            }),
            _ => json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DeployError> for AppError {
    fn from(err: DeployError) -> Self {
        Self(err)
    }
}

// ── Entrypoint ──

pub async fn serve(config: &DockhandConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, repo = %state.repo_path, "dockhand listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/git/info", get(git_info))
        .route("/git/fetch", post(git_fetch))
        .route("/git/checkout", post(git_checkout))
        .route("/git/pull", post(git_pull))
        .route("/git/branch/delete", post(branch_delete))
        .route("/git/branches/stale", get(stale_branches))
        .route("/git/branches/delete-safe", post(delete_safe))
        .route("/service/restart", post(service_restart))
        .route("/service/restart-self", post(restart_self))
        .route("/logs", get(recent_logs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "repository_path": state.repo_path,
        "restart_command_configured": state.coordinator.restart_configured(),
    }))
}

// ── GET /git/info ──

async fn git_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Path validity is the only hard failure; each field degrades
    // independently so one broken query does not blank the whole page.
    state.inspector.validate().await?;

    let mut errors = serde_json::Map::new();

    let current = match state.inspector.current_ref().await {
        Ok(head) => json!(head.to_string()),
        Err(e) => {
            errors.insert("current_ref".to_string(), json!(e.to_string()));
            serde_json::Value::Null
        }
    };
    let branches = match state.inspector.list_branches().await {
        Ok(branches) => json!(branches),
        Err(e) => {
            errors.insert("branches".to_string(), json!(e.to_string()));
            serde_json::Value::Null
        }
    };
    let tags = match state.inspector.list_tags().await {
        Ok(tags) => json!(tags),
        Err(e) => {
            errors.insert("tags".to_string(), json!(e.to_string()));
            serde_json::Value::Null
        }
    };
    let log = match state.inspector.recent_log(20).await {
        Ok(log) => json!(log),
        Err(e) => {
            errors.insert("log".to_string(), json!(e.to_string()));
            serde_json::Value::Null
        }
    };

    Ok(Json(json!({
        "current_ref": current,
        "branches": branches,
        "tags": tags,
        "log": log,
        "errors": errors,
    })))
}

// ── Mutations ──

async fn git_fetch(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let result = state.coordinator.fetch_all().await?;
    if result.success {
        Ok(Json(json!({
            "message": "fetch successful",
            "stdout": result.stdout,
            "stderr": result.stderr,
        }))
        .into_response())
    } else {
        Ok(command_failure_response("fetch failed", &result))
    }
}

#[derive(Deserialize)]
struct CheckoutRequest {
    #[serde(rename = "ref")]
    reference: String,
}

async fn git_checkout(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    let outcome = state.coordinator.checkout(&request.reference).await?;
    Ok(mutation_response(
        &format!("checkout to '{}' successful", request.reference),
        &format!("checkout to '{}' failed", request.reference),
        outcome,
    ))
}

async fn git_pull(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let outcome = state.coordinator.pull().await?;
    Ok(mutation_response("pull successful", "pull failed", outcome))
}

#[derive(Deserialize)]
struct DeleteBranchRequest {
    name: String,
}

async fn branch_delete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteBranchRequest>,
) -> Result<Response, AppError> {
    let result = state.coordinator.delete_local_branch(&request.name).await?;
    if result.success {
        Ok(Json(json!({
            "message": format!("deleted branch '{}'", request.name),
            "stdout": result.stdout,
            "stderr": result.stderr,
        }))
        .into_response())
    } else {
        Ok(command_failure_response(
            &format!("failed to delete branch '{}'", request.name),
            &result,
        ))
    }
}

// ── Stale branch reconciliation ──

async fn stale_branches(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stale = state.scanner.scan().await?;
    let branches: Vec<_> = stale
        .iter()
        .map(|s| {
            json!({
                "name": s.branch.name,
                "status": s.verdict,
                "upstream": s.branch.upstream,
                "ahead": s.branch.ahead,
            })
        })
        .collect();
    Ok(Json(json!({ "stale_branches": branches })))
}

async fn delete_safe(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcomes = state.coordinator.delete_all_safe().await?;
    Ok(Json(json!({ "results": outcomes })))
}

// ── Service management ──

async fn service_restart(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let outcome = state.coordinator.restart_main_application().await?;
    match &outcome.result {
        Some(result) if result.success => Ok(Json(json!({
            "message": "main application restart command executed successfully",
            "stdout": result.stdout,
            "stderr": result.stderr,
        }))
        .into_response()),
        Some(result) => Ok(command_failure_response(
            "main application restart command failed",
            result,
        )),
        None => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": outcome.skipped_reason })),
        )
            .into_response()),
    }
}

async fn restart_self(State(state): State<Arc<AppState>>) -> Response {
    state.coordinator.announce_self_restart();
    // Fire-and-forget: the acknowledgement is written before the process
    // goes away; an external restart-always supervisor brings it back.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        std::process::exit(0);
    });
    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "restart requested; the agent will exit and be restarted by its supervisor" })),
    )
        .into_response()
}

// ── GET /logs ──

#[derive(Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn recent_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Json<serde_json::Value> {
    let records = state.oplog.recent(query.limit.unwrap_or(100));
    Json(json!({ "records": records }))
}

// ── Helpers ──

fn mutation_response(ok_message: &str, err_message: &str, outcome: MutationOutcome) -> Response {
    if outcome.command.success {
        Json(json!({
            "message": ok_message,
            "stdout": outcome.command.stdout,
            "stderr": outcome.command.stderr,
            "restart": outcome.restart,
        }))
        .into_response()
    } else {
        command_failure_response(err_message, &outcome.command)
    }
}

fn command_failure_response(message: &str, result: &crate::runner::CommandResult) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "stdout": result.stdout,
            "stderr": result.stderr,
        })),
    )
        .into_response()
}
