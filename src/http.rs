//! Inbound REST surface.
//!
//! A thin translation layer: decode the caller's JSON, hand it to the
//! [`Orchestrator`], and map its errors to HTTP status codes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::{error, info};

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use crate::types::{
    ContainerRecord, CreateRequest, CreateResponse, DeleteResponse, ResourceRequest,
    SwapRequest,
};
use crate::upstream::Envelope;

type AppState = Arc<Orchestrator>;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/containers", get(list_containers))
        .route("/container/create", post(create_container))
        .route("/container/{id}", get(get_container))
        .route("/container/{id}/resources", post(set_resources))
        .route("/container/{id}/swap", post(set_swap))
        .route("/container/{id}/start", post(start_container))
        .route("/container/{id}/stop", post(stop_container))
        .route("/container/{id}/restart", post(restart_container))
        .route("/container/{id}/delete", delete(delete_container))
        .with_state(orchestrator)
}

/// Serves the API until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    orchestrator: Arc<Orchestrator>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind {addr}: {e}"))?;
    info!("HTTP API listening on http://{}", addr);
    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("serve {addr}: {e}"))
}

#[derive(Debug)]
pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

/// Undecodable bodies are the caller's fault, whatever axum's own status.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(OrchestratorError::InvalidRequest(format!(
            "failed to parse request body: {}",
            rejection.body_text()
        )))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn list_containers(
    State(orch): State<AppState>,
) -> Result<Json<Vec<ContainerRecord>>, ApiError> {
    Ok(Json(orch.records()?))
}

async fn get_container(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<ContainerRecord>, ApiError> {
    Ok(Json(orch.record(id)?))
}

async fn create_container(
    State(orch): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(req) = body?;
    Ok(Json(orch.create(req).await?))
}

async fn set_resources(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
    body: Result<Json<ResourceRequest>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    Ok(Json(orch.set_resources(id, req).await?))
}

async fn set_swap(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
    body: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    Ok(Json(orch.set_swap(id, req).await?))
}

async fn start_container(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Envelope>, ApiError> {
    Ok(Json(orch.start(id).await?))
}

async fn stop_container(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Envelope>, ApiError> {
    Ok(Json(orch.stop(id).await?))
}

async fn restart_container(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Envelope>, ApiError> {
    Ok(Json(orch.restart(id).await?))
}

async fn delete_container(
    State(orch): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DeleteResponse>, ApiError> {
    Ok(Json(orch.delete(id).await?))
}
