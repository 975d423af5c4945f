//! HTTP dashboard surface.
//!
//! Thin axum layer over the pipeline: run one budget, sweep a batch,
//! list stored traces, and stream a side-by-side comparison of the
//! tiered pipeline against a single Deep-model baseline.

mod compare;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tierflow_models::{CostReport, QualityScore, TaskGraph};
use tracing::info;

use crate::batch::Pipeline;
use crate::error::{EngineError, Result};
use crate::trace::TraceStore;

pub struct AppState {
    pub pipeline: Pipeline,
    pub store: Arc<TraceStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/run", post(run_handler))
        .route("/api/batch", post(batch_handler))
        .route("/api/traces", get(traces_handler))
        .route("/api/compare/stream", get(compare::compare_stream))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

type ApiError = (StatusCode, String);

fn to_api_error(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::Config(_)
        | EngineError::PlannerInvalid(_)
        | EngineError::BudgetExhausted { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    task: String,
    budget: f64,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    run_id: String,
    report: CostReport,
    graph: TaskGraph,
    deliverable: String,
    deliverable_quality: Option<QualityScore>,
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> std::result::Result<Json<RunResponse>, ApiError> {
    if request.task.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "task is required".to_string()));
    }

    let outcome = state
        .pipeline
        .plan(&request.task)
        .await
        .map_err(to_api_error)?;
    let output = state
        .pipeline
        .run_single(&outcome, request.budget)
        .await
        .map_err(to_api_error)?;

    Ok(Json(RunResponse {
        run_id: output.trace.run_id.clone(),
        report: output.report,
        graph: outcome.graph,
        deliverable: output.trace.deliverable.clone(),
        deliverable_quality: output.trace.deliverable_quality.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    task: String,
    budgets: Vec<f64>,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
}

fn default_concurrency() -> usize {
    3
}

#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    task: String,
    budget_dollars: f64,
    total_cost_dollars: f64,
    quality: Option<f64>,
    timestamp: String,
}

async fn batch_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> std::result::Result<Json<Vec<RunSummary>>, ApiError> {
    if request.task.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "task is required".to_string()));
    }
    if request.budgets.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "at least one budget is required".to_string(),
        ));
    }

    let traces = state
        .pipeline
        .run_batch(
            &request.task,
            &request.budgets,
            request.concurrency,
            std::time::Duration::from_secs(1),
        )
        .await
        .map_err(to_api_error)?;

    Ok(Json(
        traces
            .iter()
            .map(|t| RunSummary {
                run_id: t.run_id.clone(),
                task: t.task.clone(),
                budget_dollars: t.budget_dollars,
                total_cost_dollars: t.total_cost_dollars,
                quality: t.deliverable_quality.as_ref().map(|q| q.overall),
                timestamp: t.timestamp.to_rfc3339(),
            })
            .collect(),
    ))
}

async fn traces_handler(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Vec<RunSummary>>, ApiError> {
    let traces = state.store.load_all().map_err(to_api_error)?;
    Ok(Json(
        traces
            .iter()
            .map(|t| RunSummary {
                run_id: t.run_id.clone(),
                task: t.task.clone(),
                budget_dollars: t.budget_dollars,
                total_cost_dollars: t.total_cost_dollars,
                quality: t.deliverable_quality.as_ref().map(|q| q.overall),
                timestamp: t.timestamp.to_rfc3339(),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_client_or_server_status() {
        let (status, _) = to_api_error(EngineError::BudgetExhausted {
            budget: 0.01,
            spent: 0.02,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = to_api_error(EngineError::Io(std::io::Error::other("disk")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
