//! REST API server for the research agent
//!
//! Exposes the orchestrator via HTTP endpoints. Each request runs its own
//! loop on its own task; the orchestrator and its alias table are shared.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::agent::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResearchRequest {
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Research Endpoint
/// =============================

async fn research(
    State(state): State<ApiState>,
    Json(req): Json<ResearchRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let query = req.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query must not be empty".into())),
        );
    }

    info!("Received research request: {}", query);

    match state.orchestrator.run(query).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "report": result.report,
                "query_id": result.query_id,
                "iterations": result.iterations,
                "verdicts": result.verdicts,
                "reasoning_trace": result.reasoning_trace,
                "execution_time_ms": result.execution_time_ms,
            }))),
        ),
        Err(e) => {
            warn!(error = %e, "Research request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Research failed: {}", e))),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/research", post(research))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::llm::{LlmReply, ScriptedLlm};
    use crate::reflection::LlmReflectionGate;
    use crate::tools::ToolRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router(reasoning: Vec<LlmReply>, reviews: Vec<LlmReply>) -> Router {
        let config = AgentConfig {
            rate_limit_delay_ms: 0,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedLlm::from_replies(reasoning)),
            Arc::new(ToolRegistry::new()),
            Arc::new(LlmReflectionGate::new(Arc::new(ScriptedLlm::from_replies(reviews)))),
            &config,
        );
        create_router(Arc::new(orchestrator))
    }

    async fn post_research(router: Router, body: &str) -> (StatusCode, ApiResponse) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/research")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(vec![], vec![])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_research_returns_report() {
        let router = router(
            vec![LlmReply::text("USDTRY 34.3, +0.6%. HOLD. Neutral.")],
            vec![LlmReply::text("APPROVED")],
        );

        let (status, body) = post_research(router, r#"{"query": "dolar kaç TL?"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        let data = body.data.unwrap();
        assert_eq!(data["report"], "USDTRY 34.3, +0.6%. HOLD. Neutral.");
        assert_eq!(data["iterations"], 1);
    }

    #[tokio::test]
    async fn test_research_rejects_empty_query() {
        let (status, body) = post_research(router(vec![], vec![]), r#"{"query": "  "}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_research_reports_loop_failure() {
        let (status, body) = post_research(router(vec![], vec![]), r#"{"query": "altın?"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.unwrap().contains("Reasoning step failed"));
    }
}
