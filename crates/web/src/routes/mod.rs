use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use chess_eval_core::{PositionEvaluation, QuickAnalysis};

use crate::AppState;

pub mod ws;

/// Body of the analysis endpoints and of each WebSocket message
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub fen: String,
    pub depth: Option<u32>,
    /// Smoothing history key, deep analysis only
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_running: bool,
}

/// Engine failure reported as a 500 with a `detail` message
pub struct ApiError(chess_eval_core::Error);

impl From<chess_eval_core::Error> for ApiError {
    fn from(err: chess_eval_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(err = %self.0, "analysis failed");
        let body = serde_json::json!({ "detail": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/analyze/deep", post(analyze_deep))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

pub async fn health(State(analyzer): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        engine_running: analyzer.health_check(),
    })
}

pub async fn analyze(
    State(analyzer): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<QuickAnalysis>, ApiError> {
    let depth = request.depth.unwrap_or(analyzer.default_depth());
    let result = analyzer.analyze(&request.fen, depth).await?;
    Ok(Json(result))
}

pub async fn analyze_deep(
    State(analyzer): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<PositionEvaluation>, ApiError> {
    let depth = request.depth.unwrap_or(analyzer.default_depth());
    let result = match request.session.as_deref() {
        Some(session) => analyzer.analyze_deep_in(session, &request.fen, depth).await?,
        None => analyzer.analyze_deep(&request.fen, depth).await?,
    };
    Ok(Json(result))
}
