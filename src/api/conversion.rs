use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::api::sse::build_sse_response;
use crate::converter::ConversionRequest;
use crate::error::AppError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/texto-a-latex", post(convert))
        .route("/texto-a-latex/stream", post(convert_stream))
        .route("/ai-status", get(ai_status))
}

#[derive(Debug, Serialize)]
struct ConversionResponse {
    latex: String,
    provider: &'static str,
    model: String,
    math_mode: bool,
    elapsed_ms: u64,
}

/// POST /conversion/texto-a-latex
async fn convert(
    State(state): State<AppState>,
    Json(req): Json<ConversionRequest>,
) -> Result<Json<ConversionResponse>, AppError> {
    tracing::debug!(
        text_len = req.text.len(),
        math_mode = req.math_mode,
        "Conversion requested"
    );

    let result = state.converter.convert(&req).await?;
    Ok(Json(ConversionResponse {
        latex: result.latex,
        provider: result.provider,
        model: result.model,
        math_mode: req.math_mode,
        elapsed_ms: u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
    }))
}

/// POST /conversion/texto-a-latex/stream
///
/// Validation and connection failures answer with a JSON error; once the
/// stream is open, failures arrive as an `error` event.
async fn convert_stream(
    State(state): State<AppState>,
    Json(req): Json<ConversionRequest>,
) -> Result<Response, AppError> {
    let events = state.converter.convert_stream(&req).await?;
    Ok(build_sse_response(events).into_response())
}

#[derive(Debug, Serialize)]
struct AiStatus {
    ai_provider: String,
    model: String,
    status: &'static str,
    model_initialized: bool,
}

/// GET /conversion/ai-status
async fn ai_status(State(state): State<AppState>) -> Json<AiStatus> {
    let configured = state.converter.is_configured();
    Json(AiStatus {
        ai_provider: state.converter.provider_name().to_string(),
        model: state.converter.model().to_string(),
        status: if configured { "available" } else { "unavailable" },
        model_initialized: configured,
    })
}
