use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderName, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::artifact::ArtifactKind;
use crate::compiler::{DiagnosticsReport, SelfTestReport, truncate};
use crate::error::AppError;
use crate::pdf::GenerationMode;

const PREVIEW_CHARS: usize = 500;

static ARTIFACT_KIND: HeaderName = HeaderName::from_static("x-artifact-kind");

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generar", post(generate))
        .route("/descargar/{id}", get(download))
        .route("/info/{id}", get(info))
        .route("/pdflatex-status", get(pdflatex_status))
        .route("/test-pdflatex", get(self_test))
        .route("/diagnostico-pdflatex", get(diagnostics))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    latex: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    id: String,
    kind: ArtifactKind,
}

/// POST /pdf/generar
async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let artifact = state.pdf.generate(&req.latex).await?;
    Ok(Json(GenerateResponse {
        id: artifact.id.clone(),
        kind: artifact.kind(),
    }))
}

/// GET /pdf/descargar/{id}
async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let artifact = state.pdf.get(&id)?;
    let kind = artifact.kind();
    tracing::debug!(artifact_id = %id, kind = %kind, "Serving artifact");

    let headers = [
        (header::CONTENT_TYPE, kind.content_type()),
        (header::CONTENT_DISPOSITION, kind.content_disposition()),
        (ARTIFACT_KIND.clone(), kind.as_str()),
    ];
    Ok((headers, artifact.content.as_bytes().to_vec()).into_response())
}

#[derive(Debug, Serialize)]
struct ArtifactInfo {
    id: String,
    kind: ArtifactKind,
    file_name: &'static str,
    size: usize,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    seconds_remaining: u64,
    latex_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<String>,
}

/// GET /pdf/info/{id}
async fn info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArtifactInfo>, AppError> {
    let artifact = state.pdf.get(&id)?;
    Ok(Json(ArtifactInfo {
        id: artifact.id.clone(),
        kind: artifact.kind(),
        file_name: artifact.kind().file_name(),
        size: artifact.size(),
        created_at: artifact.created_at,
        expires_at: artifact.expires_at_utc(),
        seconds_remaining: artifact.remaining().as_secs(),
        latex_preview: truncate(&artifact.source, PREVIEW_CHARS),
        diagnostics: artifact.diagnostics.clone(),
    }))
}

#[derive(Debug, Serialize)]
struct PdflatexStatus {
    pdflatex_available: bool,
    mode: &'static str,
}

/// GET /pdf/pdflatex-status
async fn pdflatex_status(State(state): State<AppState>) -> Json<PdflatexStatus> {
    Json(PdflatexStatus {
        pdflatex_available: state.pdf.compiler().is_available().await,
        mode: state.pdf.mode().await.as_str(),
    })
}

/// GET /pdf/test-pdflatex
async fn self_test(State(state): State<AppState>) -> Json<SelfTestReport> {
    let compiler = state.pdf.compiler();
    if state.pdf.mode().await == GenerationMode::LatexOnlyForced {
        return Json(SelfTestReport::skipped(
            compiler.is_available().await,
            compiler.is_simple(),
        ));
    }
    Json(compiler.self_test().await)
}

/// GET /pdf/diagnostico-pdflatex
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsReport> {
    Json(state.pdf.compiler().diagnostics().await)
}
