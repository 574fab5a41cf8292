use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/config", get(config_view))
}

#[derive(Debug, Serialize)]
struct RootInfo {
    name: &'static str,
    description: &'static str,
    version: &'static str,
    documentation: BTreeMap<&'static str, &'static str>,
}

/// GET /
async fn root() -> Json<RootInfo> {
    let documentation = BTreeMap::from([
        ("POST /conversion/texto-a-latex", "Convert text into a LaTeX document"),
        ("POST /conversion/texto-a-latex/stream", "Same conversion streamed as server-sent events"),
        ("GET /conversion/ai-status", "AI provider status"),
        ("POST /pdf/generar", "Compile LaTeX; returns an artifact id"),
        ("GET /pdf/descargar/{id}", "Download a PDF or LaTeX artifact"),
        ("GET /pdf/info/{id}", "Artifact metadata"),
        ("GET /pdf/pdflatex-status", "Compiler availability"),
        ("GET /pdf/test-pdflatex", "Compile a test document"),
        ("GET /pdf/diagnostico-pdflatex", "Compiler installation diagnostics"),
        ("GET /health", "Service health"),
        ("GET /config", "Public configuration"),
    ]);

    Json(RootInfo {
        name: env!("CARGO_PKG_NAME"),
        description: env!("CARGO_PKG_DESCRIPTION"),
        version: VERSION,
        documentation,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider_configured: bool,
    compiler_available: bool,
    version: &'static str,
    /// Seconds since start.
    uptime: u64,
    timestamp: DateTime<Utc>,
    mode: &'static str,
}

/// GET /health
///
/// Never calls the AI provider.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        provider_configured: state.converter.is_configured(),
        compiler_available: state.pdf.compiler().is_available().await,
        version: VERSION,
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        mode: state.pdf.mode().await.as_str(),
    })
}

#[derive(Debug, Serialize)]
struct ConfigView {
    version: &'static str,
    allowed_origins: Vec<String>,
    ai_provider: String,
    model: String,
    features: Features,
}

#[derive(Debug, Serialize)]
struct Features {
    pdflatex_available: bool,
    force_latex_only: bool,
    force_pdf_generation: bool,
    use_simple_pdflatex: bool,
    latex_fallback: bool,
    artifact_ttl_seconds: u64,
}

/// GET /config
async fn config_view(State(state): State<AppState>) -> Json<ConfigView> {
    let config = &state.config;
    Json(ConfigView {
        version: VERSION,
        allowed_origins: config.server.allowed_origins(),
        ai_provider: state.converter.provider_name().to_string(),
        model: state.converter.model().to_string(),
        features: Features {
            pdflatex_available: state.pdf.compiler().is_available().await,
            force_latex_only: config.pdf.force_latex_only,
            force_pdf_generation: config.pdf.force_pdf_generation,
            use_simple_pdflatex: config.pdf.use_simple_pdflatex,
            latex_fallback: config.pdf.latex_fallback,
            artifact_ttl_seconds: config.pdf.artifact_ttl_seconds,
        },
    })
}
