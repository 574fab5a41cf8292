//! Pitorro: text-to-LaTeX and LaTeX-to-PDF REST service.
//!
//! User text goes to an external LLM which answers with LaTeX; LaTeX goes to
//! the host's `pdflatex`, or is handed back as-is when compiling is disabled
//! or impossible. Results are kept in memory for a limited time and
//! downloaded by id.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with JSON and SSE endpoints
//! - **Conversion**: provider-agnostic LLM call behind [`llm::LatexProvider`]
//! - **PDF**: scoped `pdflatex` runs with LaTeX-only fallback
//! - **Artifacts**: in-memory store with time-to-live
//!
//! # Modules
//!
//! - [`config`]: layered settings (defaults, file, environment, CLI)
//! - [`converter`]: text-to-LaTeX conversion
//! - [`compiler`]: `pdflatex` discovery and compilation
//! - [`artifact`]: TTL artifact store
//! - [`pdf`]: generation mode selection
//! - [`api`]: HTTP handlers

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod artifact;
pub mod compiler;
pub mod config;
pub mod converter;
pub mod error;
pub mod latex;
pub mod llm;
pub mod pdf;
pub mod server;
pub mod telemetry;

use std::sync::Arc;
use std::time::Instant;

use crate::artifact::ArtifactStore;
use crate::compiler::Compiler;
use crate::config::AppConfig;
use crate::converter::LatexConverter;
use crate::pdf::PdfGenerator;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// Text-to-LaTeX converter.
    pub converter: Arc<LatexConverter>,
    /// PDF generator and the artifact store behind it.
    pub pdf: Arc<PdfGenerator>,
    /// Process start, for `/health` uptime.
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, converter: LatexConverter, pdf: PdfGenerator) -> Self {
        Self {
            config,
            converter: Arc::new(converter),
            pdf: Arc::new(pdf),
            started_at: Instant::now(),
        }
    }

    /// Build every component from configuration.
    #[must_use]
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let converter = LatexConverter::from_config(&config.ai);
        let store = ArtifactStore::new(config.pdf.artifact_ttl());
        let pdf = PdfGenerator::new(&config.pdf, Compiler::from_config(&config.pdf), store);
        Self::new(config, converter, pdf)
    }
}
