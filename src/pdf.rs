//! PDF generation: mode selection between compiling and LaTeX-only output.

use std::sync::Arc;

use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactContent, ArtifactStore};
use crate::compiler::Compiler;
use crate::config::PdfConfig;
use crate::error::AppError;
use crate::latex::normalize;

/// How `/pdf/generar` currently behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    PdfGeneration,
    LatexOnly,
    LatexOnlyForced,
}

impl GenerationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PdfGeneration => "pdf_generation",
            Self::LatexOnly => "latex_only",
            Self::LatexOnlyForced => "latex_only (forced)",
        }
    }
}

/// Turns LaTeX into a stored artifact.
#[derive(Debug, Clone)]
pub struct PdfGenerator {
    compiler: Compiler,
    store: ArtifactStore,
    force_latex_only: bool,
    force_pdf_generation: bool,
    latex_fallback: bool,
    max_latex_length: usize,
}

impl PdfGenerator {
    #[must_use]
    pub fn new(config: &PdfConfig, compiler: Compiler, store: ArtifactStore) -> Self {
        Self {
            compiler,
            store,
            force_latex_only: config.force_latex_only,
            force_pdf_generation: config.force_pdf_generation,
            latex_fallback: config.latex_fallback,
            max_latex_length: config.max_latex_length,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    #[must_use]
    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub async fn mode(&self) -> GenerationMode {
        if self.force_latex_only {
            GenerationMode::LatexOnlyForced
        } else if self.force_pdf_generation || self.compiler.is_available().await {
            GenerationMode::PdfGeneration
        } else {
            GenerationMode::LatexOnly
        }
    }

    fn validate(&self, latex: &str) -> Result<(), AppError> {
        if latex.trim().is_empty() {
            return Err(AppError::Validation("latex cannot be empty".to_string()));
        }
        let length = latex.chars().count();
        if length > self.max_latex_length {
            return Err(AppError::Validation(format!(
                "LaTeX source is {length} characters long; the limit is {}",
                self.max_latex_length
            )));
        }
        Ok(())
    }

    fn store_latex(&self, document: String, diagnostics: Option<String>) -> Arc<Artifact> {
        self.store.insert(
            ArtifactContent::Latex(document.clone()),
            document,
            diagnostics,
        )
    }

    /// Produce and store an artifact for `latex`.
    ///
    /// A LaTeX-only artifact is a successful degraded result; callers tell it
    /// apart through [`Artifact::kind`].
    pub async fn generate(&self, latex: &str) -> Result<Arc<Artifact>, AppError> {
        self.validate(latex)?;
        let document = normalize(latex);

        match self.mode().await {
            GenerationMode::LatexOnlyForced => {
                info!("LaTeX-only mode forced; skipping compilation");
                return Ok(self.store_latex(document, None));
            }
            GenerationMode::LatexOnly if self.latex_fallback => {
                info!("pdflatex unavailable; storing LaTeX source");
                return Ok(self.store_latex(
                    document,
                    Some("pdflatex is not available on this host".to_string()),
                ));
            }
            GenerationMode::LatexOnly | GenerationMode::PdfGeneration => {}
        }

        match self.compiler.compile(&document).await {
            Ok(pdf) => {
                let log = (!pdf.log_tail.is_empty()).then_some(pdf.log_tail);
                Ok(self
                    .store
                    .insert(ArtifactContent::Pdf(pdf.bytes), document, log))
            }
            Err(failure) if self.latex_fallback => {
                warn!(error = %failure, "Compilation failed; falling back to LaTeX output");
                let diagnostics = match failure.diagnostics() {
                    Some(d) => format!("{failure}\n{d}"),
                    None => failure.to_string(),
                };
                Ok(self.store_latex(document, Some(diagnostics)))
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Live artifact for `id`.
    pub fn get(&self, id: &str) -> Result<Arc<Artifact>, AppError> {
        self.store
            .get(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::artifact::ArtifactKind;

    fn config() -> PdfConfig {
        PdfConfig {
            force_latex_only: false,
            force_pdf_generation: false,
            use_simple_pdflatex: true,
            latex_fallback: true,
            pdflatex_path: Some("/nonexistent/pdflatex".to_string()),
            compile_timeout_seconds: 5,
            artifact_ttl_seconds: 600,
            sweep_interval_seconds: 60,
            max_latex_length: 100,
        }
    }

    fn generator(config: &PdfConfig) -> PdfGenerator {
        PdfGenerator::new(
            config,
            Compiler::from_config(config),
            ArtifactStore::new(Duration::from_secs(600)),
        )
    }

    #[tokio::test]
    async fn test_empty_latex_rejected() {
        let err = generator(&config()).generate("  \n").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_oversized_latex_rejected() {
        let err = generator(&config())
            .generate(&"x".repeat(101))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unavailable_compiler_falls_back() {
        let generator = generator(&config());
        assert_eq!(generator.mode().await, GenerationMode::LatexOnly);

        let artifact = generator.generate("Hello").await.unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::LatexOnly);
        assert!(artifact.source.contains("\\begin{document}"));
        assert!(artifact.diagnostics.is_some());
    }

    #[tokio::test]
    async fn test_forced_latex_only() {
        let config = PdfConfig {
            force_latex_only: true,
            ..config()
        };
        let generator = generator(&config);
        assert_eq!(generator.mode().await.as_str(), "latex_only (forced)");
        let artifact = generator.generate("Hello").await.unwrap();
        assert_eq!(artifact.kind(), ArtifactKind::LatexOnly);
        assert!(artifact.diagnostics.is_none());
    }

    #[tokio::test]
    async fn test_no_fallback_is_compilation_error() {
        let config = PdfConfig {
            latex_fallback: false,
            ..config()
        };
        let generator = generator(&config);
        let err = generator.generate("Hello").await.unwrap_err();
        assert_eq!(err.code(), "COMPILATION_ERROR");
        assert!(generator.store().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let err = generator(&config()).get("unknown-id").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
