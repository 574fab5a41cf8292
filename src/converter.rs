//! Text-to-LaTeX conversion.
//!
//! Wraps a [`LatexProvider`] with input validation, a bounded call, output
//! normalisation and timing metadata. A single call is made per request.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::AppError;
use crate::latex::{SYSTEM_INSTRUCTION, build_prompt, ensure_math_delimiters, normalize, strip_code_fences};
use crate::llm::{GenerationRequest, LatexProvider, build_provider};

/// Body of `POST /conversion/texto-a-latex`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionRequest {
    /// Text to convert.
    pub text: String,
    /// Whether the text contains mathematical notation.
    #[serde(default)]
    pub math_mode: bool,
}

/// Successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// Normalised LaTeX document.
    pub latex: String,
    /// Provider that produced it.
    pub provider: &'static str,
    /// Model that produced it.
    pub model: String,
    /// Wall time of the provider call.
    pub elapsed: Duration,
}

/// Events of a streaming conversion.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ConversionEvent {
    /// A fragment of model output.
    #[serde(rename = "latex.delta")]
    Delta {
        /// The new fragment.
        text: String,
        /// Everything received so far.
        accumulated: String,
    },

    /// The stream finished; `latex` is the normalised document.
    #[serde(rename = "latex.done")]
    Done {
        latex: String,
        model: String,
        elapsed_ms: u64,
    },

    /// The conversion failed; no further events follow.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ConversionEvent {
    fn from_error(err: &AppError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Events of one streaming conversion.
pub type EventStream = Pin<Box<dyn Stream<Item = ConversionEvent> + Send>>;

/// Converts user text into LaTeX through the configured provider.
#[derive(Debug, Clone)]
pub struct LatexConverter {
    provider: Option<Arc<dyn LatexProvider>>,
    /// Why `provider` is missing.
    unavailable: String,
    provider_name: String,
    model: String,
    timeout: Duration,
}

impl LatexConverter {
    /// Converter over an already built provider.
    pub fn new(provider: Arc<dyn LatexProvider>, timeout: Duration) -> Self {
        Self {
            provider_name: provider.name().to_string(),
            model: provider.model().to_string(),
            provider: Some(provider),
            unavailable: String::new(),
            timeout,
        }
    }

    /// Build from configuration; a missing credential yields a converter that
    /// rejects every call with [`AppError::ProviderNotConfigured`].
    pub fn from_config(config: &AiConfig) -> Self {
        match build_provider(config) {
            Ok(provider) => {
                tracing::info!(
                    provider = provider.name(),
                    model = provider.model(),
                    timeout_secs = config.timeout_seconds,
                    "AI provider configured"
                );
                Self::new(provider, config.timeout())
            }
            Err(e) => {
                tracing::warn!(
                    provider = %config.provider,
                    error = %e,
                    "AI provider unavailable; conversion endpoints will answer 503"
                );
                Self {
                    provider: None,
                    unavailable: e.to_string(),
                    provider_name: config.provider.to_lowercase(),
                    model: config.model.clone(),
                    timeout: config.timeout(),
                }
            }
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> Result<&Arc<dyn LatexProvider>, AppError> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::ProviderNotConfigured(self.unavailable.clone()))
    }

    fn prepare(&self, req: &ConversionRequest) -> Result<GenerationRequest, AppError> {
        if req.text.trim().is_empty() {
            return Err(AppError::Validation("text cannot be empty".to_string()));
        }
        Ok(GenerationRequest::new(
            SYSTEM_INSTRUCTION,
            build_prompt(&req.text, req.math_mode),
        ))
    }

    /// Convert `req.text` into a complete LaTeX document.
    pub async fn convert(&self, req: &ConversionRequest) -> Result<ConversionResult, AppError> {
        let generation = self.prepare(req)?;
        let provider = self.provider()?;

        let started = Instant::now();
        let raw = tokio::time::timeout(self.timeout, provider.generate(&generation))
            .await
            .map_err(|_| AppError::ProviderTimeout(self.timeout))??;
        let elapsed = started.elapsed();

        let latex = finish(&raw, req.math_mode)?;
        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            math_mode = req.math_mode,
            elapsed_ms = elapsed_ms(elapsed),
            latex_len = latex.len(),
            "Text converted to LaTeX"
        );

        Ok(ConversionResult {
            latex,
            provider: provider.name(),
            model: provider.model().to_string(),
            elapsed,
        })
    }

    /// Streaming variant of [`convert`](Self::convert).
    ///
    /// Opening the stream and every gap between fragments are bounded by the
    /// provider timeout. The stream always ends with [`ConversionEvent::Done`]
    /// or [`ConversionEvent::Error`].
    pub async fn convert_stream(
        &self,
        req: &ConversionRequest,
    ) -> Result<EventStream, AppError> {
        let generation = self.prepare(req)?;
        let provider = self.provider()?;
        let timeout = self.timeout;
        let math_mode = req.math_mode;
        let model = provider.model().to_string();

        let started = Instant::now();
        let mut chunks = tokio::time::timeout(timeout, provider.stream(&generation))
            .await
            .map_err(|_| AppError::ProviderTimeout(timeout))??;

        Ok(Box::pin(async_stream::stream! {
            let mut accumulated = String::new();
            loop {
                match tokio::time::timeout(timeout, chunks.next()).await {
                    Err(_) => {
                        yield ConversionEvent::from_error(&AppError::ProviderTimeout(timeout));
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield ConversionEvent::from_error(&AppError::from(e));
                        return;
                    }
                    Ok(Some(Ok(text))) => {
                        accumulated.push_str(&text);
                        yield ConversionEvent::Delta {
                            text,
                            accumulated: accumulated.clone(),
                        };
                    }
                }
            }

            match finish(&accumulated, math_mode) {
                Ok(latex) => {
                    let elapsed = started.elapsed();
                    tracing::info!(model = %model, elapsed_ms = elapsed_ms(elapsed), "Streaming conversion finished");
                    yield ConversionEvent::Done {
                        latex,
                        model,
                        elapsed_ms: elapsed_ms(elapsed),
                    };
                }
                Err(e) => yield ConversionEvent::from_error(&e),
            }
        }))
    }
}

/// Normalise raw model output; an answer with no LaTeX in it is a provider fault.
fn finish(raw: &str, math_mode: bool) -> Result<String, AppError> {
    if strip_code_fences(raw).is_empty() {
        return Err(AppError::Provider(
            "provider returned an empty response".to_string(),
        ));
    }
    let document = normalize(raw);
    Ok(if math_mode {
        ensure_math_delimiters(document)
    } else {
        document
    })
}

fn elapsed_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
