//! AI provider abstraction for text-to-LaTeX generation.
//!
//! The rest of the service only sees [`LatexProvider`]: "generate LaTeX from
//! this prompt". Concrete providers translate that into their wire protocol.
//!
//! # Providers
//!
//! - [`GeminiProvider`]: Google Gemini `generateContent` API
//! - [`ChatCompletionsProvider`]: any OpenAI-compatible `/v1/chat/completions` API
//!
//! # Example
//!
//! ```rust,ignore
//! use pitorro::llm::{GenerationRequest, build_provider};
//!
//! let provider = build_provider(&config.ai)?;
//! let latex = provider.generate(&GenerationRequest::new(system, prompt)).await?;
//! ```

pub mod chat_completions;
pub mod gemini;
pub mod provider;

pub use chat_completions::ChatCompletionsProvider;
pub use gemini::GeminiProvider;
pub use provider::Provider;

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::config::AiConfig;

/// Sampling parameters shared by all providers.
pub const TEMPERATURE: f32 = 0.2;
pub const TOP_P: f32 = 0.95;
pub const TOP_K: u32 = 40;
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Errors raised while talking to an AI provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Credentials or endpoint missing.
    #[error("{0}")]
    NotConfigured(String),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the body.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The provider refused to answer (safety filters, content policy).
    #[error("request blocked by provider: {0}")]
    Blocked(String),

    /// The provider answered with no text.
    #[error("provider returned an empty response")]
    Empty,
}

/// A single prompt to send to a provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instruction.
    pub system: String,
    /// User prompt.
    pub prompt: String,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Stream of text fragments produced by a provider.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Capability to turn a prompt into LaTeX source.
#[async_trait::async_trait]
pub trait LatexProvider: Send + Sync + std::fmt::Debug {
    /// Provider name for logging and status endpoints.
    fn name(&self) -> &'static str;

    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Generate the complete response for `req`.
    async fn generate(&self, req: &GenerationRequest) -> Result<String, ProviderError>;

    /// Stream the response for `req` as it is produced.
    ///
    /// The default implementation yields the full [`generate`](Self::generate)
    /// result as a single fragment.
    async fn stream(&self, req: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let text = self.generate(req).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

/// Build the provider described by `config`.
///
/// Returns [`ProviderError::NotConfigured`] when the provider needs an API
/// key and none was supplied.
pub fn build_provider(config: &AiConfig) -> Result<Arc<dyn LatexProvider>, ProviderError> {
    let provider = Provider::from_config(&config.provider, config.base_url.as_deref());
    let api_key = config.api_key().map(ToString::to_string);

    if provider.requires_api_key() && api_key.is_none() {
        return Err(ProviderError::NotConfigured(format!(
            "no API key configured for provider '{}' (set API_KEY)",
            config.provider
        )));
    }

    let base_url = match config.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => url.to_string(),
        None => provider
            .default_base_url()
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no base URL configured for provider '{}' (set LLM_BASE_URL)",
                    config.provider
                ))
            })?
            .to_string(),
    };

    let built: Arc<dyn LatexProvider> = match provider {
        Provider::Gemini => Arc::new(GeminiProvider::new(base_url, api_key, config.model.clone())),
        other => Arc::new(ChatCompletionsProvider::new(
            other,
            base_url,
            api_key,
            config.model.clone(),
        )),
    };
    Ok(built)
}

/// Turn a non-success response into [`ProviderError::Api`], keeping the
/// provider's own error message when the body is JSON.
pub(crate) async fn error_from_response(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect());
    ProviderError::Api { status, message }
}

/// Split an SSE response body into the `data:` payload of each event.
pub(crate) fn sse_data(
    resp: reqwest::Response,
) -> impl Stream<Item = Result<String, ProviderError>> + Send {
    let byte_stream = resp.bytes_stream();

    async_stream::try_stream! {
        let mut buf = Vec::<u8>::new();

        futures::pin_mut!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

            while let Some(pos) = find_double_newline(&buf) {
                let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                if let Some(data) = frame_data(&String::from_utf8_lossy(&frame)) {
                    yield data;
                }
            }
        }

        if let Some(data) = frame_data(&String::from_utf8_lossy(&buf)) {
            yield data;
        }
    }
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Joined `data:` lines of one SSE frame.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    let data = lines.join("\n");
    (!data.is_empty()).then_some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ai_config(provider: &str, api_key: Option<&str>, base_url: Option<&str>) -> AiConfig {
        AiConfig {
            provider: provider.to_string(),
            model: "test-model".to_string(),
            api_key: api_key.map(ToString::to_string),
            base_url: base_url.map(ToString::to_string),
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_frame_data() {
        assert_eq!(frame_data("event: x\ndata: {\"a\":1}\n\n"), Some("{\"a\":1}".into()));
        assert_eq!(frame_data(": keep-alive\n\n"), None);
        assert_eq!(frame_data("data: a\ndata: b\n"), Some("a\nb".into()));
    }

    #[test]
    fn test_find_double_newline() {
        assert_eq!(find_double_newline(b"data: x\n\nrest"), Some(7));
        assert_eq!(find_double_newline(b"data: x\n"), None);
    }

    #[test]
    fn test_gemini_requires_key() {
        let err = build_provider(&ai_config("gemini", None, None)).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn test_gemini_provider_built() {
        let provider = build_provider(&ai_config("gemini", Some("k"), None)).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), "test-model");
    }

    #[test]
    fn test_local_openai_compatible_without_key() {
        let provider =
            build_provider(&ai_config("openai", None, Some("http://localhost:11434"))).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
