//! Provider-specific configuration and detection.
//!
//! This module handles differences between AI API providers: which wire
//! protocol they speak, their default endpoints and how URLs are built.

/// Supported AI providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini (generativelanguage.googleapis.com)
    Gemini,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Together AI (together.ai, together.xyz)
    TogetherAI,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider (local servers, proxies)
    Generic,
}

impl Provider {
    /// Google's public Generative Language endpoint.
    pub const GEMINI_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";
    /// `OpenAI`'s public endpoint.
    pub const OPENAI_BASE_URL: &'static str = "https://api.openai.com";

    /// Resolve the provider from the configured name and optional base URL.
    ///
    /// `gemini` always maps to [`Provider::Gemini`]; `openai` means "any
    /// OpenAI-compatible endpoint" and is refined from the base URL.
    #[must_use]
    pub fn from_config(name: &str, base_url: Option<&str>) -> Self {
        if name.eq_ignore_ascii_case("gemini") {
            return Self::Gemini;
        }
        base_url.map_or(Self::OpenAI, Self::detect_from_url)
    }

    /// Detect an OpenAI-compatible provider from its base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pitorro::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://api.groq.com/openai");
    /// assert_eq!(provider, Provider::Groq);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("together.ai") || lower.contains("together.xyz") {
            Self::TogetherAI
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else if lower.contains("generativelanguage.googleapis.com") {
            Self::Gemini
        } else {
            Self::Generic
        }
    }

    /// Default base URL when none is configured.
    #[must_use]
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some(Self::GEMINI_BASE_URL),
            Self::OpenAI => Some(Self::OPENAI_BASE_URL),
            Self::OpenRouter | Self::TogetherAI | Self::Groq | Self::Generic => None,
        }
    }

    /// Whether calls need an API key.
    ///
    /// Generic endpoints (e.g. a local server) may run without one.
    #[must_use]
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Generic)
    }

    /// Build the chat completions URL for OpenAI-compatible providers.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL (trailing slash tolerated)
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    /// Build the Gemini `generateContent` (or streaming) URL for a model.
    #[must_use]
    pub fn build_gemini_url(base_url: &str, model: &str, stream: bool) -> String {
        let base = base_url.trim_end_matches('/');
        let model = model.trim_start_matches("models/");
        if stream {
            format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/v1beta/models/{model}:generateContent")
        }
    }
}
