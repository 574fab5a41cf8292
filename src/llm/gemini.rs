//! Google Gemini `generateContent` provider.

use futures::StreamExt;
use serde_json::{Value, json};

use super::{
    ChunkStream, GenerationRequest, LatexProvider, MAX_OUTPUT_TOKENS, Provider, ProviderError,
    TEMPERATURE, TOP_K, TOP_P, error_from_response, sse_data,
};

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Provider backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    fn request(&self, req: &GenerationRequest, stream: bool) -> reqwest::RequestBuilder {
        let url = Provider::build_gemini_url(&self.base_url, &self.model, stream);
        let mut rb = self.http.post(url).json(&request_body(req));
        if let Some(k) = &self.api_key {
            rb = rb.header("x-goog-api-key", k);
        }
        rb
    }
}

/// JSON body for `generateContent` / `streamGenerateContent`.
fn request_body(req: &GenerationRequest) -> Value {
    let safety: Vec<Value> = SAFETY_CATEGORIES
        .iter()
        .map(|c| json!({ "category": c, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": req.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "topP": TOP_P,
            "topK": TOP_K,
            "maxOutputTokens": MAX_OUTPUT_TOKENS
        },
        "safetySettings": safety
    })
}

/// Concatenated text of the first candidate.
///
/// Returns `Ok("")` for a candidate without text (streaming keep-alive chunks),
/// and [`ProviderError::Blocked`] when the prompt or answer was filtered.
fn extract_text(v: &Value) -> Result<String, ProviderError> {
    if let Some(reason) = v.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(ProviderError::Blocked(reason.to_string()));
    }

    let candidate = v
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| ProviderError::Malformed("response has no candidates".to_string()))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty()
        && let Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) =
            candidate.get("finishReason").and_then(Value::as_str)
    {
        return Err(ProviderError::Blocked(reason.to_string()));
    }

    Ok(text)
}

#[async_trait::async_trait]
impl LatexProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<String, ProviderError> {
        let resp = self.request(req, false).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let text = extract_text(&v)?;
        if text.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text)
    }

    async fn stream(&self, req: &GenerationRequest) -> Result<ChunkStream, ProviderError> {
        let resp = self.request(req, true).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let chunks = sse_data(resp).filter_map(|data| async move {
            let text = data.and_then(|data| {
                let v: Value = serde_json::from_str(&data)
                    .map_err(|e| ProviderError::Malformed(e.to_string()))?;
                extract_text(&v)
            });
            match text {
                Ok(t) if t.is_empty() => None,
                other => Some(other),
            }
        });
        Ok(Box::pin(chunks))
    }
}
