//! OpenAI Chat Completions API provider.
//!
//! This module implements [`LatexProvider`] for any endpoint speaking the
//! OpenAI Chat Completions protocol (`/v1/chat/completions`), with both
//! blocking and streaming responses.

use futures::StreamExt;
use serde_json::{Value, json};

use super::{
    ChunkStream, GenerationRequest, LatexProvider, MAX_OUTPUT_TOKENS, Provider, ProviderError,
    TEMPERATURE, TOP_P, error_from_response, sse_data,
};

/// Provider for OpenAI-compatible Chat Completions APIs.
#[derive(Clone)]
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatCompletionsProvider {
    /// Create a new Chat Completions provider.
    #[must_use]
    pub fn new(provider: Provider, base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            base_url,
            api_key,
            model,
        }
    }

    fn request(&self, req: &GenerationRequest, stream: bool) -> reqwest::RequestBuilder {
        let url = self.provider.build_chat_url(&self.base_url);
        let mut rb = self
            .http
            .post(&url)
            .json(&request_body(&self.model, req, stream));
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }
        rb
    }
}

fn request_body(model: &str, req: &GenerationRequest, stream: bool) -> Value {
    json!({
        "model": model,
        "stream": stream,
        "temperature": TEMPERATURE,
        "top_p": TOP_P,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "messages": [
            { "role": "system", "content": req.system },
            { "role": "user", "content": req.prompt }
        ]
    })
}

/// Assistant text of a non-streaming completion.
fn extract_message(v: &Value) -> Result<String, ProviderError> {
    let choice = &v["choices"][0];
    if choice.is_null() {
        return Err(ProviderError::Malformed("response has no choices".to_string()));
    }
    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(ProviderError::Blocked("content_filter".to_string()));
    }
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Text delta of one streaming chunk, `None` for the `[DONE]` sentinel.
fn extract_delta(data: &str) -> Option<Result<String, ProviderError>> {
    if data == "[DONE]" {
        return None;
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(ProviderError::Malformed(e.to_string()))),
    };
    if let Some(msg) = v.pointer("/error/message").and_then(Value::as_str) {
        return Some(Err(ProviderError::Malformed(msg.to_string())));
    }
    let text = v["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or_default();
    Some(Ok(text.to_string()))
}

#[async_trait::async_trait]
impl LatexProvider for ChatCompletionsProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let text = extract_message(&v)?;
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

        let chunks = sse_data(resp)
            .map(|data| match data {
                Ok(data) => extract_delta(&data),
                Err(e) => Some(Err(e)),
            })
            .take_while(|item| std::future::ready(item.is_some()))
            .filter_map(|item| async move {
                match item {
                    Some(Ok(t)) if t.is_empty() => None,
                    other => other,
                }
            });
        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = request_body("gpt-4o", &GenerationRequest::new("sys", "hi"), true);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_extract_message() {
        let v = json!({ "choices": [{ "message": { "content": "\\section{A}" }, "finish_reason": "stop" }] });
        assert_eq!(extract_message(&v).unwrap(), "\\section{A}");
        assert!(matches!(
            extract_message(&json!({ "choices": [] })),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_extract_delta() {
        let chunk = r#"{"choices":[{"delta":{"content":"\\["}}]}"#;
        assert_eq!(extract_delta(chunk).unwrap().unwrap(), "\\[");
        assert!(extract_delta("[DONE]").is_none());
        assert!(matches!(extract_delta("{not json"), Some(Err(_))));
    }
}
