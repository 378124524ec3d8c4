//! OpenAI Responses API provider with the hosted web search tool.

use super::{
    CompactRequest, CompactResponse, Level, Provider, ProviderError, SearchRequest,
    SearchResponse, TokenUsage,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openai";

/// OpenAI Responses API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider against the public API.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com", timeout)
    }

    /// Create with custom base URL (for Azure OpenAI or compatible gateways).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponsesResponse, ProviderError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ProviderError::new(PROVIDER_NAME, format!("API error: {}", error_message(&body)))
                    .with_status(status.as_u16()),
            );
        }

        response.json().await.map_err(|e| {
            ProviderError::new(PROVIDER_NAME, format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ProviderError> {
        let start = Instant::now();
        let body = ResponsesRequest::from(&request);

        let response = self.post("/v1/responses", &body).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let usage = response.usage.as_ref().map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(SearchResponse {
            provider: PROVIDER_NAME.into(),
            text: response.output_text(),
            response_id: response.id,
            usage: usage.unwrap_or_default(),
            latency_ms,
        })
    }

    async fn compact(&self, request: CompactRequest) -> Result<CompactResponse, ProviderError> {
        let response = self.post("/v1/responses/compact", &request).await?;
        Ok(CompactResponse {
            response_id: response.id,
        })
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::new(PROVIDER_NAME, format!("Request timed out: {}", e))
    } else {
        ProviderError::new(PROVIDER_NAME, format!("Request failed: {}", e))
    }
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    tools: Vec<WebSearchTool>,
    reasoning: Reasoning,
    text: TextOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_response_id: Option<&'a str>,
}

impl<'a> From<&'a SearchRequest> for ResponsesRequest<'a> {
    fn from(request: &'a SearchRequest) -> Self {
        Self {
            model: &request.model,
            input: &request.input,
            tools: vec![WebSearchTool {
                kind: "web_search",
                search_context_size: request.search_context_size,
            }],
            reasoning: Reasoning {
                effort: request.reasoning_effort,
            },
            text: TextOptions {
                verbosity: request.verbosity,
            },
            instructions: request.instructions.as_deref(),
            store: request.store,
            previous_response_id: request.previous_response_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    kind: &'static str,
    search_context_size: Level,
}

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: Level,
}

#[derive(Debug, Serialize)]
struct TextOptions {
    verbosity: Level,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

impl ResponsesResponse {
    /// Concatenate the `output_text` parts of every message item.
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(previous: Option<&str>) -> SearchRequest {
        SearchRequest {
            model: "gpt-5".into(),
            input: "What changed in Rust 1.80?".into(),
            search_context_size: Level::High,
            reasoning_effort: Level::Low,
            verbosity: Level::Medium,
            instructions: Some("Answer in bullet points".into()),
            store: true,
            previous_response_id: previous.map(String::from),
        }
    }

    #[test]
    fn test_responses_request_serialization() {
        let search = request(Some("resp_123"));
        let json = serde_json::to_value(ResponsesRequest::from(&search)).unwrap();

        assert_eq!(json["model"], "gpt-5");
        assert_eq!(json["tools"][0]["type"], "web_search");
        assert_eq!(json["tools"][0]["search_context_size"], "high");
        assert_eq!(json["reasoning"]["effort"], "low");
        assert_eq!(json["text"]["verbosity"], "medium");
        assert_eq!(json["store"], true);
        assert_eq!(json["previous_response_id"], "resp_123");
        assert_eq!(json["instructions"], "Answer in bullet points");
    }

    #[test]
    fn test_first_turn_omits_previous_id() {
        let search = request(None);
        let json = serde_json::to_string(&ResponsesRequest::from(&search)).unwrap();
        assert!(!json.contains("previous_response_id"));
    }

    #[test]
    fn test_output_text_extraction() {
        let body = r#"{
            "id": "resp_abc",
            "output": [
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Rust 1.80 stabilized LazyCell.", "annotations": []}
                ]}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 30, "total_tokens": 150}
        }"#;

        let response: ResponsesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.id, "resp_abc");
        assert_eq!(response.output_text(), "Rust 1.80 stabilized LazyCell.");
        assert_eq!(response.usage.unwrap().total_tokens, 150);
    }

    #[test]
    fn test_missing_usage_is_tolerated() {
        let response: ResponsesResponse =
            serde_json::from_str(r#"{"id": "resp_x", "output": []}"#).unwrap();
        assert!(response.usage.is_none());
        assert!(response.output_text().is_empty());
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
        assert_eq!(error_message("upstream exploded"), "upstream exploded");
    }
}
