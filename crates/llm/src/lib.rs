use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::{header::HeaderValue, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tokio::time::{sleep, Duration};

mod local;

pub use local::NOT_FOUND_ANSWER;

const MAX_RETRIES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
    Anthropic,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Local => "local",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.0-flash",
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-haiku-latest",
            LlmProvider::Local => "local-extractive",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "local" | "offline" => Ok(LlmProvider::Local),
            other => Err(anyhow!("unknown llm provider {other}")),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

impl LlmRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            user: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Failures the HTTP layer has already settled. Either the provider refused
/// the request outright or it kept failing through every retry, so callers
/// should not send the same request again.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} returned error (status {status}): {body}")]
    Rejected {
        provider: String,
        status: StatusCode,
        body: String,
    },
    #[error("{provider} returned {status} after {} retries", MAX_RETRIES)]
    Throttled { provider: String, status: StatusCode },
    #[error("{provider} request failed after {} retries", MAX_RETRIES)]
    Unreachable {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ProviderError {
    /// True when `err` or any of its causes is a [`ProviderError`].
    pub fn is_final(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.is::<ProviderError>())
    }
}

/// Blocking text generation. Implemented by [`LlmClient`] and by test stubs.
pub trait ChatModel {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Human readable `provider:model` tag shown next to answers.
    fn label(&self) -> String;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
    runtime: Arc<Runtime>,
}

#[derive(Clone)]
enum ProviderConfig {
    Gemini { api_key: String, base_url: String },
    OpenAi { api_key: String, base_url: String },
    Anthropic { api_key: String, max_tokens: u32 },
    Local,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let config = match provider {
            LlmProvider::Gemini => ProviderConfig::Gemini {
                api_key: read_api_key(&["GEMINI_API_KEY", "API_KEY"])?,
                base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
            },
            LlmProvider::OpenAi => ProviderConfig::OpenAi {
                api_key: read_api_key(&["OPENAI_API_KEY"])?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            LlmProvider::Anthropic => ProviderConfig::Anthropic {
                api_key: read_api_key(&["ANTHROPIC_API_KEY"])?,
                max_tokens: env::var("ANTHROPIC_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1024),
            },
            LlmProvider::Local => ProviderConfig::Local,
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to create tokio runtime")?;
        Ok(Self {
            http: Client::new(),
            provider,
            model,
            config,
            runtime: Arc::new(runtime),
        })
    }

    /// Offline client backed by the extractive local responder.
    pub fn local() -> Result<Self> {
        Self::new(LlmProvider::Local, LlmProvider::Local.default_model())
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        tracing::debug!(
            provider = %self.provider,
            model = %self.model,
            prompt_chars = req.user.len(),
            "llm request"
        );
        match &self.config {
            ProviderConfig::Gemini { api_key, base_url } => {
                self.chat_gemini(api_key, base_url, req).await
            }
            ProviderConfig::OpenAi { api_key, base_url } => {
                self.chat_openai(api_key, base_url, req).await
            }
            ProviderConfig::Anthropic {
                api_key,
                max_tokens,
            } => self.chat_anthropic(api_key, *max_tokens, req).await,
            ProviderConfig::Local => Ok(local::respond(req)),
        }
    }

    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        self.runtime.block_on(self.chat(req))
    }

    async fn chat_gemini(
        &self,
        api_key: &str,
        base_url: &str,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let mut payload = json!({
            "contents": [ { "role": "user", "parts": [ { "text": req.user } ] } ],
        });
        if let Some(system) = &req.system {
            payload["systemInstruction"] = json!({ "parts": [ { "text": system } ] });
        }
        let url = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            self.model
        );
        let body = self
            .send_with_retry("gemini", || {
                self.http
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&payload)
            })
            .await?;
        let response: GeminiResponse =
            serde_json::from_value(body).context("failed to decode gemini response")?;
        let text = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("missing text in Gemini response"))?;
        let usage = response.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    async fn chat_openai(
        &self,
        api_key: &str,
        base_url: &str,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let body = self
            .send_with_retry("openai", || {
                self.http.post(&url).bearer_auth(api_key).json(&payload)
            })
            .await?;
        let response: ChatResponse =
            serde_json::from_value(body).context("failed to decode openai response")?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("missing text in OpenAI response"))?;
        let usage = response.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    async fn chat_anthropic(
        &self,
        api_key: &str,
        max_tokens: u32,
        req: &LlmRequest,
    ) -> Result<LlmResponse> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [ { "role": "user", "content": req.user } ],
        });
        if let Some(system) = &req.system {
            payload["system"] = json!(system);
        }
        let body = self
            .send_with_retry("anthropic", || {
                self.http
                    .post("https://api.anthropic.com/v1/messages")
                    .header("x-api-key", api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&payload)
            })
            .await?;
        let response: AnthropicResponse =
            serde_json::from_value(body).context("failed to decode anthropic response")?;
        let text = response
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("missing text in Anthropic response"))?;
        let usage = response.usage.unwrap_or_default();
        Ok(LlmResponse {
            content: text,
            prompt_tokens: usage.input_tokens.unwrap_or(0),
            completion_tokens: usage.output_tokens.unwrap_or(0),
        })
    }

    /// Sends the request built by `build`, retrying transport errors, 429s
    /// and 5xx responses with exponential backoff.
    async fn send_with_retry(
        &self,
        provider: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Value> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match build().send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > MAX_RETRIES {
                        return Err(ProviderError::Unreachable {
                            provider: provider.to_string(),
                            source: err,
                        }
                        .into());
                    }
                    tracing::warn!(provider, attempt, error = %err, "llm transport error, retrying");
                    sleep(backoff_delay(attempt, None)).await;
                    continue;
                }
            };
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt > MAX_RETRIES {
                    return Err(ProviderError::Throttled {
                        provider: provider.to_string(),
                        status,
                    }
                    .into());
                }
                let wait = backoff_delay(attempt, response.headers().get("retry-after"));
                tracing::warn!(provider, attempt, %status, ?wait, "llm request throttled, retrying");
                sleep(wait).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(ProviderError::Rejected {
                    provider: provider.to_string(),
                    status,
                    body,
                }
                .into());
            }
            return serde_json::from_str(&body)
                .with_context(|| format!("failed to decode {provider} response"));
        }
    }
}

impl ChatModel for LlmClient {
    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.chat_blocking(request)
    }

    fn label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

fn backoff_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs.max(1));
    }
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500u64 << capped)
}

fn read_api_key(vars: &[&str]) -> Result<String> {
    for var in vars {
        if let Ok(value) = env::var(var) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            check_key_shape(var, &value);
            return Ok(value);
        }
    }
    Err(anyhow!("{} is not set", vars.join(" or ")))
}

fn check_key_shape(var: &str, value: &str) {
    let expected = if var.contains("ANTHROPIC") {
        "sk-ant-"
    } else if var.contains("OPENAI") {
        "sk-"
    } else if var.contains("GEMINI") {
        "AI"
    } else {
        return;
    };
    if !value.starts_with(expected) {
        tracing::warn!(var, "api key does not start with the usual '{expected}' prefix");
    }
}

#[derive(Default, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Default, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Default, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_tokens: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse() {
        assert_eq!("Gemini".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert_eq!("claude".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert!("mistral".parse::<LlmProvider>().is_err());
        assert_eq!(LlmProvider::Gemini.default_model(), "gemini-2.0-flash");
    }

    #[test]
    fn backoff_prefers_retry_after() {
        let header = HeaderValue::from_static("7");
        assert_eq!(backoff_delay(1, Some(&header)), Duration::from_secs(7));
        assert_eq!(backoff_delay(1, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(40, None), Duration::from_millis(16_000));
    }

    #[test]
    fn gemini_payload_decodes() {
        let raw = json!({
            "candidates": [ { "content": { "parts": [ { "text": "Hello" }, { "text": " there" } ] } } ],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(12));
        let candidates = parsed.candidates.unwrap();
        let parts = &candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn settled_failures_are_found_through_context() {
        let err: anyhow::Error = ProviderError::Rejected {
            provider: "openai".to_string(),
            status: StatusCode::UNAUTHORIZED,
            body: "invalid api key".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "openai returned error (status 401 Unauthorized): invalid api key"
        );
        let wrapped = err.context("llm call failed");
        assert!(ProviderError::is_final(&wrapped));
        assert!(!ProviderError::is_final(&anyhow!("connection reset")));
        let throttled: anyhow::Error = ProviderError::Throttled {
            provider: "gemini".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
        }
        .into();
        assert_eq!(
            throttled.to_string(),
            "gemini returned 429 Too Many Requests after 4 retries"
        );
    }

    #[test]
    fn local_client_needs_no_key() {
        let client = LlmClient::local().unwrap();
        assert_eq!(client.label(), "local:local-extractive");
        let response = client
            .complete(&LlmRequest::user("Summarize the following document in 5 words:\n\none two three four five six seven"))
            .unwrap();
        assert_eq!(response.content, "one two three four five");
    }
}
