use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// One request to the hosted model. The schema hint describes the JSON shape
/// the caller will validate the reply against.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub schema_hint: Option<serde_json::Value>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            schema_hint: None,
            temperature: 0.0,
            timeout,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema_hint(mut self, schema: serde_json::Value) -> Self {
        self.schema_hint = Some(schema);
        self
    }

    /// System text including the schema hint, as sent to chat-style backends.
    pub fn system_text(&self) -> Option<String> {
        match (&self.system, &self.schema_hint) {
            (Some(sys), Some(schema)) => Some(format!(
                "{}\nThe reply must be JSON matching this schema: {}",
                sys, schema
            )),
            (Some(sys), None) => Some(sys.clone()),
            (None, Some(schema)) => Some(format!("Reply with JSON matching this schema: {}", schema)),
            (None, None) => None,
        }
    }
}

/// The single capability the pipeline needs from a language model:
/// `complete(prompt, schema hint, temperature, timeout) -> text`.
/// Nothing it returns is trusted.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }

    /// `OPENAI_BASE_URL` (default the public endpoint) and `OPENAI_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Some(Self::new(base_url, Some(api_key)))
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = request.system_text() {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .timeout(request.timeout)
            .json(&body);

        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }

        let res = http.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from chat completion response")?;

        Ok(content.to_string())
    }
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client }
    }

    /// `OLLAMA_HOST` as `http://host:port`, defaulting to the local daemon.
    pub fn from_env() -> Self {
        match std::env::var("OLLAMA_HOST") {
            Ok(host) if !host.trim().is_empty() => {
                let (host, port) = split_host_port(host.trim());
                Self::new(ollama_rs::Ollama::new(host, port))
            }
            _ => Self::new(ollama_rs::Ollama::default()),
        }
    }
}

const OLLAMA_DEFAULT_PORT: u16 = 11434;

fn split_host_port(raw: &str) -> (String, u16) {
    let trimmed = raw.trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    match with_scheme.rsplit_once(':') {
        Some((host, port)) if !host.ends_with("http") && !host.ends_with("https") => {
            match port.parse::<u16>() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (with_scheme, OLLAMA_DEFAULT_PORT),
            }
        }
        _ => (with_scheme, OLLAMA_DEFAULT_PORT),
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};

        let mut messages = Vec::new();
        if let Some(sys) = request.system_text() {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));

        let res = self
            .client
            .send_chat_messages(ChatMessageRequest::new(request.model.clone(), messages))
            .await?;

        Ok(res.message.content)
    }
}

/// Client-side quota in front of another provider.
pub struct RateLimitedProvider {
    inner: Arc<dyn LLMProvider>,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, per_minute: NonZeroU32) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

#[async_trait]
impl LLMProvider for RateLimitedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.limiter.until_ready().await;
        self.inner.complete(request).await
    }
}
