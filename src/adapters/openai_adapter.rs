//! OpenAI-compatible chat completions transport.
//!
//! Every configured provider speaks `POST {base_url}/chat/completions`
//! with bearer authentication.

use crate::domain::error::StockpickError;
use crate::domain::llm::{ChatRequest, Provider};
use crate::ports::chat_port::ChatPort;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    pub fn new(timeout: Duration) -> Result<Self, StockpickError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StockpickError::Llm {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    fn endpoint(base_url: &str) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }

    fn body<'a>(provider: &'a Provider, request: &'a ChatRequest) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(CompletionMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(CompletionMessage {
            role: "user",
            content: &request.prompt,
        });
        CompletionRequest {
            model: &provider.model_id,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

fn first_content(response: CompletionResponse) -> Result<String, StockpickError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| StockpickError::Llm {
            reason: "response contained no choices".into(),
        })
}

impl ChatPort for OpenAiAdapter {
    fn complete(&self, provider: &Provider, request: &ChatRequest) -> Result<String, StockpickError> {
        let url = Self::endpoint(&provider.base_url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&provider.api_key)
            .json(&Self::body(provider, request))
            .send()
            .map_err(|e| StockpickError::Llm {
                reason: format!("request to {} failed: {e}", provider.name),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(provider = %provider.id, %status, "chat completion rejected");
            return Err(StockpickError::Llm {
                reason: format!("{} returned {status}: {text}", provider.name),
            });
        }

        let parsed: CompletionResponse = response.json().map_err(|e| StockpickError::Llm {
            reason: format!("invalid response from {}: {e}", provider.name),
        })?;
        let content = first_content(parsed)?;
        debug!(
            provider = %provider.id,
            model = %provider.model_id,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "chat completion"
        );
        Ok(content)
    }
}
