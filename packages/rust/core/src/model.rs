//! Language-model seam and an OpenAI-compatible chat-completions client.
//!
//! The enrichment engine only talks to [`LanguageModel`]. [`OpenAiClient`]
//! implements it for both the public OpenAI API and Azure OpenAI
//! deployments; tests substitute an in-memory model.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use tenderwatch_shared::{ModelConfig, ModelProvider, Result, TenderError};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("tenderwatch/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// A function the model is forced to call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Anything that can answer chat prompts.
pub trait LanguageModel: Send + Sync {
    /// Free-text completion.
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;

    /// Force a single call of `function` and return its arguments object.
    fn call_function(
        &self,
        system: &str,
        user: &str,
        function: &FunctionSpec,
    ) -> impl Future<Output = Result<Value>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<[Tool<'a>; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// System prompt followed by the user prompt.
fn conversation<'a>(system: &'a str, user: &'a str) -> [ChatMessage<'a>; 2] {
    [
        ChatMessage {
            role: "system",
            content: system,
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a FunctionSpec,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolChoiceFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ToolChoiceFunction<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Absent or `null` when the model answered in text.
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Chat-completions client for OpenAI or Azure OpenAI.
pub struct OpenAiClient {
    client: Client,
    url: String,
    provider: ModelProvider,
    model: String,
    temperature: f64,
    api_key: String,
}

impl OpenAiClient {
    /// Create a client. `api_key` is the resolved secret, never the env var name.
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: completions_url(config)?,
            provider: config.provider,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: api_key.into(),
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<ResponseMessage> {
        let builder = self.client.post(&self.url).json(request);
        let builder = match self.provider {
            ModelProvider::OpenAi => builder.bearer_auth(&self.api_key),
            ModelProvider::Azure => builder.header("api-key", &self.api_key),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TenderError::Network(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(TenderError::Enrichment(format!("model returned HTTP {status}: {excerpt}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TenderError::parse(format!("invalid chat completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| TenderError::Enrichment("model returned no choices".into()))
    }
}

/// Full chat-completions URL for the configured provider.
fn completions_url(config: &ModelConfig) -> Result<String> {
    let endpoint = config.endpoint.trim_end_matches('/');
    match config.provider {
        ModelProvider::OpenAi => Ok(format!("{endpoint}/chat/completions")),
        ModelProvider::Azure => {
            let version = config.api_version.as_deref().ok_or_else(|| {
                TenderError::config("model.api_version is required for the azure provider")
            })?;
            Ok(format!(
                "{endpoint}/openai/deployments/{}/chat/completions?api-version={version}",
                config.model
            ))
        }
    }
}

impl LanguageModel for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: conversation(system, user),
            temperature: self.temperature,
            tools: None,
            tool_choice: None,
        };

        let message = self.send(&request).await?;
        let text = message.content.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Err(TenderError::Enrichment("model returned empty content".into()));
        }
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }

    #[instrument(skip_all, fields(model = %self.model, function = %function.name))]
    async fn call_function(
        &self,
        system: &str,
        user: &str,
        function: &FunctionSpec,
    ) -> Result<Value> {
        let request = ChatRequest {
            model: &self.model,
            messages: conversation(system, user),
            temperature: self.temperature,
            tools: Some([Tool {
                kind: "function",
                function,
            }]),
            tool_choice: Some(ToolChoice {
                kind: "function",
                function: ToolChoiceFunction {
                    name: &function.name,
                },
            }),
        };

        let message = self.send(&request).await?;
        let call = message
            .tool_calls
            .into_iter()
            .flatten()
            .find(|c| c.function.name == function.name)
            .ok_or_else(|| {
                TenderError::Enrichment(format!("model did not call `{}`", function.name))
            })?;

        let arguments: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
            TenderError::Enrichment(format!("function arguments are not valid JSON: {e}"))
        })?;
        if !arguments.is_object() {
            return Err(TenderError::Enrichment("function arguments are not a JSON object".into()));
        }
        Ok(arguments)
    }
}
