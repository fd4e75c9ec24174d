//! `OpenAI`-compatible chat completions adapter.
//!
//! The same wire protocol serves `OpenAI` and `DeepSeek`; [`OpenAiConfig::deepseek`]
//! presets the base URL, key variable, and provider label for the latter.

use std::{env, fmt, time::Duration};

use agent_primitives::SchemaFormat;
use async_trait::async_trait;
use hyper::Uri;
use hyper::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::http_client::{JsonClient, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, FunctionCall, GenerationRequest, ModelAdapter,
    ModelResponse,
};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the `DeepSeek` API key.
pub const DEEPSEEK_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Model used when none is configured.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Model used for the `DeepSeek` preset when none is configured.
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Configuration for the `OpenAI`-compatible adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    provider: &'static str,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: "openai",
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(OPENAI_API_KEY_ENV).ok();
        cfg
    }

    /// `DeepSeek` preset; the key is read from `DEEPSEEK_API_KEY`.
    #[must_use]
    pub fn deepseek(model: impl Into<String>) -> Self {
        Self {
            provider: "deepseek",
            api_key: env::var(DEEPSEEK_API_KEY_ENV).ok(),
            base_url: "https://api.deepseek.com/".to_owned(),
            ..Self::new(model)
        }
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url("OpenAI", base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// `OpenAI`-compatible adapter that calls the chat completions API over HTTPS.
pub struct OpenAiAdapter {
    client: JsonClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: String,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("provider", &self.metadata.provider())
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or
    /// the endpoint cannot be formed.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config.api_key.ok_or_else(|| {
            AdapterError::configuration(format!("{} adapter requires an API key", config.provider))
        })?;

        let metadata = AdapterMetadata::new(config.provider, config.model, SchemaFormat::OpenAi);
        let endpoint = format!("{}v1/chat/completions", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
            })?;

        Ok(Self {
            client: JsonClient::new(config.timeout),
            endpoint,
            metadata,
            api_key,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt() {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", request.prompt()));

        let tools: Vec<ToolSpec> = request
            .tools()
            .iter()
            .cloned()
            .map(|function| ToolSpec {
                kind: "function",
                function,
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages,
            tools,
            tool_choice,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn generate(&self, request: GenerationRequest) -> AdapterResult<ModelResponse> {
        let payload = self.build_request(&request);
        let headers = [(AUTHORIZATION, format!("Bearer {}", self.api_key))];

        let response: ChatCompletionResponse = self
            .client
            .post("OpenAI", self.endpoint.clone(), &headers, &payload)
            .await?;

        let response = into_model_response(response);
        debug!(
            provider = self.metadata.provider(),
            model = self.metadata.model(),
            calls = response.function_calls.len(),
            "chat completion received"
        );
        Ok(response)
    }
}

/// Reads the first choice. Tool call arguments arrive as a JSON string; a
/// call whose arguments do not decode to an object is dropped.
fn into_model_response(response: ChatCompletionResponse) -> ModelResponse {
    let Some(choice) = response.choices.into_iter().next() else {
        return ModelResponse::default();
    };

    let function_calls = choice
        .message
        .tool_calls
        .into_iter()
        .filter_map(|call| {
            let arguments = call.function.arguments.trim();
            if arguments.is_empty() {
                return Some(FunctionCall::new(call.function.name, Map::new()));
            }
            match serde_json::from_str::<Map<String, Value>>(arguments) {
                Ok(args) => Some(FunctionCall::new(call.function.name, args)),
                Err(err) => {
                    warn!(tool = %call.function.name, %err, "dropping tool call with undecodable arguments");
                    None
                }
            }
        })
        .collect();

    ModelResponse {
        text: choice.message.content.unwrap_or_default(),
        function_calls,
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: content.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
