//! Google Gemini function-calling adapter.

use std::{env, fmt, time::Duration};

use agent_primitives::SchemaFormat;
use async_trait::async_trait;
use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::http_client::{JsonClient, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, FunctionCall, GenerationRequest, ModelAdapter,
    ModelResponse,
};

/// Environment variable used when loading configuration automatically.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Model used when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Configuration for the Gemini adapter.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl GeminiConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Loads the API key from the `GEMINI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(GEMINI_API_KEY_ENV).ok();
        cfg
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url("Gemini", base_url.as_ref())?;
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

/// Google Gemini adapter that calls the official API over HTTPS.
pub struct GeminiAdapter {
    client: JsonClient,
    base_endpoint: String,
    metadata: AdapterMetadata,
    api_key: String,
    default_temperature: Option<f32>,
}

impl fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("model", &self.metadata.model())
            .field("base_endpoint", &self.base_endpoint)
            .finish_non_exhaustive()
    }
}

impl GeminiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing.
    pub fn new(config: GeminiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdapterError::configuration("Gemini adapter requires an API key"))?;

        let metadata = AdapterMetadata::new("gemini", config.model.clone(), SchemaFormat::Gemini);
        let base_endpoint = format!(
            "{}v1beta/models/{}:generateContent",
            config.base_url, config.model
        );

        Ok(Self {
            client: JsonClient::new(config.timeout),
            base_endpoint,
            metadata,
            api_key,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let system_instruction = request.system_prompt().map(|prompt| SystemInstruction {
            parts: vec![Part::text(prompt)],
        });

        let tools = if request.tools().is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: request.tools().to_vec(),
            }]
        };

        let generation_config = if request.temperature().is_some()
            || self.default_temperature.is_some()
            || request.max_output_tokens().is_some()
        {
            Some(GenerationConfig {
                temperature: request.temperature().or(self.default_temperature),
                max_output_tokens: request.max_output_tokens(),
            })
        } else {
            None
        };

        GenerateContentRequest {
            system_instruction,
            contents: vec![Content {
                role: "user".to_owned(),
                parts: vec![Part::text(request.prompt())],
            }],
            tools,
            generation_config,
        }
    }

    fn build_uri(&self) -> AdapterResult<Uri> {
        format!("{}?key={}", self.base_endpoint, self.api_key)
            .parse::<Uri>()
            .map_err(|err| AdapterError::configuration(format!("invalid Gemini endpoint: {err}")))
    }
}

#[async_trait]
impl ModelAdapter for GeminiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn generate(&self, request: GenerationRequest) -> AdapterResult<ModelResponse> {
        let payload = self.build_request(&request);
        let endpoint = self.build_uri()?;

        let response: GenerateContentResponse =
            self.client.post("Gemini", endpoint, &[], &payload).await?;

        let response = into_model_response(response);
        debug!(
            model = self.metadata.model(),
            calls = response.function_calls.len(),
            "gemini response received"
        );
        Ok(response)
    }
}

/// Flattens the first candidate's parts; function calls keep their order.
fn into_model_response(response: GenerateContentResponse) -> ModelResponse {
    let mut text = Vec::new();
    let mut function_calls = Vec::new();

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    for part in parts {
        if let Some(call) = part.function_call {
            function_calls.push(FunctionCall::new(call.name, call.args));
        }
        if let Some(fragment) = part.text {
            text.push(fragment);
        }
    }

    ModelResponse {
        text: text.join("\n"),
        function_calls,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPart>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_owned()),
            function_call: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new(GeminiConfig::new("gemini-1.5-pro").with_api_key("test_key"))
            .expect("adapter")
    }

    #[test]
    fn api_key_is_required() {
        let err = GeminiAdapter::new(GeminiConfig::new("gemini-1.5-pro"))
            .expect_err("missing key should error");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn metadata_declares_gemini_schema() {
        assert_eq!(adapter().metadata().schema_format(), SchemaFormat::Gemini);
    }

    #[test]
    fn build_request_wraps_function_declarations() {
        let request = GenerationRequest::new("organise the folder")
            .unwrap()
            .with_system_prompt("You are an automation agent")
            .with_tools(vec![json!({ "name": "scan_directory" })]);

        let payload = serde_json::to_value(adapter().build_request(&request)).unwrap();
        assert_eq!(
            payload["tools"][0]["functionDeclarations"][0]["name"],
            "scan_directory"
        );
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "You are an automation agent"
        );
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "organise the folder");
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn build_request_omits_empty_tools() {
        let request = GenerationRequest::new("hello").unwrap().with_temperature(0.1);
        let payload = serde_json::to_value(adapter().build_request(&request)).unwrap();
        assert!(payload.get("tools").is_none());
        assert!(payload["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn response_keeps_call_order_and_text() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "get_directory_name", "args": {} } },
                        { "text": "then scanning" },
                        { "functionCall": { "name": "scan_directory", "args": { "path": "/tmp", "depth": 1 } } }
                    ]
                }
            }]
        });

        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let response = into_model_response(parsed);
        let names: Vec<_> = response.function_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["get_directory_name", "scan_directory"]);
        assert_eq!(response.function_calls[1].args["path"], "/tmp");
        assert_eq!(response.text, "then scanning");
    }

    #[test]
    fn response_without_candidates_is_empty() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(into_model_response(parsed).is_empty());
    }
}
