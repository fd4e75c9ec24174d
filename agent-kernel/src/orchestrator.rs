//! One prompt, end to end: describe tools, ask the model, parse, dispatch.

use std::sync::Arc;

use agent_adapters::traits::{AdapterError, GenerationRequest, ModelAdapter, ModelResponse};
use agent_primitives::SchemaFormat;
use thiserror::Error;
use tracing::{debug, info};

use crate::dispatcher::{DispatchAborted, DispatchReport, Dispatcher};
use crate::parser::{CallParser, ParseWarning};

/// Errors surfaced by [`Orchestrator::run`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The model could not be reached or answered with garbage.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The dispatch pass stopped at an unresolvable back-reference.
    #[error(transparent)]
    Aborted(#[from] DispatchAborted),
}

/// Result alias for orchestrator runs.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Everything produced by one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Raw model answer.
    pub response: ModelResponse,
    /// Free-text entries the parser dropped.
    pub warnings: Vec<ParseWarning>,
    /// Dispatch pass report.
    pub report: DispatchReport,
}

/// Wires a model adapter to the dispatcher.
pub struct Orchestrator {
    adapter: Arc<dyn ModelAdapter>,
    dispatcher: Dispatcher,
    parser: CallParser,
    system_prompt: Option<String>,
    schema_format: Option<SchemaFormat>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("adapter", self.adapter.metadata())
            .field("parser", &self.parser)
            .field("schema_format", &self.schema_format())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default parser.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>, dispatcher: Dispatcher) -> Self {
        Self {
            adapter,
            dispatcher,
            parser: CallParser::default(),
            system_prompt: None,
            schema_format: None,
        }
    }

    /// Replaces the call parser.
    #[must_use]
    pub fn with_parser(mut self, parser: CallParser) -> Self {
        self.parser = parser;
        self
    }

    /// Sets a system prompt sent with every request.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Renders tools in `format` instead of the adapter's native format.
    #[must_use]
    pub fn with_schema_format(mut self, format: SchemaFormat) -> Self {
        self.schema_format = Some(format);
        self
    }

    /// Returns the schema format tools are rendered in.
    #[must_use]
    pub fn schema_format(&self) -> SchemaFormat {
        self.schema_format
            .unwrap_or_else(|| self.adapter.metadata().schema_format())
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Sends `prompt` with the rendered tool list, then parses and dispatches
    /// whatever calls come back.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Adapter`] when the request is invalid or
    /// the model call fails, and [`OrchestratorError::Aborted`] when the
    /// dispatch pass stops early.
    pub async fn run(&self, prompt: &str) -> OrchestratorResult<RunOutcome> {
        let registry = self.dispatcher.registry();
        let format = self.schema_format();
        let tools = registry.render(format);

        let mut request = GenerationRequest::new(prompt)?.with_tools(tools);
        if let Some(system) = &self.system_prompt {
            request = request.with_system_prompt(system.as_str());
        }

        let metadata = self.adapter.metadata();
        info!(
            provider = metadata.provider(),
            model = metadata.model(),
            %format,
            tools = registry.names().len(),
            "requesting tool calls"
        );
        let response = self.adapter.generate(request).await?;

        let parsed = self.parser.parse(&response, &registry.names());
        debug!(
            calls = parsed.sequence.len(),
            warnings = parsed.warnings.len(),
            "model response parsed"
        );

        let report = self.dispatcher.dispatch(parsed.sequence).await?;
        Ok(RunOutcome {
            response,
            warnings: parsed.warnings,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_adapters::traits::{AdapterMetadata, AdapterResult};
    use agent_primitives::{CapabilityDescriptor, DeclaredType, ParamDecl};
    use agent_tools::arguments::Arguments;
    use agent_tools::registry::{CapabilityRegistry, ToolError};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    use crate::state::CallState;

    struct ScriptedAdapter {
        metadata: AdapterMetadata,
        reply: ModelResponse,
        seen_tools: Mutex<Vec<Value>>,
    }

    impl ScriptedAdapter {
        fn new(format: SchemaFormat, reply: ModelResponse) -> Self {
            Self {
                metadata: AdapterMetadata::new("scripted", "test-model", format),
                reply,
                seen_tools: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelAdapter for ScriptedAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn generate(&self, request: GenerationRequest) -> AdapterResult<ModelResponse> {
            *self.seen_tools.lock().unwrap() = request.tools().to_vec();
            Ok(self.reply.clone())
        }
    }

    fn dispatcher() -> Dispatcher {
        let descriptor = CapabilityDescriptor::builder("echo")
            .documentation("Echo a message.\n\n:param message: Text to echo")
            .param(ParamDecl::new("message", DeclaredType::Str))
            .build()
            .unwrap();
        let registry = CapabilityRegistry::builder()
            .with(descriptor, |args: Arguments| async move {
                Ok::<_, ToolError>(args.get("message").cloned().unwrap_or(Value::Null))
            })
            .unwrap()
            .build();
        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn runs_free_text_reply() {
        let adapter = Arc::new(ScriptedAdapter::new(
            SchemaFormat::OpenAi,
            ModelResponse::from_text("echo(message=\"hi\")\nunknown(x=1)"),
        ));
        let orchestrator = Orchestrator::new(adapter.clone(), dispatcher());

        let outcome = orchestrator.run("say hi").await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.report.count(CallState::Executed), 1);
        assert_eq!(outcome.report.results().get("0"), Some(&json!("hi")));

        let tools = adapter.seen_tools.lock().unwrap().clone();
        assert_eq!(tools[0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn schema_override_wins() {
        let adapter = Arc::new(ScriptedAdapter::new(
            SchemaFormat::OpenAi,
            ModelResponse::default(),
        ));
        let orchestrator = Orchestrator::new(adapter.clone(), dispatcher())
            .with_schema_format(SchemaFormat::Anthropic);

        let outcome = orchestrator.run("nothing to do").await.unwrap();
        assert!(outcome.report.entries().is_empty());

        let tools = adapter.seen_tools.lock().unwrap().clone();
        assert!(tools[0].get("input_schema").is_some());
    }

    #[tokio::test]
    async fn blank_prompt_is_an_adapter_error() {
        let adapter = Arc::new(ScriptedAdapter::new(
            SchemaFormat::Gemini,
            ModelResponse::default(),
        ));
        let err = Orchestrator::new(adapter, dispatcher())
            .run("  ")
            .await
            .expect_err("blank prompt");
        assert!(matches!(err, OrchestratorError::Adapter(AdapterError::InvalidRequest { .. })));
    }
}
