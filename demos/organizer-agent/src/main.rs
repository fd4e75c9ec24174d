//! Organizer agent: asks a model to tidy a directory and work through its
//! todo list, then runs the calls it chooses.

mod capabilities;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskpilot::adapters::gemini::{GeminiAdapter, GeminiConfig};
use taskpilot::adapters::openai::{OpenAiAdapter, OpenAiConfig};
use taskpilot::adapters::traits::ModelAdapter;
use taskpilot::config::{AgentConfig, Provider};
use taskpilot::kernel::{
    CallParser, DispatchReport, Dispatcher, Orchestrator, OrchestratorError, RunOutcome,
};
use taskpilot::primitives::SchemaFormat;
use taskpilot::tools::schema;
use tracing::{info, warn};

use crate::capabilities::Organizer;

const SYSTEM_PROMPT: &str = "You are a file management agent. Answer only with the sequence \
of tool calls needed to finish the task, one call per step. To reuse the result of an earlier \
call, pass the string <result_from_N> where N is that call's zero-based position.";

const DEFAULT_PROMPT: &str = "Get the working directory, list its files, identify their types \
and move them into folders by type. Then read todo.txt and carry out its tasks.";

/// Command line for the organizer agent.
#[derive(Parser, Debug)]
#[command(name = "organizer-agent")]
#[command(version, about = "Ask a model to tidy a directory and work through its todo list")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory the agent works in
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one prompt and run the returned calls
    Run {
        /// Prompt to send instead of the default organizing task
        prompt: Option<String>,
    },
    /// Run the default prompt every day at the configured time
    Schedule,
    /// Print the tool descriptions sent to the model
    Tools {
        /// Schema format: gemini, openai or anthropic
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
    },
}

/// Tool schema format each provider understands natively.
const fn native_format(provider: Provider) -> SchemaFormat {
    match provider {
        Provider::Gemini => SchemaFormat::Gemini,
        Provider::OpenAi | Provider::DeepSeek => SchemaFormat::OpenAi,
    }
}

fn adapter(config: &AgentConfig) -> Result<Arc<dyn ModelAdapter>> {
    let model = config.model();
    let adapter: Arc<dyn ModelAdapter> = match config.provider {
        Provider::Gemini => Arc::new(GeminiAdapter::new(GeminiConfig::from_env(model))?),
        Provider::OpenAi => Arc::new(OpenAiAdapter::new(OpenAiConfig::from_env(model))?),
        Provider::DeepSeek => Arc::new(OpenAiAdapter::new(OpenAiConfig::deepseek(model))?),
    };
    Ok(adapter)
}

fn orchestrator(config: &AgentConfig, dispatcher: Dispatcher) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::new(adapter(config)?, dispatcher)
        .with_parser(CallParser::new(config.call_ids))
        .with_system_prompt(SYSTEM_PROMPT);
    if let Some(format) = config.schema_format()? {
        orchestrator = orchestrator.with_schema_format(format);
    }
    Ok(orchestrator)
}

fn summarize(report: &DispatchReport) {
    for entry in report.entries() {
        info!(
            pass_id = %report.pass_id(),
            call_id = %entry.call_id(),
            tool = entry.name(),
            state = ?entry.state(),
            outcome = ?entry.outcome(),
            "call settled"
        );
    }
}

async fn run_once(orchestrator: &Orchestrator, prompt: &str) -> Result<()> {
    match orchestrator.run(prompt).await {
        Ok(RunOutcome {
            response,
            warnings,
            report,
        }) => {
            if !response.text.is_empty() {
                info!(text = %response.text, "model reply");
            }
            for warning in &warnings {
                warn!(%warning, "model output line ignored");
            }
            summarize(&report);
            Ok(())
        }
        Err(OrchestratorError::Aborted(aborted)) => {
            summarize(&aborted.report);
            Err(aborted.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "cannot listen for ctrl-c; stop the process to exit");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AgentConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    taskpilot::telemetry::init_tracing(&config.log_filter)?;

    let organizer = Organizer::new(&cli.dir)
        .with_context(|| format!("cannot work in `{}`", cli.dir.display()))?;
    let registry = Arc::new(capabilities::registry(organizer, config.aliases())?);

    match cli.command {
        Command::Tools { format } => {
            let format = match format {
                Some(token) => schema::parse_format(&token)?,
                None => config
                    .schema_format()?
                    .unwrap_or_else(|| native_format(config.provider)),
            };
            let tools = serde_json::Value::Array(registry.render(format));
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        Command::Run { prompt } => {
            let dispatcher = Dispatcher::new(registry).with_max_task_depth(config.max_task_depth);
            let orchestrator = orchestrator(&config, dispatcher)?;
            run_once(&orchestrator, prompt.as_deref().unwrap_or(DEFAULT_PROMPT)).await?;
        }
        Command::Schedule => {
            let schedule = config
                .schedule()?
                .context("configuration has no [schedule] table")?;
            let dispatcher = Dispatcher::new(registry).with_max_task_depth(config.max_task_depth);
            let orchestrator = orchestrator(&config, dispatcher)?;
            info!(at = %schedule.at(), "organizer scheduled");
            schedule
                .run_daily(|| run_once(&orchestrator, DEFAULT_PROMPT), ctrl_c())
                .await;
        }
    }

    Ok(())
}
