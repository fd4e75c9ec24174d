//! Typed agent configuration.
//!
//! Configuration is read from a TOML file and then overridden by a few
//! environment variables:
//!
//! ```toml
//! provider = "deepseek"
//! model = "deepseek-chat"
//! call_ids = "positional"
//! max_task_depth = 4
//! log_filter = "info,agent_kernel=debug"
//!
//! [aliases]
//! email_address = "recipient"
//!
//! [schedule]
//! at = "17:00"
//! ```

#![warn(missing_docs, clippy::pedantic)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use agent_kernel::{CallIdStrategy, DailySchedule, ScheduleError};
use agent_primitives::SchemaFormat;
use agent_tools::registry::ArgumentAliases;
use agent_tools::schema::{SchemaError, parse_format};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Overrides [`AgentConfig::provider`].
pub const PROVIDER_ENV: &str = "TASKPILOT_PROVIDER";
/// Overrides [`AgentConfig::model`].
pub const MODEL_ENV: &str = "TASKPILOT_MODEL";
/// Overrides [`AgentConfig::log_filter`].
pub const LOG_ENV: &str = "TASKPILOT_LOG";

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {source}")]
    Parse {
        /// TOML decoding failure.
        #[from]
        source: toml::de::Error,
    },

    /// A field holds a value outside its domain.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The schema format override is not a known format.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The schedule time is not `HH:MM`.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Model provider to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini.
    #[default]
    Gemini,
    /// `OpenAI` chat completions.
    OpenAi,
    /// `DeepSeek`, over the `OpenAI`-compatible protocol.
    DeepSeek,
}

impl Provider {
    /// Token naming the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Model used when none is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash-exp",
            Self::OpenAi => "gpt-4o-mini",
            Self::DeepSeek => "deepseek-chat",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(ConfigError::InvalidValue {
                field: "provider",
                reason: format!("unknown provider `{other}`, expected gemini, openai, or deepseek"),
            }),
        }
    }
}

/// `[schedule]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Local time of day, `HH:MM`.
    pub at: String,
}

/// Complete agent configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Provider to send prompts to.
    pub provider: Provider,
    /// Model name; the provider's default when absent.
    pub model: Option<String>,
    /// Overrides the provider's native tool schema format.
    pub schema_format: Option<String>,
    /// How structured calls are keyed.
    pub call_ids: CallIdStrategy,
    /// Bound on nested task lists.
    pub max_task_depth: usize,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Public argument name to canonical parameter name. Empty means the
    /// built-in table.
    pub aliases: BTreeMap<String, String>,
    /// Daily run settings.
    pub schedule: Option<ScheduleConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            schema_format: None,
            call_ids: CallIdStrategy::default(),
            max_task_depth: agent_kernel::DEFAULT_MAX_TASK_DEPTH,
            log_filter: "info".to_owned(),
            aliases: BTreeMap::new(),
            schedule: None,
        }
    }
}

impl AgentConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and the validation
    /// errors of [`AgentConfig::validate`].
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, plus any
    /// parse or validation error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_toml_str(&input)?;
        config.apply_env()?;
        debug!(path = %path.display(), provider = %config.provider, "configuration loaded");
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults; environment
    /// overrides apply either way.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env()?;
                Ok(config)
            }
        }
    }

    /// Applies `TASKPILOT_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown provider.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`; empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown provider.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(provider) = lookup(PROVIDER_ENV) {
            self.provider = provider.parse()?;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = Some(model);
        }
        if let Some(filter) = lookup(LOG_ENV) {
            self.log_filter = filter;
        }
        Ok(())
    }

    /// Checks every field that carries a constrained value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] for an unknown schema format,
    /// [`ConfigError::Schedule`] for a malformed time, and
    /// [`ConfigError::InvalidValue`] for a blank model or alias.
    pub fn validate(&self) -> ConfigResult<()> {
        self.schema_format()?;
        self.schedule()?;

        if self.model.as_deref().is_some_and(|model| model.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "model",
                reason: "model name cannot be blank".into(),
            });
        }

        if let Some((public, _)) = self
            .aliases
            .iter()
            .find(|(public, canonical)| public.trim().is_empty() || canonical.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "aliases",
                reason: format!("alias `{public}` has a blank side"),
            });
        }

        Ok(())
    }

    /// Model to request.
    #[must_use]
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Schema format override, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] when the token is unknown.
    pub fn schema_format(&self) -> ConfigResult<Option<SchemaFormat>> {
        self.schema_format
            .as_deref()
            .map(parse_format)
            .transpose()
            .map_err(ConfigError::from)
    }

    /// Alias table to install in the registry.
    #[must_use]
    pub fn aliases(&self) -> ArgumentAliases {
        if self.aliases.is_empty() {
            ArgumentAliases::builtin()
        } else {
            self.aliases.iter().map(|(public, canonical)| (public.as_str(), canonical.as_str())).collect()
        }
    }

    /// Daily schedule, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schedule`] when the time is not `HH:MM`.
    pub fn schedule(&self) -> ConfigResult<Option<DailySchedule>> {
        self.schedule
            .as_ref()
            .map(|schedule| DailySchedule::parse(&schedule.at))
            .transpose()
            .map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model(), "gemini-2.0-flash-exp");
        assert_eq!(config.aliases().canonical("stock_symbol"), "symbol");
        assert!(config.schedule().unwrap().is_none());
    }

    #[test]
    fn parses_full_document() {
        let config = AgentConfig::from_toml_str(
            r#"
            provider = "deepseek"
            schema_format = "anthropic"
            call_ids = "tool_name"
            max_task_depth = 2

            [aliases]
            mail_to = "recipient"

            [schedule]
            at = "17:00"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider, Provider::DeepSeek);
        assert_eq!(config.model(), "deepseek-chat");
        assert_eq!(config.schema_format().unwrap(), Some(SchemaFormat::Anthropic));
        assert_eq!(config.call_ids, CallIdStrategy::ToolName);
        assert_eq!(config.max_task_depth, 2);

        let aliases = config.aliases();
        assert_eq!(aliases.canonical("mail_to"), "recipient");
        assert_eq!(aliases.canonical("email_address"), "email_address");
        assert!(config.schedule().unwrap().is_some());
    }

    #[test]
    fn rejects_unknown_schema_format() {
        let err = AgentConfig::from_toml_str("schema_format = \"xml\"").expect_err("xml is unsupported");
        assert!(matches!(err, ConfigError::Schema(SchemaError::UnsupportedFormat { .. })));
    }

    #[test]
    fn rejects_bad_schedule() {
        let err = AgentConfig::from_toml_str("[schedule]\nat = \"5pm\"").expect_err("bad time");
        assert!(matches!(err, ConfigError::Schedule(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = AgentConfig::from_toml_str("colour = \"blue\"").expect_err("unknown field");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (PROVIDER_ENV, "OpenAI"),
            (MODEL_ENV, "gpt-4.1"),
            (LOG_ENV, ""),
        ]);
        let mut config = AgentConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|value| (*value).to_owned()))
            .unwrap();

        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.model(), "gpt-4.1");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn env_rejects_unknown_provider() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_overrides(|key| (key == PROVIDER_ENV).then(|| "anthropic".to_owned()))
            .expect_err("anthropic is not a provider");
        assert!(matches!(err, ConfigError::InvalidValue { field: "provider", .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = \"gemini\"\nmodel = \"gemini-1.5-pro\"").unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.max_task_depth, agent_kernel::DEFAULT_MAX_TASK_DEPTH);
        assert!(config.schedule.is_none());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(dir.path().join("absent.toml")).expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
