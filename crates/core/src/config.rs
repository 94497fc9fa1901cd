use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fulfillment::CompletionPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub fulfillment: FulfillmentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct FulfillmentConfig {
    pub tick_interval_ms: u64,
    pub progress_step: u8,
    pub credential_delay_ticks: u64,
    pub completion_policy: CompletionPolicy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub tick_interval_ms: Option<u64>,
    pub progress_step: Option<u8>,
    pub credential_delay_ticks: Option<u64>,
    pub completion_policy: Option<CompletionPolicy>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fulfillment: FulfillmentConfig {
                tick_interval_ms: 1_000,
                progress_step: 10,
                credential_delay_ticks: 10,
                completion_policy: CompletionPolicy::Decoupled,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for CompletionPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "decoupled" => Ok(Self::Decoupled),
            "linked" => Ok(Self::Linked),
            other => Err(ConfigError::Validation(format!(
                "unsupported completion policy `{other}` (expected decoupled|linked)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cils.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(fulfillment) = patch.fulfillment {
            if let Some(tick_interval_ms) = fulfillment.tick_interval_ms {
                self.fulfillment.tick_interval_ms = tick_interval_ms;
            }
            if let Some(progress_step) = fulfillment.progress_step {
                self.fulfillment.progress_step = progress_step;
            }
            if let Some(credential_delay_ticks) = fulfillment.credential_delay_ticks {
                self.fulfillment.credential_delay_ticks = credential_delay_ticks;
            }
            if let Some(completion_policy) = fulfillment.completion_policy {
                self.fulfillment.completion_policy = completion_policy;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CILS_FULFILLMENT_TICK_INTERVAL_MS") {
            self.fulfillment.tick_interval_ms =
                parse_u64("CILS_FULFILLMENT_TICK_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("CILS_FULFILLMENT_PROGRESS_STEP") {
            self.fulfillment.progress_step = parse_u8("CILS_FULFILLMENT_PROGRESS_STEP", &value)?;
        }
        if let Some(value) = read_env("CILS_FULFILLMENT_CREDENTIAL_DELAY_TICKS") {
            self.fulfillment.credential_delay_ticks =
                parse_u64("CILS_FULFILLMENT_CREDENTIAL_DELAY_TICKS", &value)?;
        }
        if let Some(value) = read_env("CILS_FULFILLMENT_COMPLETION_POLICY") {
            self.fulfillment.completion_policy = value.parse()?;
        }

        let log_level = read_env("CILS_LOGGING_LEVEL").or_else(|| read_env("CILS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("CILS_LOGGING_FORMAT").or_else(|| read_env("CILS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(tick_interval_ms) = overrides.tick_interval_ms {
            self.fulfillment.tick_interval_ms = tick_interval_ms;
        }
        if let Some(progress_step) = overrides.progress_step {
            self.fulfillment.progress_step = progress_step;
        }
        if let Some(credential_delay_ticks) = overrides.credential_delay_ticks {
            self.fulfillment.credential_delay_ticks = credential_delay_ticks;
        }
        if let Some(completion_policy) = overrides.completion_policy {
            self.fulfillment.completion_policy = completion_policy;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fulfillment(&self.fulfillment)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cils.toml"), PathBuf::from("config/cils.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_fulfillment(fulfillment: &FulfillmentConfig) -> Result<(), ConfigError> {
    if fulfillment.tick_interval_ms == 0 || fulfillment.tick_interval_ms > 60_000 {
        return Err(ConfigError::Validation(
            "fulfillment.tick_interval_ms must be in range 1..=60000".to_string(),
        ));
    }

    if fulfillment.progress_step == 0 || fulfillment.progress_step > 100 {
        return Err(ConfigError::Validation(
            "fulfillment.progress_step must be in range 1..=100".to_string(),
        ));
    }

    if fulfillment.credential_delay_ticks == 0 || fulfillment.credential_delay_ticks > 10_000 {
        return Err(ConfigError::Validation(
            "fulfillment.credential_delay_ticks must be in range 1..=10000".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    fulfillment: Option<FulfillmentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FulfillmentPatch {
    tick_interval_ms: Option<u64>,
    progress_step: Option<u8>,
    credential_delay_ticks: Option<u64>,
    completion_policy: Option<CompletionPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
