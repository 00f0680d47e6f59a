use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Offset, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{approval::DisplaySettings, pipeline::StageLocator};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub pipeline: PipelineConfig,
    pub aws: AwsConfig,
    pub display: DisplaySettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub channel_id: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub name: String,
    pub source_stage: StageLocator,
    pub approval_stage: StageLocator,
    pub approval_action: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub timeout_secs: u64,
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

impl LogFormat {
    /// The spelling accepted in config files and env values.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Environment variables read for each setting, in priority order.
pub mod env_keys {
    pub const SLACK_BOT_TOKEN: &[&str] = &["GATEBELL_SLACK_BOT_TOKEN", "SLACK_API_TOKEN"];
    pub const SLACK_CHANNEL_ID: &[&str] = &["GATEBELL_SLACK_CHANNEL_ID", "CHANNEL_ID"];
    pub const SLACK_API_BASE_URL: &[&str] = &["GATEBELL_SLACK_API_BASE_URL"];
    pub const SLACK_TIMEOUT_SECS: &[&str] = &["GATEBELL_SLACK_TIMEOUT_SECS"];
    pub const PIPELINE_NAME: &[&str] = &["GATEBELL_PIPELINE_NAME", "CODEPIPELINE_NAME"];
    pub const PIPELINE_SOURCE_STAGE: &[&str] = &["GATEBELL_PIPELINE_SOURCE_STAGE"];
    pub const PIPELINE_APPROVAL_STAGE: &[&str] = &["GATEBELL_PIPELINE_APPROVAL_STAGE"];
    pub const PIPELINE_APPROVAL_ACTION: &[&str] = &["GATEBELL_PIPELINE_APPROVAL_ACTION"];
    pub const AWS_REGION: &[&str] = &["GATEBELL_AWS_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"];
    pub const AWS_ENDPOINT_URL: &[&str] = &["GATEBELL_AWS_ENDPOINT_URL"];
    pub const AWS_TIMEOUT_SECS: &[&str] = &["GATEBELL_AWS_TIMEOUT_SECS"];
    pub const DISPLAY_UTC_OFFSET: &[&str] = &["GATEBELL_DISPLAY_UTC_OFFSET"];
    pub const DISPLAY_TIMESTAMP_FORMAT: &[&str] = &["GATEBELL_DISPLAY_TIMESTAMP_FORMAT"];
    pub const LOGGING_LEVEL: &[&str] = &["GATEBELL_LOGGING_LEVEL", "GATEBELL_LOG_LEVEL"];
    pub const LOGGING_FORMAT: &[&str] = &["GATEBELL_LOGGING_FORMAT", "GATEBELL_LOG_FORMAT"];
}

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["gatebell.toml", "config/gatebell.toml"];

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_bot_token: Option<String>,
    pub slack_channel_id: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub pipeline_name: Option<String>,
    pub source_stage: Option<StageLocator>,
    pub approval_stage: Option<StageLocator>,
    pub aws_region: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub log_level: Option<String>,
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
    #[error("required setting `{key}` is not set (set `{env}` or add it to gatebell.toml)")]
    MissingRequired { key: &'static str, env: &'static str },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                channel_id: String::new(),
                api_base_url: "https://slack.com/api".to_string(),
                timeout_secs: 10,
            },
            pipeline: PipelineConfig {
                name: String::new(),
                source_stage: StageLocator::DEFAULT_SOURCE,
                approval_stage: StageLocator::DEFAULT_APPROVAL,
                approval_action: None,
            },
            aws: AwsConfig { region: String::new(), endpoint_url: None, timeout_secs: 10 },
            display: DisplaySettings::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Json },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(slack) = patch.slack {
            if let Some(bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token_value);
            }
            if let Some(channel_id) = slack.channel_id {
                self.slack.channel_id = channel_id;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(name) = pipeline.name {
                self.pipeline.name = name;
            }
            if let Some(source_stage) = pipeline.source_stage {
                self.pipeline.source_stage = normalize_locator(source_stage);
            }
            if let Some(approval_stage) = pipeline.approval_stage {
                self.pipeline.approval_stage = normalize_locator(approval_stage);
            }
            if let Some(approval_action) = pipeline.approval_action {
                self.pipeline.approval_action = Some(approval_action);
            }
        }

        if let Some(aws) = patch.aws {
            if let Some(region) = aws.region {
                self.aws.region = region;
            }
            if let Some(endpoint_url) = aws.endpoint_url {
                self.aws.endpoint_url = Some(endpoint_url);
            }
            if let Some(timeout_secs) = aws.timeout_secs {
                self.aws.timeout_secs = timeout_secs;
            }
        }

        if let Some(display) = patch.display {
            if let Some(utc_offset) = display.utc_offset {
                self.display.utc_offset = parse_utc_offset("display.utc_offset", &utc_offset)?;
            }
            if let Some(timestamp_format) = display.timestamp_format {
                self.display.timestamp_format = timestamp_format;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_any(env_keys::SLACK_BOT_TOKEN) {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env_any(env_keys::SLACK_CHANNEL_ID) {
            self.slack.channel_id = value;
        }
        if let Some(value) = read_env_any(env_keys::SLACK_API_BASE_URL) {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env_any(env_keys::SLACK_TIMEOUT_SECS) {
            self.slack.timeout_secs = parse_u64(env_keys::SLACK_TIMEOUT_SECS[0], &value)?;
        }

        if let Some(value) = read_env_any(env_keys::PIPELINE_NAME) {
            self.pipeline.name = value;
        }
        if let Some(value) = read_env_any(env_keys::PIPELINE_SOURCE_STAGE) {
            self.pipeline.source_stage = parse_locator(&value);
        }
        if let Some(value) = read_env_any(env_keys::PIPELINE_APPROVAL_STAGE) {
            self.pipeline.approval_stage = parse_locator(&value);
        }
        if let Some(value) = read_env_any(env_keys::PIPELINE_APPROVAL_ACTION) {
            self.pipeline.approval_action = Some(value);
        }

        if let Some(value) = read_env_any(env_keys::AWS_REGION) {
            self.aws.region = value;
        }
        if let Some(value) = read_env_any(env_keys::AWS_ENDPOINT_URL) {
            self.aws.endpoint_url = Some(value);
        }
        if let Some(value) = read_env_any(env_keys::AWS_TIMEOUT_SECS) {
            self.aws.timeout_secs = parse_u64(env_keys::AWS_TIMEOUT_SECS[0], &value)?;
        }

        if let Some(value) = read_env_any(env_keys::DISPLAY_UTC_OFFSET) {
            self.display.utc_offset = parse_utc_offset(env_keys::DISPLAY_UTC_OFFSET[0], &value)?;
        }
        if let Some(value) = read_env_any(env_keys::DISPLAY_TIMESTAMP_FORMAT) {
            self.display.timestamp_format = value;
        }

        if let Some(value) = read_env_any(env_keys::LOGGING_LEVEL) {
            self.logging.level = value;
        }
        if let Some(value) = read_env_any(env_keys::LOGGING_FORMAT) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_channel_id) = overrides.slack_channel_id {
            self.slack.channel_id = slack_channel_id;
        }
        if let Some(slack_api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = slack_api_base_url;
        }
        if let Some(pipeline_name) = overrides.pipeline_name {
            self.pipeline.name = pipeline_name;
        }
        if let Some(source_stage) = overrides.source_stage {
            self.pipeline.source_stage = source_stage;
        }
        if let Some(approval_stage) = overrides.approval_stage {
            self.pipeline.approval_stage = approval_stage;
        }
        if let Some(aws_region) = overrides.aws_region {
            self.aws.region = aws_region;
        }
        if let Some(aws_endpoint_url) = overrides.aws_endpoint_url {
            self.aws.endpoint_url = Some(aws_endpoint_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_pipeline(&self.pipeline)?;
        validate_aws(&self.aws)?;
        validate_display(&self.display)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read: the explicit path if it exists, else the first candidate found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "slack.bot_token",
            env: env_keys::SLACK_BOT_TOKEN[0],
        });
    }
    if !bot_token.starts_with("xox") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used an app-level token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must be a Slack OAuth token starting with `xox`{hint}. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions"
        )));
    }

    if slack.channel_id.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "slack.channel_id",
            env: env_keys::SLACK_CHANNEL_ID[0],
        });
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)?;
    validate_timeout("slack.timeout_secs", slack.timeout_secs)?;

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.name.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "pipeline.name",
            env: env_keys::PIPELINE_NAME[0],
        });
    }

    for (key, locator) in [
        ("pipeline.source_stage", &pipeline.source_stage),
        ("pipeline.approval_stage", &pipeline.approval_stage),
    ] {
        if matches!(locator, StageLocator::Named(name) if name.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "{key} must be a stage index or a non-empty stage name"
            )));
        }
    }

    if pipeline.source_stage == pipeline.approval_stage {
        return Err(ConfigError::Validation(
            "pipeline.source_stage and pipeline.approval_stage must point at different stages"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_aws(aws: &AwsConfig) -> Result<(), ConfigError> {
    if aws.region.trim().is_empty() {
        return Err(ConfigError::MissingRequired { key: "aws.region", env: env_keys::AWS_REGION[0] });
    }

    if let Some(endpoint_url) = &aws.endpoint_url {
        validate_http_url("aws.endpoint_url", endpoint_url)?;
    }
    validate_timeout("aws.timeout_secs", aws.timeout_secs)?;

    Ok(())
}

fn validate_display(display: &DisplaySettings) -> Result<(), ConfigError> {
    let invalid =
        StrftimeItems::new(&display.timestamp_format).any(|item| matches!(item, Item::Error));
    if invalid || display.timestamp_format.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "display.timestamp_format `{}` is not a valid strftime pattern",
            display.timestamp_format
        )));
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 60 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=60")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_locator(value: &str) -> StageLocator {
    match value.parse::<StageLocator>() {
        Ok(locator) => locator,
        Err(never) => match never {},
    }
}

fn normalize_locator(locator: StageLocator) -> StageLocator {
    match locator {
        StageLocator::Named(name) => parse_locator(&name),
        index => index,
    }
}

fn parse_utc_offset(key: &str, value: &str) -> Result<FixedOffset, ConfigError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(Utc.fix());
    }

    trimmed.parse::<FixedOffset>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    pipeline: Option<PipelinePatch>,
    aws: Option<AwsPatch>,
    display: Option<DisplayPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    channel_id: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    name: Option<String>,
    source_stage: Option<StageLocator>,
    approval_stage: Option<StageLocator>,
    approval_action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AwsPatch {
    region: Option<String>,
    endpoint_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayPatch {
    utc_offset: Option<String>,
    timestamp_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
