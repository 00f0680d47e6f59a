use std::env;
use std::fs;
use std::path::Path;

use gatebell_core::config::{env_keys, resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{exit_codes, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                exit_codes::CONFIG,
            );
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, keys: &[&str]| {
        field_source(key_path, keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries: Vec<(&str, String, &[&str])> = vec![
        (
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            env_keys::SLACK_BOT_TOKEN,
        ),
        ("slack.channel_id", config.slack.channel_id.clone(), env_keys::SLACK_CHANNEL_ID),
        ("slack.api_base_url", config.slack.api_base_url.clone(), env_keys::SLACK_API_BASE_URL),
        ("slack.timeout_secs", config.slack.timeout_secs.to_string(), env_keys::SLACK_TIMEOUT_SECS),
        ("pipeline.name", config.pipeline.name.clone(), env_keys::PIPELINE_NAME),
        (
            "pipeline.source_stage",
            config.pipeline.source_stage.to_string(),
            env_keys::PIPELINE_SOURCE_STAGE,
        ),
        (
            "pipeline.approval_stage",
            config.pipeline.approval_stage.to_string(),
            env_keys::PIPELINE_APPROVAL_STAGE,
        ),
        (
            "pipeline.approval_action",
            config.pipeline.approval_action.clone().unwrap_or_else(|| "<first action>".to_owned()),
            env_keys::PIPELINE_APPROVAL_ACTION,
        ),
        ("aws.region", config.aws.region.clone(), env_keys::AWS_REGION),
        (
            "aws.endpoint_url",
            config.aws.endpoint_url.clone().unwrap_or_else(|| "<regional default>".to_owned()),
            env_keys::AWS_ENDPOINT_URL,
        ),
        ("aws.timeout_secs", config.aws.timeout_secs.to_string(), env_keys::AWS_TIMEOUT_SECS),
        (
            "display.utc_offset",
            config.display.utc_offset.to_string(),
            env_keys::DISPLAY_UTC_OFFSET,
        ),
        (
            "display.timestamp_format",
            config.display.timestamp_format.clone(),
            env_keys::DISPLAY_TIMESTAMP_FORMAT,
        ),
        ("logging.level", config.logging.level.clone(), env_keys::LOGGING_LEVEL),
        ("logging.format", config.logging.format.as_str().to_owned(), env_keys::LOGGING_FORMAT),
    ];

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries.into_iter().map(|(key, value, keys)| render_line(key, &value, source(key, keys))),
    );

    CommandResult::report(exit_codes::SUCCESS, lines.join("\n"))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) =
        env_keys.iter().find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
