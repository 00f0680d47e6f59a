use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use gatebell_core::config::{AppConfig, LoadOptions};
use gatebell_core::{
    ApplicationError, ApprovalNotifier, ApprovalRequest, ChatDelivery, DeliveryError,
    DeliveryReceipt, DomainError, NotifierSettings, NotifyOutcome, PipelineQueryError,
};
use gatebell_pipeline::{AwsCredentials, CodePipelineClient};
use gatebell_slack::blocks::{approval_request_message, PostMessage};
use gatebell_slack::SlackWebClient;
use serde_json::Value;

use crate::commands::{exit_codes, CommandResult};

const COMMAND: &str = "notify";

/// Records the rendered message instead of posting it.
#[derive(Default)]
struct DryRunChat {
    rendered: Mutex<Option<PostMessage>>,
}

#[async_trait]
impl ChatDelivery for DryRunChat {
    async fn deliver(&self, request: &ApprovalRequest) -> Result<DeliveryReceipt, DeliveryError> {
        let message = approval_request_message(request);
        let channel = message.channel.clone();
        if let Ok(mut rendered) = self.rendered.lock() {
            *rendered = Some(message);
        }
        Ok(DeliveryReceipt { channel: Some(channel), ts: None })
    }
}

pub fn run(options: LoadOptions, event_path: &Path, dry_run: bool) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                exit_codes::CONFIG,
            );
        }
    };

    let event = match read_event(event_path) {
        Ok(event) => event,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "event_read",
                format!("{error:#}"),
                exit_codes::EVENT,
            );
        }
    };

    let credentials = match AwsCredentials::from_env() {
        Ok(credentials) => credentials,
        Err(error) => return application_failure(PipelineQueryError::from(error).into()),
    };
    let pipeline = match CodePipelineClient::from_config(&config.aws, credentials) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "client_setup",
                error.to_string(),
                exit_codes::RUNTIME,
            );
        }
    };

    let dry_run_chat = Arc::new(DryRunChat::default());
    let chat: Arc<dyn ChatDelivery> = if dry_run {
        dry_run_chat.clone()
    } else {
        match SlackWebClient::from_config(&config.slack) {
            Ok(client) => Arc::new(client),
            Err(error) => {
                return CommandResult::failure(
                    COMMAND,
                    "client_setup",
                    format!("slack client setup failed: {error}"),
                    exit_codes::RUNTIME,
                );
            }
        }
    };
    let notifier =
        ApprovalNotifier::new(Arc::new(pipeline), chat, NotifierSettings::from(&config));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                exit_codes::RUNTIME,
            );
        }
    };

    let outcome = match runtime.block_on(notifier.handle_value(&event)) {
        Ok(outcome) => outcome,
        Err(error) => return application_failure(error),
    };

    let result = outcome_result(&outcome, dry_run);
    let rendered = dry_run_chat.rendered.lock().ok().and_then(|mut rendered| rendered.take());
    match rendered {
        Some(message) => {
            let payload = serde_json::to_string_pretty(&message)
                .unwrap_or_else(|error| format!("<payload serialization failed: {error}>"));
            CommandResult::report(result.exit_code, format!("{payload}\n{}", result.output))
        }
        None => result,
    }
}

fn read_event(path: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read event file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("event file `{}` is not valid JSON", path.display()))
}

fn outcome_result(outcome: &NotifyOutcome, dry_run: bool) -> CommandResult {
    match outcome {
        NotifyOutcome::Stale { event_execution_id, current_execution_id } => {
            CommandResult::success(
                COMMAND,
                format!(
                    "event execution `{event_execution_id}` is stale (pending approval is `{current_execution_id}`); nothing sent"
                ),
            )
        }
        NotifyOutcome::NotPending { execution_id, status } => CommandResult::success(
            COMMAND,
            format!(
                "approval `{execution_id}` is no longer waiting (status {}); nothing sent",
                status.as_deref().unwrap_or("unknown")
            ),
        ),
        NotifyOutcome::Delivered(receipt) if dry_run => CommandResult::success(
            COMMAND,
            format!(
                "dry run: approval request rendered for {}",
                receipt.channel.as_deref().unwrap_or("the configured channel")
            ),
        ),
        NotifyOutcome::Delivered(receipt) => CommandResult::success(
            COMMAND,
            format!(
                "approval request posted to {} (ts {})",
                receipt.channel.as_deref().unwrap_or("the configured channel"),
                receipt.ts.as_deref().unwrap_or("unknown")
            ),
        ),
        NotifyOutcome::DeliveryFailed(error) => CommandResult::failure(
            COMMAND,
            "delivery_failed",
            error.to_string(),
            exit_codes::RUNTIME,
        ),
    }
}

fn application_failure(error: ApplicationError) -> CommandResult {
    let (error_class, exit_code) = match &error {
        ApplicationError::Domain(DomainError::MalformedEvent(_)) => {
            ("malformed_event", exit_codes::EVENT)
        }
        ApplicationError::Domain(DomainError::PipelineShape(_)) => {
            ("pipeline_shape", exit_codes::RUNTIME)
        }
        ApplicationError::PipelineQuery(_) => ("pipeline_query", exit_codes::RUNTIME),
        ApplicationError::Configuration(_) => ("config_validation", exit_codes::CONFIG),
    };
    CommandResult::failure(COMMAND, error_class, error.to_string(), exit_code)
}
