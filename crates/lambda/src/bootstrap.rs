use std::sync::Arc;

use gatebell_core::{
    config::{AppConfig, ConfigError, LoadOptions},
    ApprovalNotifier, InvocationError, NotifierSettings,
};
use gatebell_pipeline::{AwsCredentials, ClientBuildError, CodePipelineClient, CredentialsError};
use gatebell_slack::SlackWebClient;
use thiserror::Error;
use tracing::info;

use crate::runtime::{report_init_failure, InvocationTransport, TransportError};

pub struct Application {
    pub config: AppConfig,
    pub notifier: Arc<ApprovalNotifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("aws credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("codepipeline client setup failed: {0}")]
    PipelineClient(#[from] ClientBuildError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] reqwest::Error),
}

impl BootstrapError {
    pub fn to_invocation_error(&self) -> InvocationError {
        let error_type = match self {
            Self::Config(_) => "Configuration",
            Self::Credentials(_) => "Credentials",
            Self::PipelineClient(_) | Self::SlackClient(_) => "ClientSetup",
        };
        InvocationError::new(error_type, self.to_string())
    }
}

/// Sends a startup failure to the runtime API's init error endpoint.
pub async fn report_bootstrap_failure(
    transport: &dyn InvocationTransport,
    error: &BootstrapError,
) -> Result<(), TransportError> {
    report_init_failure(transport, &error.to_invocation_error()).await
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

/// Builds the external clients once and wires them into the notifier.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    bootstrap_with_credentials(config, AwsCredentials::from_env()?)
}

pub fn bootstrap_with_credentials(
    config: AppConfig,
    credentials: AwsCredentials,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "runtime.bootstrap.start",
        pipeline = %config.pipeline.name,
        region = %config.aws.region,
        "starting bootstrap"
    );

    let pipeline = CodePipelineClient::from_config(&config.aws, credentials)?;
    let chat = SlackWebClient::from_config(&config.slack).map_err(BootstrapError::SlackClient)?;
    let notifier =
        ApprovalNotifier::new(Arc::new(pipeline), Arc::new(chat), NotifierSettings::from(&config));

    info!(
        event_name = "runtime.bootstrap.ready",
        pipeline = %config.pipeline.name,
        channel = %config.slack.channel_id,
        "notifier ready"
    );

    Ok(Application { config, notifier: Arc::new(notifier) })
}
