use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use gatebell_core::config::{AppConfig, LoadOptions, LoggingConfig};
use gatebell_lambda::runtime::RUNTIME_API_ENV;
use gatebell_lambda::{
    bootstrap_with_config, report_bootstrap_failure, BootstrapError, InvocationRunner,
    RetryPolicy, RuntimeApiTransport,
};

fn init_logging(logging: &LoggingConfig) {
    use gatebell_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let transport = RuntimeApiTransport::from_env()
        .ok_or_else(|| anyhow!("`{RUNTIME_API_ENV}` is not set; not running inside Lambda?"))?
        .context("runtime api client could not be built")?;

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            init_logging(&AppConfig::default().logging);
            return fail_startup(&transport, BootstrapError::from(error)).await;
        }
    };
    init_logging(&config.logging);

    let app = match bootstrap_with_config(config) {
        Ok(app) => app,
        Err(error) => return fail_startup(&transport, error).await,
    };

    let runner = InvocationRunner::new(Arc::new(transport), app.notifier, RetryPolicy::default());
    runner.run().await?;
    Ok(())
}

async fn fail_startup(transport: &RuntimeApiTransport, error: BootstrapError) -> Result<()> {
    let _ = report_bootstrap_failure(transport, &error).await;
    Err(error.into())
}
