use gatebell_core::config::{AppConfig, LoadOptions};
use gatebell_core::PipelineStateSource;
use gatebell_pipeline::{AwsCredentials, CodePipelineClient};
use serde::Serialize;

use crate::commands::{exit_codes, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let config_failed = report
        .checks
        .iter()
        .any(|check| check.name == "config_validation" && check.status == CheckStatus::Fail);
    let exit_code = if report.overall_status == CheckStatus::Pass {
        exit_codes::SUCCESS
    } else if config_failed {
        exit_codes::CONFIG
    } else {
        exit_codes::RUNTIME
    };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::report(exit_code, output);
    }

    CommandResult::report(exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            match AwsCredentials::from_env() {
                Ok(credentials) => {
                    checks.push(DoctorCheck::pass(
                        "aws_credentials",
                        format!(
                            "access key `{}` found{}",
                            redact_access_key(&credentials.access_key_id),
                            if credentials.session_token.is_some() {
                                " with a session token"
                            } else {
                                ""
                            }
                        ),
                    ));
                    checks.push(check_pipeline_shape(&config, credentials));
                }
                Err(error) => {
                    checks.push(DoctorCheck::fail("aws_credentials", error.to_string()));
                    checks.push(DoctorCheck::skipped(
                        "pipeline_shape",
                        "aws credentials are unavailable",
                    ));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("aws_credentials", "configuration did not load"));
            checks.push(DoctorCheck::skipped("pipeline_shape", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_pipeline_shape(config: &AppConfig, credentials: AwsCredentials) -> DoctorCheck {
    const NAME: &str = "pipeline_shape";

    let client = match CodePipelineClient::from_config(&config.aws, credentials) {
        Ok(client) => client,
        Err(error) => return DoctorCheck::fail(NAME, error.to_string()),
    };
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(NAME, format!("failed to initialize async runtime: {error}"));
        }
    };

    let state = match runtime.block_on(client.pipeline_state(&config.pipeline.name)) {
        Ok(state) => state,
        Err(error) => return DoctorCheck::fail(NAME, error.to_string()),
    };

    let pipeline = &config.pipeline;
    let source = match state.action(&pipeline.source_stage, None) {
        Ok(located) => located,
        Err(error) => return DoctorCheck::fail(NAME, format!("source stage: {error}")),
    };
    let approval = match state.action(&pipeline.approval_stage, pipeline.approval_action.as_deref())
    {
        Ok(located) => located,
        Err(error) => return DoctorCheck::fail(NAME, format!("approval stage: {error}")),
    };

    DoctorCheck::pass(
        NAME,
        format!(
            "`{}` has {} stages; source {} -> `{}`/`{}`, approval {} -> `{}`/`{}`",
            state.pipeline_name,
            state.stages.len(),
            pipeline.source_stage,
            source.stage.name,
            source.action.name,
            pipeline.approval_stage,
            approval.stage.name,
            approval.action.name,
        ),
    )
}

fn redact_access_key(access_key_id: &str) -> String {
    let visible: String = access_key_id.chars().take(4).collect();
    format!("{visible}***")
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
