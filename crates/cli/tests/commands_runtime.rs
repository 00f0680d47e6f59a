use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use gatebell_cli::commands::{config, doctor, notify};
use gatebell_core::config::LoadOptions;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALID_ENV: [(&str, &str); 4] = [
    ("GATEBELL_SLACK_BOT_TOKEN", "xoxb-test"),
    ("GATEBELL_SLACK_CHANNEL_ID", "C0123456789"),
    ("GATEBELL_PIPELINE_NAME", "backend-pipeline"),
    ("GATEBELL_AWS_REGION", "ap-northeast-1"),
];

const NO_ENV: [(&str, &str); 0] = [];

#[test]
fn config_lists_sources_and_redacts_the_bot_token() {
    with_env(&VALID_ENV, || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        assert!(result.output.contains("- slack.bot_token = xoxb-*** (source: env (GATEBELL_SLACK_BOT_TOKEN))"));
        assert!(result.output.contains("- pipeline.source_stage = #0 (source: default)"));
        assert!(result.output.contains("- pipeline.approval_stage = #2 (source: default)"));
        assert!(result.output.contains("- logging.format = json (source: default)"));
        assert!(!result.output.contains("xoxb-test"));
    });
}

#[test]
fn config_attributes_legacy_aliases_and_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("gatebell.toml");
    fs::write(&file, "[pipeline]\napproval_stage = \"Approval\"\n").expect("write config");

    with_env(
        &[
            ("SLACK_API_TOKEN", "xoxb-legacy"),
            ("CHANNEL_ID", "C0123456789"),
            ("CODEPIPELINE_NAME", "backend-pipeline"),
            ("AWS_REGION", "us-east-1"),
            ("GATEBELL_LOG_FORMAT", "pretty"),
        ],
        || {
            let result = config::run(LoadOptions {
                config_path: Some(file.clone()),
                require_file: true,
                ..LoadOptions::default()
            });
            assert_eq!(result.exit_code, 0, "{}", result.output);

            assert!(result.output.contains("(source: env (SLACK_API_TOKEN))"));
            assert!(result.output.contains("- logging.format = pretty (source: env (GATEBELL_LOG_FORMAT))"));
            assert!(result.output.contains("- pipeline.name = backend-pipeline (source: env (CODEPIPELINE_NAME))"));
            assert!(result.output.contains(&format!(
                "- pipeline.approval_stage = `Approval` (source: file ({}))",
                file.display()
            )));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&NO_ENV, || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_skips_remaining_checks_without_config() {
    with_env(&NO_ENV, || {
        let result = doctor::run(LoadOptions::default(), true);
        assert_eq!(result.exit_code, 2);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["name"], "config_validation");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][2]["name"], "pipeline_shape");
        assert_eq!(report["checks"][2]["status"], "skipped");
    });
}

#[test]
fn doctor_flags_missing_aws_credentials() {
    with_env(&VALID_ENV, || {
        let result = doctor::run(LoadOptions::default(), false);
        assert_eq!(result.exit_code, 4);

        assert!(result.output.contains("- [ok] config_validation"));
        assert!(result.output.contains("- [fail] aws_credentials: `AWS_ACCESS_KEY_ID` is not set"));
        assert!(result.output.contains("- [skip] pipeline_shape"));
    });
}

#[test]
fn doctor_resolves_stage_locators_against_the_live_pipeline() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(pipeline_server("exec-123"));
    let endpoint = server.uri();

    with_env(&with_aws(&endpoint), || {
        let result = doctor::run(LoadOptions::default(), true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        let details = report["checks"][2]["details"].as_str().expect("details");
        assert!(details.contains("`Source`/`GitHub`"));
        assert!(details.contains("`Approval`/`ManualApproval`"));
    });
}

#[test]
fn notify_rejects_missing_event_file() {
    with_env(&VALID_ENV, || {
        let result = notify::run(LoadOptions::default(), Path::new("/nonexistent/event.json"), true);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "event_read");
        assert!(payload["message"].as_str().expect("message").contains("could not read event file"));
    });
}

#[test]
fn notify_classifies_malformed_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = dir.path().join("event.json");
    fs::write(&event, json!({ "Records": [] }).to_string()).expect("write event");

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(pipeline_server("exec-123"));
    let endpoint = server.uri();

    with_env(&with_aws(&endpoint), || {
        let result = notify::run(LoadOptions::default(), &event, true);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "malformed_event");
    });
}

#[test]
fn notify_without_credentials_is_a_runtime_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = dir.path().join("event.json");
    fs::write(&event, sns_event("exec-123").to_string()).expect("write event");

    with_env(&VALID_ENV, || {
        let result = notify::run(LoadOptions::default(), &event, true);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "pipeline_query");
        assert!(payload["message"].as_str().expect("message").contains("AWS_ACCESS_KEY_ID"));
    });
}

#[test]
fn notify_dry_run_prints_the_slack_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = dir.path().join("event.json");
    fs::write(&event, sns_event("exec-123").to_string()).expect("write event");

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(pipeline_server("exec-123"));
    let endpoint = server.uri();

    with_env(&with_aws(&endpoint), || {
        let result = notify::run(LoadOptions::default(), &event, true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let (payload, summary) = result.output.rsplit_once('\n').expect("payload then summary");
        let message: Value = serde_json::from_str(payload).expect("rendered payload is JSON");
        assert_eq!(message["channel"], "C0123456789");
        assert!(message["text"].as_str().expect("text").contains("feat: add login"));
        assert_eq!(
            message["attachments"][0]["actions"][1]["value"],
            "token-abc,backend-pipeline"
        );

        let summary = parse_payload(summary);
        assert_eq!(summary["status"], "ok");
        assert!(summary["message"].as_str().expect("message").starts_with("dry run"));
    });
}

#[test]
fn notify_skips_stale_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let event = dir.path().join("event.json");
    fs::write(&event, sns_event("exec-999").to_string()).expect("write event");

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(pipeline_server("exec-123"));
    let endpoint = server.uri();

    with_env(&with_aws(&endpoint), || {
        let result = notify::run(LoadOptions::default(), &event, true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().expect("message").contains("stale"));
    });
}

async fn pipeline_server(approval_execution_id: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pipelineName": "backend-pipeline",
            "stageStates": [
                {
                    "stageName": "Source",
                    "actionStates": [{
                        "actionName": "GitHub",
                        "latestExecution": {
                            "summary": "feat: add login",
                            "lastStatusChange": 1773453566.0
                        }
                    }]
                },
                { "stageName": "Build", "actionStates": [{ "actionName": "CodeBuild" }] },
                {
                    "stageName": "Approval",
                    "actionStates": [{
                        "actionName": "ManualApproval",
                        "latestExecution": {
                            "actionExecutionId": approval_execution_id,
                            "status": "InProgress",
                            "token": "token-abc"
                        }
                    }]
                }
            ]
        })))
        .mount(&server)
        .await;
    server
}

fn sns_event(action_execution_id: &str) -> Value {
    let message = json!({ "detail": { "action-execution-id": action_execution_id } });
    json!({ "Records": [{ "Sns": { "Message": message.to_string() } }] })
}

fn with_aws(endpoint: &str) -> Vec<(&'static str, String)> {
    let mut vars: Vec<(&'static str, String)> =
        VALID_ENV.iter().map(|(key, value)| (*key, (*value).to_owned())).collect();
    vars.push(("GATEBELL_AWS_ENDPOINT_URL", endpoint.to_owned()));
    vars.push(("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE".to_owned()));
    vars.push(("AWS_SECRET_ACCESS_KEY", "secret".to_owned()));
    vars
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<K: AsRef<str>, V: AsRef<str>>(vars: &[(K, V)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "GATEBELL_SLACK_BOT_TOKEN",
        "SLACK_API_TOKEN",
        "GATEBELL_SLACK_CHANNEL_ID",
        "CHANNEL_ID",
        "GATEBELL_SLACK_API_BASE_URL",
        "GATEBELL_SLACK_TIMEOUT_SECS",
        "GATEBELL_PIPELINE_NAME",
        "CODEPIPELINE_NAME",
        "GATEBELL_PIPELINE_SOURCE_STAGE",
        "GATEBELL_PIPELINE_APPROVAL_STAGE",
        "GATEBELL_PIPELINE_APPROVAL_ACTION",
        "GATEBELL_AWS_REGION",
        "AWS_REGION",
        "AWS_DEFAULT_REGION",
        "GATEBELL_AWS_ENDPOINT_URL",
        "GATEBELL_AWS_TIMEOUT_SECS",
        "GATEBELL_DISPLAY_UTC_OFFSET",
        "GATEBELL_DISPLAY_TIMESTAMP_FORMAT",
        "GATEBELL_LOGGING_LEVEL",
        "GATEBELL_LOG_LEVEL",
        "GATEBELL_LOGGING_FORMAT",
        "GATEBELL_LOG_FORMAT",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key.as_ref(), value.as_ref());
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
