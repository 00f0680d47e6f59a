use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatebell_core::{
    config::AwsConfig, ActionExecution, ActionState, PipelineQueryError, PipelineState,
    PipelineStateSource, StageState,
};
use reqwest::{Client, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::AwsCredentials;
use crate::sigv4::{authorization, CanonicalRequest, SigningParams};

const SERVICE: &str = "codepipeline";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const GET_PIPELINE_STATE_TARGET: &str = "CodePipeline_20150709.GetPipelineState";

/// CodePipeline client limited to `GetPipelineState`.
pub struct CodePipelineClient {
    http: Client,
    endpoint: Url,
    region: String,
    credentials: AwsCredentials,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid CodePipeline endpoint `{endpoint}`: {reason}")]
    Endpoint { endpoint: String, reason: String },
    #[error("http client could not be built: {0}")]
    Http(#[from] reqwest::Error),
}

impl CodePipelineClient {
    pub fn new(
        region: impl Into<String>,
        endpoint_url: Option<&str>,
        credentials: AwsCredentials,
        timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        let region = region.into();
        let endpoint = endpoint_url
            .map(str::to_owned)
            .unwrap_or_else(|| format!("https://{SERVICE}.{region}.amazonaws.com/"));
        let endpoint = Url::parse(&endpoint).map_err(|error| ClientBuildError::Endpoint {
            endpoint: endpoint.clone(),
            reason: error.to_string(),
        })?;
        if endpoint.host_str().is_none() {
            return Err(ClientBuildError::Endpoint {
                endpoint: endpoint.to_string(),
                reason: "endpoint has no host".to_owned(),
            });
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint, region, credentials })
    }

    pub fn from_config(
        config: &AwsConfig,
        credentials: AwsCredentials,
    ) -> Result<Self, ClientBuildError> {
        Self::new(
            config.region.clone(),
            config.endpoint_url.as_deref(),
            credentials,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    async fn get_pipeline_state(
        &self,
        pipeline_name: &str,
    ) -> Result<GetPipelineStateOutput, PipelineQueryError> {
        let body = serde_json::to_vec(&GetPipelineStateInput { name: pipeline_name })
            .map_err(|error| PipelineQueryError::Decode(error.to_string()))?;

        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };
        let amz_date = params.amz_date();
        let security_token =
            self.credentials.session_token.as_ref().map(|token| token.expose_secret().to_owned());

        let mut signed_headers = vec![
            ("content-type", CONTENT_TYPE.to_owned()),
            ("host", self.host_header()),
            ("x-amz-date", amz_date.clone()),
            ("x-amz-target", GET_PIPELINE_STATE_TARGET.to_owned()),
        ];
        if let Some(token) = &security_token {
            signed_headers.push(("x-amz-security-token", token.clone()));
        }
        let canonical = CanonicalRequest {
            method: "POST",
            path: self.endpoint.path(),
            headers: signed_headers,
            payload: &body,
        };
        let authorization = authorization(&canonical, &params);

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", amz_date)
            .header("x-amz-target", GET_PIPELINE_STATE_TARGET)
            .header("authorization", authorization);
        if let Some(token) = security_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|error| PipelineQueryError::Transport(error.to_string()))?;

        let status = response.status();
        let payload =
            response.bytes().await.map_err(|error| PipelineQueryError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(service_error(status.as_u16(), &payload));
        }

        serde_json::from_slice(&payload).map_err(|error| PipelineQueryError::Decode(error.to_string()))
    }
}

#[async_trait]
impl PipelineStateSource for CodePipelineClient {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, PipelineQueryError> {
        let output = self.get_pipeline_state(pipeline_name).await?;
        debug!(
            event_name = "pipeline.state.fetched",
            pipeline = %pipeline_name,
            stage_count = output.stage_states.len(),
            "fetched pipeline state"
        );
        Ok(output.into_state(pipeline_name))
    }
}

fn service_error(status: u16, payload: &[u8]) -> PipelineQueryError {
    let parsed = serde_json::from_slice::<ServiceErrorBody>(payload).ok();
    let code = parsed
        .as_ref()
        .and_then(|body| body.kind.as_deref())
        .map(|kind| kind.rsplit('#').next().unwrap_or(kind).to_owned())
        .unwrap_or_else(|| format!("HTTP {status}"));
    let message = parsed
        .and_then(|body| body.message.or(body.message_upper))
        .unwrap_or_else(|| String::from_utf8_lossy(payload).into_owned());

    PipelineQueryError::Service { code, message }
}

#[derive(Serialize)]
struct GetPipelineStateInput<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    message: Option<String>,
    #[serde(rename = "Message")]
    message_upper: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPipelineStateOutput {
    pipeline_name: Option<String>,
    #[serde(default)]
    stage_states: Vec<WireStageState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStageState {
    stage_name: Option<String>,
    #[serde(default)]
    action_states: Vec<WireActionState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireActionState {
    action_name: Option<String>,
    latest_execution: Option<WireActionExecution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireActionExecution {
    action_execution_id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    /// Epoch seconds with a fractional part.
    last_status_change: Option<f64>,
    token: Option<String>,
}

impl GetPipelineStateOutput {
    fn into_state(self, requested_name: &str) -> PipelineState {
        PipelineState {
            pipeline_name: self.pipeline_name.unwrap_or_else(|| requested_name.to_owned()),
            stages: self
                .stage_states
                .into_iter()
                .map(|stage| StageState {
                    name: stage.stage_name.unwrap_or_default(),
                    actions: stage
                        .action_states
                        .into_iter()
                        .map(|action| ActionState {
                            name: action.action_name.unwrap_or_default(),
                            latest_execution: action.latest_execution.map(|execution| {
                                ActionExecution {
                                    action_execution_id: execution.action_execution_id,
                                    status: execution.status,
                                    summary: execution.summary,
                                    last_status_change: execution
                                        .last_status_change
                                        .and_then(epoch_seconds),
                                    token: execution.token,
                                }
                            }),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn epoch_seconds(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((value * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use gatebell_core::{PipelineQueryError, PipelineStateSource, StageLocator};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{epoch_seconds, CodePipelineClient};
    use crate::credentials::AwsCredentials;

    fn client(server: &MockServer, session_token: Option<&str>) -> CodePipelineClient {
        CodePipelineClient::new(
            "ap-northeast-1",
            Some(&server.uri()),
            AwsCredentials::new("AKIDEXAMPLE", "secret", session_token.map(str::to_owned)),
            Duration::from_secs(5),
        )
        .expect("client should build")
    }

    fn state_body() -> serde_json::Value {
        json!({
            "pipelineName": "backend-pipeline",
            "pipelineVersion": 4,
            "stageStates": [
                {
                    "stageName": "Source",
                    "actionStates": [{
                        "actionName": "GitHub",
                        "latestExecution": {
                            "actionExecutionId": "source-exec",
                            "status": "Succeeded",
                            "summary": "feat: add login",
                            "lastStatusChange": 1773453566.123
                        }
                    }]
                },
                {
                    "stageName": "Build",
                    "actionStates": [{ "actionName": "CodeBuild" }]
                },
                {
                    "stageName": "Approval",
                    "actionStates": [{
                        "actionName": "ManualApproval",
                        "latestExecution": {
                            "actionExecutionId": "exec-123",
                            "status": "InProgress",
                            "token": "token-abc",
                            "lastStatusChange": 1773453600.0
                        }
                    }]
                }
            ]
        })
    }

    #[tokio::test]
    async fn sends_signed_json_request_and_decodes_stages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-amz-target", "CodePipeline_20150709.GetPipelineState"))
            .and(header("content-type", "application/x-amz-json-1.1"))
            .and(header("x-amz-security-token", "session-token"))
            .and(header_exists("x-amz-date"))
            .and(body_json(json!({ "name": "backend-pipeline" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(state_body()))
            .expect(1)
            .mount(&server)
            .await;

        let state = client(&server, Some("session-token"))
            .pipeline_state("backend-pipeline")
            .await
            .expect("state should decode");

        assert_eq!(state.pipeline_name, "backend-pipeline");
        assert_eq!(state.stages.len(), 3);
        assert!(state.stages[1].actions[0].latest_execution.is_none());

        let gate = state.approval_gate(&StageLocator::DEFAULT_APPROVAL, None).expect("gate");
        assert_eq!(gate.action_execution_id, "exec-123");
        assert_eq!(gate.token.as_deref(), Some("token-abc"));

        let source = state.source_revision(&StageLocator::DEFAULT_SOURCE).expect("source");
        assert_eq!(source.summary, "feat: add login");

        let received = server.received_requests().await.expect("recorded requests");
        let authorization = received[0]
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .expect("authorization header");
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/ap-northeast-1/codepipeline/aws4_request"));
        assert!(authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"));
    }

    #[tokio::test]
    async fn session_token_header_is_omitted_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(state_body()))
            .mount(&server)
            .await;

        client(&server, None).pipeline_state("backend-pipeline").await.expect("state");

        let received = server.received_requests().await.expect("recorded requests");
        assert!(received[0].headers.get("x-amz-security-token").is_none());
        let authorization = received[0]
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .expect("authorization header");
        assert!(authorization.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target,"));
    }

    #[tokio::test]
    async fn service_error_keeps_exception_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "com.amazonaws.codepipeline#PipelineNotFoundException",
                "message": "Account '123' does not have a pipeline with name 'missing'"
            })))
            .mount(&server)
            .await;

        let error = client(&server, None).pipeline_state("missing").await.expect_err("unknown pipeline");

        assert_eq!(
            error,
            PipelineQueryError::Service {
                code: "PipelineNotFoundException".to_owned(),
                message: "Account '123' does not have a pipeline with name 'missing'".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"stageStates\": 7}"))
            .mount(&server)
            .await;

        let error = client(&server, None).pipeline_state("backend-pipeline").await.expect_err("bad");

        assert!(matches!(error, PipelineQueryError::Decode(_)));
    }

    #[test]
    fn epoch_seconds_keep_millisecond_precision() {
        let instant = epoch_seconds(1773453566.123).expect("finite");
        let expected = Utc.timestamp_millis_opt(1_773_453_566_123).single().expect("instant");
        assert_eq!(instant, expected);
        assert!(epoch_seconds(f64::NAN).is_none());
    }

    #[test]
    fn default_endpoint_is_regional() {
        let client = CodePipelineClient::new(
            "eu-west-1",
            None,
            AwsCredentials::new("AKID", "secret", None),
            Duration::from_secs(5),
        )
        .expect("client");

        assert_eq!(client.endpoint().as_str(), "https://codepipeline.eu-west-1.amazonaws.com/");
    }
}
