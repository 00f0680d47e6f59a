use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use gatebell_core::{ApprovalNotifier, InvocationError, NotifyOutcome};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";
const MALFORMED_EVENT: &str = "MalformedEvent";

/// One invocation handed out by the runtime API.
///
/// `payload` is an error when the body could not be read as JSON. The request id
/// is still known, so the failure is reported against that invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub request_id: String,
    pub deadline_ms: Option<u64>,
    pub trace_id: Option<String>,
    pub payload: Result<Value, TransportError>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("runtime api poll failed: {0}")]
    Poll(String),
    #[error("runtime api returned an unusable invocation: {0}")]
    Decode(String),
    #[error("runtime api report failed: {0}")]
    Report(String),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runtime api unavailable after {attempts} attempts: {last}")]
    PollRetriesExhausted { attempts: u32, last: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 100, max_delay_ms: 2_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// The Lambda Runtime API as seen by the invocation loop.
#[async_trait]
pub trait InvocationTransport: Send + Sync {
    async fn next_invocation(&self) -> Result<Invocation, TransportError>;
    async fn send_response(&self, request_id: &str, body: &Value) -> Result<(), TransportError>;
    async fn send_error(
        &self,
        request_id: &str,
        error: &InvocationError,
    ) -> Result<(), TransportError>;
    async fn send_init_error(&self, error: &InvocationError) -> Result<(), TransportError>;
}

#[async_trait]
pub trait InvocationHandler: Send + Sync {
    async fn invoke(&self, payload: &Value) -> Result<Value, InvocationError>;
}

#[async_trait]
impl InvocationHandler for ApprovalNotifier {
    async fn invoke(&self, payload: &Value) -> Result<Value, InvocationError> {
        let outcome = self.handle_value(payload).await?;
        let outcome_name = match &outcome {
            NotifyOutcome::Stale { .. } => "stale",
            NotifyOutcome::NotPending { .. } => "not_pending",
            NotifyOutcome::Delivered(_) => "delivered",
            NotifyOutcome::DeliveryFailed(_) => "delivery_failed",
        };
        debug!(event_name = "runtime.invocation.outcome", outcome = outcome_name, "handler finished");
        Ok(json!({}))
    }
}

pub struct RuntimeApiTransport {
    http: Client,
    base_url: String,
}

impl RuntimeApiTransport {
    /// `endpoint` is the `host:port` value of `AWS_LAMBDA_RUNTIME_API`, or a full
    /// `http://` URL.
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let endpoint = endpoint.trim_end_matches('/');
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            format!("{endpoint}/{API_VERSION}/runtime")
        } else {
            format!("http://{endpoint}/{API_VERSION}/runtime")
        };
        // `invocation/next` long-polls, so no client-wide timeout.
        let http = Client::builder().build()?;
        Ok(Self { http, base_url })
    }

    pub fn from_env() -> Option<Result<Self, reqwest::Error>> {
        std::env::var(RUNTIME_API_ENV).ok().map(|endpoint| Self::new(&endpoint))
    }

    async fn post_json(
        &self,
        url: String,
        body: &impl serde::Serialize,
        error_type: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut request = self.http.post(url).json(body);
        if let Some(error_type) = error_type {
            request = request.header(ERROR_TYPE_HEADER, error_type);
        }
        let response =
            request.send().await.map_err(|error| TransportError::Report(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Report(format!("runtime api returned {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InvocationTransport for RuntimeApiTransport {
    async fn next_invocation(&self) -> Result<Invocation, TransportError> {
        let response = self
            .http
            .get(format!("{}/invocation/next", self.base_url))
            .send()
            .await
            .map_err(|error| TransportError::Poll(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Poll(format!("invocation/next returned {status}")));
        }

        let headers = response.headers();
        let header = |name: &str| {
            headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
        };
        let request_id = header(REQUEST_ID_HEADER).ok_or_else(|| {
            TransportError::Decode(format!("missing `{REQUEST_ID_HEADER}` header"))
        })?;
        let deadline_ms = header(DEADLINE_HEADER).and_then(|value| value.parse().ok());
        let trace_id = header(TRACE_ID_HEADER);

        let payload = match response.text().await {
            Ok(body) => serde_json::from_str::<Value>(&body)
                .map_err(|error| TransportError::Decode(error.to_string())),
            Err(error) => Err(TransportError::Decode(error.to_string())),
        };

        Ok(Invocation { request_id, deadline_ms, trace_id, payload })
    }

    async fn send_response(&self, request_id: &str, body: &Value) -> Result<(), TransportError> {
        self.post_json(format!("{}/invocation/{request_id}/response", self.base_url), body, None)
            .await
    }

    async fn send_error(
        &self,
        request_id: &str,
        error: &InvocationError,
    ) -> Result<(), TransportError> {
        self.post_json(
            format!("{}/invocation/{request_id}/error", self.base_url),
            error,
            Some(error.error_type),
        )
        .await
    }

    async fn send_init_error(&self, error: &InvocationError) -> Result<(), TransportError> {
        self.post_json(format!("{}/init/error", self.base_url), error, Some(error.error_type)).await
    }
}

pub struct InvocationRunner {
    transport: Arc<dyn InvocationTransport>,
    handler: Arc<dyn InvocationHandler>,
    retry_policy: RetryPolicy,
}

impl InvocationRunner {
    pub fn new(
        transport: Arc<dyn InvocationTransport>,
        handler: Arc<dyn InvocationHandler>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { transport, handler, retry_policy }
    }

    /// Serves invocations until the runtime API stays unreachable.
    pub async fn run(&self) -> Result<(), RunnerError> {
        loop {
            self.process_next().await?;
        }
    }

    /// Fetches one invocation, runs the handler and reports the result.
    pub async fn process_next(&self) -> Result<(), RunnerError> {
        let invocation = self.next_with_retry().await?;
        let request_id = invocation.request_id.as_str();
        info!(
            event_name = "runtime.invocation.received",
            request_id,
            trace_id = invocation.trace_id.as_deref().unwrap_or("unknown"),
            deadline_ms = invocation.deadline_ms.unwrap_or_default(),
            "received invocation"
        );

        let result = match &invocation.payload {
            Ok(payload) => self.handler.invoke(payload).await,
            Err(decode_error) => Err(InvocationError::new(
                MALFORMED_EVENT,
                format!("malformed trigger event: invocation payload is not JSON: {decode_error}"),
            )),
        };

        match result {
            Ok(body) => {
                if let Err(error) = self.transport.send_response(request_id, &body).await {
                    warn!(
                        event_name = "runtime.invocation.report_failed",
                        request_id,
                        error = %error,
                        "could not report invocation response"
                    );
                } else {
                    info!(event_name = "runtime.invocation.completed", request_id, "invocation completed");
                }
            }
            Err(invocation_error) => {
                error!(
                    event_name = "runtime.invocation.failed",
                    request_id,
                    error_type = invocation_error.error_type,
                    error = %invocation_error.error_message,
                    "invocation failed"
                );
                if let Err(error) = self.transport.send_error(request_id, &invocation_error).await {
                    warn!(
                        event_name = "runtime.invocation.report_failed",
                        request_id,
                        error = %error,
                        "could not report invocation error"
                    );
                }
            }
        }

        Ok(())
    }

    async fn next_with_retry(&self) -> Result<Invocation, RunnerError> {
        let mut attempt = 0;
        loop {
            match self.transport.next_invocation().await {
                Ok(invocation) => return Ok(invocation),
                Err(transport_error) => {
                    warn!(
                        event_name = "runtime.invocation.poll_failed",
                        attempt,
                        max_retries = self.retry_policy.max_retries,
                        error = %transport_error,
                        "runtime api poll failed"
                    );

                    if attempt >= self.retry_policy.max_retries {
                        return Err(RunnerError::PollRetriesExhausted {
                            attempts: attempt + 1,
                            last: transport_error,
                        });
                    }

                    let delay = self.retry_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Reports a startup failure to `/runtime/init/error`.
///
/// Lambda discards the execution environment after this call, so the caller
/// should exit once it returns.
pub async fn report_init_failure(
    transport: &dyn InvocationTransport,
    error: &InvocationError,
) -> Result<(), TransportError> {
    error!(
        event_name = "runtime.bootstrap.failed",
        error_type = error.error_type,
        error = %error.error_message,
        "startup failed"
    );
    let result = transport.send_init_error(error).await;
    if let Err(transport_error) = &result {
        warn!(
            event_name = "runtime.invocation.report_failed",
            error = %transport_error,
            "could not report init error"
        );
    }
    result
}
