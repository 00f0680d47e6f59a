use std::time::Duration;

use async_trait::async_trait;
use gatebell_core::{
    config::SlackConfig, ApprovalRequest, ChatDelivery, DeliveryError, DeliveryReceipt,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::blocks::{approval_request_message, PostMessage};

/// Slack Web API client for posting approval requests.
pub struct SlackWebClient {
    http: Client,
    api_base_url: String,
    bot_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
}

impl SlackWebClient {
    pub fn new(
        api_base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, api_base_url: api_base_url.into(), bot_token })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub async fn post_message(&self, message: &PostMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let url = format!("{}/chat.postMessage", self.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Transport(format!("chat.postMessage returned {status}")));
        }

        let body: PostMessageResponse =
            response.json().await.map_err(|error| DeliveryError::Decode(error.to_string()))?;
        debug!(
            event_name = "slack.post_message.response",
            ok = body.ok,
            channel = body.channel.as_deref().unwrap_or("unknown"),
            "chat.postMessage responded"
        );

        if !body.ok {
            return Err(DeliveryError::Rejected {
                error: body.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }

        Ok(DeliveryReceipt { channel: body.channel, ts: body.ts })
    }
}

#[async_trait]
impl ChatDelivery for SlackWebClient {
    async fn deliver(&self, request: &ApprovalRequest) -> Result<DeliveryReceipt, DeliveryError> {
        self.post_message(&approval_request_message(request)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gatebell_core::{ApprovalActionValue, ApprovalRequest, ChatDelivery, DeliveryError};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::SlackWebClient;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            channel_id: "C0123456789".to_owned(),
            pipeline_name: "backend-pipeline".to_owned(),
            summary: "feat: add login".to_owned(),
            changed_at: "2026-03-14 01:59".to_owned(),
            action_value: ApprovalActionValue::new("token-abc", "backend-pipeline"),
        }
    }

    fn client(server: &MockServer) -> SlackWebClient {
        SlackWebClient::new(server.uri(), "xoxb-test".to_owned().into(), Duration::from_secs(5))
            .expect("client should build")
    }

    #[tokio::test]
    async fn posts_message_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channel": "C0123456789",
                "ts": "1730000000.000100"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server).deliver(&request()).await.expect("delivery should succeed");

        assert_eq!(receipt.channel.as_deref(), Some("C0123456789"));
        assert_eq!(receipt.ts.as_deref(), Some("1730000000.000100"));

        let received = server.received_requests().await.expect("recorded requests");
        let body: serde_json::Value =
            serde_json::from_slice(&received[0].body).expect("json request body");
        assert_eq!(body["channel"], "C0123456789");
        assert_eq!(body["attachments"][0]["actions"][0]["value"], "token-abc,backend-pipeline");
        assert_eq!(body["attachments"][0]["actions"][1]["value"], "token-abc,backend-pipeline");
    }

    #[tokio::test]
    async fn not_ok_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let error = client(&server).deliver(&request()).await.expect_err("should be rejected");

        assert_eq!(error, DeliveryError::Rejected { error: "channel_not_found".to_owned() });
    }

    #[tokio::test]
    async fn server_error_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let error = client(&server).deliver(&request()).await.expect_err("503 should fail");

        assert!(matches!(error, DeliveryError::Transport(ref message) if message.contains("503")));
    }

    #[tokio::test]
    async fn unreadable_body_is_a_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let error = client(&server).deliver(&request()).await.expect_err("html should fail");

        assert!(matches!(error, DeliveryError::Decode(_)));
    }
}
