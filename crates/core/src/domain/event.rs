//! Trigger event parsing.
//!
//! The notifier is subscribed to an SNS topic that receives CodePipeline
//! manual-approval state changes. Each invocation carries an SNS envelope whose
//! first record holds the notification body as a JSON *string*:
//!
//! ```text
//! { "Records": [ { "Sns": { "Message": "{\"detail\":{\"action-execution-id\":\"...\"}}" } } ] }
//! ```

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event has no records")]
    NoRecords,
    #[error("event field `{0}` is missing or not a string")]
    MissingField(&'static str),
    #[error("event message body is not valid JSON: {0}")]
    InvalidMessage(String),
}

/// Approval-gate notification extracted from a trigger envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    pub action_execution_id: String,
    pub pipeline: Option<String>,
    pub stage: Option<String>,
    pub action: Option<String>,
    pub state: Option<String>,
}

impl TriggerEvent {
    pub fn from_value(event: &Value) -> Result<Self, EventError> {
        let records = event
            .get("Records")
            .and_then(Value::as_array)
            .ok_or(EventError::MissingField("Records"))?;
        let record = records.first().ok_or(EventError::NoRecords)?;

        let message = record
            .get("Sns")
            .and_then(|sns| sns.get("Message"))
            .and_then(Value::as_str)
            .ok_or(EventError::MissingField("Records[0].Sns.Message"))?;

        Self::from_message(message)
    }

    /// Parses the notification body carried in `Sns.Message`.
    pub fn from_message(message: &str) -> Result<Self, EventError> {
        let body: NotificationBody = serde_json::from_str(message)
            .map_err(|error| EventError::InvalidMessage(error.to_string()))?;
        let detail = body.detail.ok_or(EventError::MissingField("detail"))?;
        let action_execution_id =
            detail.action_execution_id.ok_or(EventError::MissingField("detail.action-execution-id"))?;

        Ok(Self {
            action_execution_id,
            pipeline: detail.pipeline,
            stage: detail.stage,
            action: detail.action,
            state: detail.state,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NotificationBody {
    detail: Option<NotificationDetail>,
}

#[derive(Debug, Deserialize)]
struct NotificationDetail {
    #[serde(rename = "action-execution-id")]
    action_execution_id: Option<String>,
    pipeline: Option<String>,
    stage: Option<String>,
    action: Option<String>,
    state: Option<String>,
}
