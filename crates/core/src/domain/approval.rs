use std::fmt::{self, Write};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a chat adapter needs to render one approval request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pub channel_id: String,
    pub pipeline_name: String,
    pub summary: String,
    pub changed_at: String,
    pub action_value: ApprovalActionValue,
}

/// Opaque button payload `"<token>,<pipeline-name>"`.
///
/// The approval handler that receives the button click splits it back into the
/// continuation token and the pipeline to act on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ApprovalActionValue {
    pub token: String,
    pub pipeline_name: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("approval action value `{0}` is not `<token>,<pipeline-name>`")]
pub struct ActionValueError(String);

impl ApprovalActionValue {
    pub fn new(token: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self { token: token.into(), pipeline_name: pipeline_name.into() }
    }
}

impl fmt::Display for ApprovalActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.token, self.pipeline_name)
    }
}

impl std::str::FromStr for ApprovalActionValue {
    type Err = ActionValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // pipeline names cannot contain commas, tokens might
        match value.rsplit_once(',') {
            Some((token, pipeline_name)) if !token.is_empty() && !pipeline_name.is_empty() => {
                Ok(Self::new(token, pipeline_name))
            }
            _ => Err(ActionValueError(value.to_owned())),
        }
    }
}

impl From<ApprovalActionValue> for String {
    fn from(value: ApprovalActionValue) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ApprovalActionValue {
    type Error = ActionValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplaySettings {
    pub utc_offset: FixedOffset,
    pub timestamp_format: String,
}

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { utc_offset: Utc.fix(), timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_owned() }
    }
}

/// Renders `instant` in the configured offset. An unusable pattern falls back
/// to [`DEFAULT_TIMESTAMP_FORMAT`].
pub fn format_timestamp(instant: DateTime<Utc>, display: &DisplaySettings) -> String {
    let local = instant.with_timezone(&display.utc_offset);
    let mut rendered = String::new();
    if write!(rendered, "{}", local.format(&display.timestamp_format)).is_ok() {
        return rendered;
    }

    rendered.clear();
    let _ = write!(rendered, "{}", local.format(DEFAULT_TIMESTAMP_FORMAT));
    rendered
}
