//! Boundaries to the two external services the notifier depends on.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{approval::ApprovalRequest, pipeline::PipelineState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineQueryError {
    #[error("pipeline service request failed: {0}")]
    Transport(String),
    #[error("pipeline service returned {code}: {message}")]
    Service { code: String, message: String },
    #[error("pipeline service response could not be decoded: {0}")]
    Decode(String),
    #[error("pipeline service credentials unavailable: {0}")]
    Credentials(String),
}

#[async_trait]
pub trait PipelineStateSource: Send + Sync {
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, PipelineQueryError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("chat delivery request failed: {0}")]
    Transport(String),
    #[error("chat service rejected the message: {error}")]
    Rejected { error: String },
    #[error("chat service response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub channel: Option<String>,
    pub ts: Option<String>,
}

#[async_trait]
pub trait ChatDelivery: Send + Sync {
    async fn deliver(&self, request: &ApprovalRequest) -> Result<DeliveryReceipt, DeliveryError>;
}
