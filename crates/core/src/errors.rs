use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ConfigError,
    domain::{event::EventError, pipeline::PipelineShapeError},
    ports::PipelineQueryError,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("malformed trigger event: {0}")]
    MalformedEvent(#[from] EventError),
    #[error("unexpected pipeline shape: {0}")]
    PipelineShape(#[from] PipelineShapeError),
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    PipelineQuery(#[from] PipelineQueryError),
    #[error("configuration failure: {0}")]
    Configuration(#[from] ConfigError),
}

impl From<EventError> for ApplicationError {
    fn from(value: EventError) -> Self {
        Self::Domain(DomainError::from(value))
    }
}

impl From<PipelineShapeError> for ApplicationError {
    fn from(value: PipelineShapeError) -> Self {
        Self::Domain(DomainError::from(value))
    }
}

/// Error payload reported back to the hosting runtime.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error("{error_type}: {error_message}")]
pub struct InvocationError {
    #[serde(rename = "errorType")]
    pub error_type: &'static str,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

impl InvocationError {
    pub fn new(error_type: &'static str, error_message: impl Into<String>) -> Self {
        Self { error_type, error_message: error_message.into() }
    }
}

impl ApplicationError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::MalformedEvent(_)) => "MalformedEvent",
            Self::Domain(DomainError::PipelineShape(_)) => "PipelineShape",
            Self::PipelineQuery(_) => "PipelineQuery",
            Self::Configuration(_) => "Configuration",
        }
    }

    pub fn into_invocation_error(self) -> InvocationError {
        InvocationError::new(self.error_type(), self.to_string())
    }
}

impl From<ApplicationError> for InvocationError {
    fn from(value: ApplicationError) -> Self {
        value.into_invocation_error()
    }
}
