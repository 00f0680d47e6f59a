use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of a pipeline as returned by the pipeline-state query service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineState {
    pub pipeline_name: String,
    pub stages: Vec<StageState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageState {
    pub name: String,
    pub actions: Vec<ActionState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionState {
    pub name: String,
    pub latest_execution: Option<ActionExecution>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionExecution {
    pub action_execution_id: Option<String>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub last_status_change: Option<DateTime<Utc>>,
    pub token: Option<String>,
}

/// Selects a stage either by position or by name.
///
/// The default pipeline topology puts the source action in stage 0 and the
/// manual approval gate in stage 2. Those positions are an assumption about the
/// deployed pipeline's shape, so they are configurable rather than literals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageLocator {
    Index(usize),
    Named(String),
}

impl StageLocator {
    pub const DEFAULT_SOURCE: Self = Self::Index(0);
    pub const DEFAULT_APPROVAL: Self = Self::Index(2);
}

impl fmt::Display for StageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Named(name) => write!(f, "`{name}`"),
        }
    }
}

impl std::str::FromStr for StageLocator {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Ok(match trimmed.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Named(trimmed.to_owned()),
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineShapeError {
    #[error("pipeline has no stage at {locator} ({stage_count} stages present)")]
    MissingStage { locator: StageLocator, stage_count: usize },
    #[error("stage `{stage}` has no action {action}")]
    MissingAction { stage: String, action: String },
    #[error("action `{action}` in stage `{stage}` has no latest execution")]
    NoLatestExecution { stage: String, action: String },
    #[error("action `{action}` in stage `{stage}` is missing `{field}`")]
    MissingField { stage: String, action: String, field: &'static str },
}

/// Located action plus the stage it belongs to, for error reporting.
#[derive(Clone, Copy, Debug)]
pub struct ActionRef<'a> {
    pub stage: &'a StageState,
    pub action: &'a ActionState,
}

impl<'a> ActionRef<'a> {
    pub fn latest_execution(&self) -> Result<&'a ActionExecution, PipelineShapeError> {
        self.action.latest_execution.as_ref().ok_or_else(|| {
            PipelineShapeError::NoLatestExecution {
                stage: self.stage.name.clone(),
                action: self.action.name.clone(),
            }
        })
    }

    fn missing(&self, field: &'static str) -> PipelineShapeError {
        PipelineShapeError::MissingField {
            stage: self.stage.name.clone(),
            action: self.action.name.clone(),
            field,
        }
    }
}

impl PipelineState {
    pub fn stage(&self, locator: &StageLocator) -> Result<&StageState, PipelineShapeError> {
        let found = match locator {
            StageLocator::Index(index) => self.stages.get(*index),
            StageLocator::Named(name) => self.stages.iter().find(|stage| &stage.name == name),
        };

        found.ok_or_else(|| PipelineShapeError::MissingStage {
            locator: locator.clone(),
            stage_count: self.stages.len(),
        })
    }

    /// Resolves an action inside the located stage; the first action when no name is given.
    pub fn action(
        &self,
        locator: &StageLocator,
        action_name: Option<&str>,
    ) -> Result<ActionRef<'_>, PipelineShapeError> {
        let stage = self.stage(locator)?;
        let action = match action_name {
            Some(name) => stage.actions.iter().find(|action| action.name == name),
            None => stage.actions.first(),
        };

        let action = action.ok_or_else(|| PipelineShapeError::MissingAction {
            stage: stage.name.clone(),
            action: action_name.map_or_else(|| "#0".to_owned(), |name| format!("`{name}`")),
        })?;

        Ok(ActionRef { stage, action })
    }

    /// Commit summary and status-change instant of the source action.
    pub fn source_revision(
        &self,
        locator: &StageLocator,
    ) -> Result<SourceRevision, PipelineShapeError> {
        let located = self.action(locator, None)?;
        let execution = located.latest_execution()?;

        let summary = execution.summary.clone().ok_or_else(|| located.missing("summary"))?;
        let changed_at =
            execution.last_status_change.ok_or_else(|| located.missing("lastStatusChange"))?;

        Ok(SourceRevision { summary, changed_at })
    }

    /// Current state of the manual approval gate.
    pub fn approval_gate(
        &self,
        locator: &StageLocator,
        action_name: Option<&str>,
    ) -> Result<ApprovalGate, PipelineShapeError> {
        let located = self.action(locator, action_name)?;
        let execution = located.latest_execution()?;

        let action_execution_id = execution
            .action_execution_id
            .clone()
            .ok_or_else(|| located.missing("actionExecutionId"))?;

        Ok(ApprovalGate {
            action_execution_id,
            token: execution.token.clone(),
            status: execution.status.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRevision {
    pub summary: String,
    pub changed_at: DateTime<Utc>,
}

/// The approval action as currently seen by the pipeline service.
///
/// `token` is only present while the gate is waiting for a decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalGate {
    pub action_execution_id: String,
    pub token: Option<String>,
    pub status: Option<String>,
}
