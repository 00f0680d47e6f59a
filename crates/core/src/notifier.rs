//! Approval Notifier.
//!
//! Correlates one trigger event with the live pipeline state and, when the
//! event still refers to the pending approval gate, sends one approval request
//! to the chat channel.
//!
//! ```text
//! event ─▶ execution id ─▶ pipeline state ─▶ staleness check ─┬─▶ Stale (no-op)
//!                                                              └─▶ deliver ─▶ Delivered | DeliveryFailed
//! ```
//!
//! The staleness check compares execution identifiers only. Two events that
//! carry the current identifier each produce a message.
//!
//! Missing event or pipeline fields are fatal, with one exception: a current
//! gate that has no continuation token yields `NotPending` instead of an error.
//! That gate was already decided or expired, and approval-completed events
//! arrive on the same topic.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    domain::{
        approval::{format_timestamp, ApprovalActionValue, ApprovalRequest, DisplaySettings},
        event::TriggerEvent,
        pipeline::StageLocator,
    },
    errors::ApplicationError,
    ports::{ChatDelivery, DeliveryError, DeliveryReceipt, PipelineStateSource},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifierSettings {
    pub pipeline_name: String,
    pub channel_id: String,
    pub source_stage: StageLocator,
    pub approval_stage: StageLocator,
    pub approval_action: Option<String>,
    pub display: DisplaySettings,
}

impl From<&AppConfig> for NotifierSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            pipeline_name: config.pipeline.name.clone(),
            channel_id: config.slack.channel_id.clone(),
            source_stage: config.pipeline.source_stage.clone(),
            approval_stage: config.pipeline.approval_stage.clone(),
            approval_action: config.pipeline.approval_action.clone(),
            display: config.display.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The event refers to an approval action that is no longer current.
    Stale { event_execution_id: String, current_execution_id: String },
    /// The gate matches but holds no continuation token (already decided).
    NotPending { execution_id: String, status: Option<String> },
    Delivered(DeliveryReceipt),
    DeliveryFailed(DeliveryError),
}

pub struct ApprovalNotifier {
    pipeline: Arc<dyn PipelineStateSource>,
    chat: Arc<dyn ChatDelivery>,
    settings: NotifierSettings,
}

impl ApprovalNotifier {
    pub fn new(
        pipeline: Arc<dyn PipelineStateSource>,
        chat: Arc<dyn ChatDelivery>,
        settings: NotifierSettings,
    ) -> Self {
        Self { pipeline, chat, settings }
    }

    pub fn settings(&self) -> &NotifierSettings {
        &self.settings
    }

    /// Runs the notifier against a raw trigger envelope.
    pub async fn handle_value(&self, event: &Value) -> Result<NotifyOutcome, ApplicationError> {
        let event = TriggerEvent::from_value(event)?;
        self.handle(&event).await
    }

    pub async fn handle(&self, event: &TriggerEvent) -> Result<NotifyOutcome, ApplicationError> {
        let settings = &self.settings;
        info!(
            event_name = "notifier.event.received",
            execution_id = %event.action_execution_id,
            pipeline = %settings.pipeline_name,
            event_pipeline = event.pipeline.as_deref().unwrap_or("unknown"),
            event_state = event.state.as_deref().unwrap_or("unknown"),
            "received approval gate event"
        );

        let state = self.pipeline.pipeline_state(&settings.pipeline_name).await?;
        let source = state.source_revision(&settings.source_stage)?;
        let gate =
            state.approval_gate(&settings.approval_stage, settings.approval_action.as_deref())?;
        debug!(
            event_name = "notifier.pipeline.queried",
            pipeline = %settings.pipeline_name,
            summary = %source.summary,
            changed_at = %source.changed_at,
            current_execution_id = %gate.action_execution_id,
            gate_status = gate.status.as_deref().unwrap_or("unknown"),
            "queried pipeline state"
        );

        if event.action_execution_id != gate.action_execution_id {
            info!(
                event_name = "notifier.skip.stale",
                execution_id = %event.action_execution_id,
                current_execution_id = %gate.action_execution_id,
                pipeline = %settings.pipeline_name,
                "event does not match the pending approval; skipping"
            );
            return Ok(NotifyOutcome::Stale {
                event_execution_id: event.action_execution_id.clone(),
                current_execution_id: gate.action_execution_id,
            });
        }

        let Some(token) = gate.token else {
            info!(
                event_name = "notifier.skip.not_pending",
                execution_id = %event.action_execution_id,
                gate_status = gate.status.as_deref().unwrap_or("unknown"),
                pipeline = %settings.pipeline_name,
                "approval gate holds no token; skipping"
            );
            return Ok(NotifyOutcome::NotPending {
                execution_id: gate.action_execution_id,
                status: gate.status,
            });
        };

        let request = ApprovalRequest {
            channel_id: settings.channel_id.clone(),
            pipeline_name: settings.pipeline_name.clone(),
            summary: source.summary,
            changed_at: format_timestamp(source.changed_at, &settings.display),
            action_value: ApprovalActionValue::new(token, settings.pipeline_name.clone()),
        };

        match self.chat.deliver(&request).await {
            Ok(receipt) => {
                info!(
                    event_name = "notifier.delivery.sent",
                    execution_id = %event.action_execution_id,
                    pipeline = %settings.pipeline_name,
                    channel = receipt.channel.as_deref().unwrap_or(&settings.channel_id),
                    ts = receipt.ts.as_deref().unwrap_or("unknown"),
                    "approval request delivered"
                );
                Ok(NotifyOutcome::Delivered(receipt))
            }
            Err(error) => {
                warn!(
                    event_name = "notifier.delivery.failed",
                    execution_id = %event.action_execution_id,
                    pipeline = %settings.pipeline_name,
                    channel = %settings.channel_id,
                    error = %error,
                    "approval request delivery failed; not retrying"
                );
                Ok(NotifyOutcome::DeliveryFailed(error))
            }
        }
    }
}
