pub mod config;
pub mod domain;
pub mod errors;
pub mod notifier;
pub mod ports;

pub use domain::approval::{
    format_timestamp, ApprovalActionValue, ApprovalRequest, DisplaySettings,
};
pub use domain::event::{EventError, TriggerEvent};
pub use domain::pipeline::{
    ActionExecution, ActionState, ApprovalGate, PipelineShapeError, PipelineState, SourceRevision,
    StageLocator, StageState,
};
pub use errors::{ApplicationError, DomainError, InvocationError};
pub use notifier::{ApprovalNotifier, NotifierSettings, NotifyOutcome};
pub use ports::{
    ChatDelivery, DeliveryError, DeliveryReceipt, PipelineQueryError, PipelineStateSource,
};
