use gatebell_core::ApprovalRequest;
use serde::Serialize;

pub const APPROVAL_CALLBACK_ID: &str = "codepipeline_manual_approval";
pub const APPROVE_ACTION_ID: &str = "codepipeline_manual_approval_ok";
pub const REJECT_ACTION_ID: &str = "codepipeline_manual_approval_cancel";

const ATTACHMENT_COLOR: &str = "#258ab5";
const ATTACHMENT_FALLBACK: &str = "Upgrade your Slack client to use messages like these.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub title: String,
    pub text: String,
    pub ok_text: String,
    pub dismiss_text: String,
}

/// Interactive button inside a legacy message attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttachmentAction {
    pub action_id: String,
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<Confirmation>,
}

impl AttachmentAction {
    pub fn button(
        action_id: impl Into<String>,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            name: name.into(),
            text: label.into(),
            kind: "button",
            style: None,
            value: None,
            confirm: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn confirm(mut self, confirmation: Confirmation) -> Self {
        self.confirm = Some(confirmation);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub fallback: String,
    pub color: String,
    pub attachment_type: &'static str,
    pub callback_id: String,
    pub actions: Vec<AttachmentAction>,
}

/// Request body for `chat.postMessage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

pub struct MessageBuilder {
    channel: String,
    lines: Vec<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    pub fn new(channel: impl Into<String>) -> Self {
        Self { channel: channel.into(), lines: Vec::new(), attachments: Vec::new() }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn attachment<F>(mut self, callback_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut AttachmentBuilder),
    {
        let mut builder = AttachmentBuilder::default();
        build(&mut builder);
        self.attachments.push(Attachment {
            fallback: ATTACHMENT_FALLBACK.to_owned(),
            color: ATTACHMENT_COLOR.to_owned(),
            attachment_type: "default",
            callback_id: callback_id.into(),
            actions: builder.build(),
        });
        self
    }

    pub fn build(self) -> PostMessage {
        PostMessage { channel: self.channel, text: self.lines.join("\n"), attachments: self.attachments }
    }
}

#[derive(Default)]
pub struct AttachmentBuilder {
    actions: Vec<AttachmentAction>,
}

impl AttachmentBuilder {
    pub fn button(&mut self, action: AttachmentAction) -> &mut Self {
        self.actions.push(action);
        self
    }

    fn build(self) -> Vec<AttachmentAction> {
        self.actions
    }
}

pub fn approval_request_message(request: &ApprovalRequest) -> PostMessage {
    let value = request.action_value.to_string();

    MessageBuilder::new(&request.channel_id)
        .line(format!("*{}* is waiting for manual approval.", request.pipeline_name))
        .line(format!("Commit: `{}`", request.summary))
        .line(format!("Committed at: `{}`", request.changed_at))
        .line("")
        .line("Choose an action.")
        .attachment(APPROVAL_CALLBACK_ID, |attachment| {
            attachment
                .button(
                    AttachmentAction::button(APPROVE_ACTION_ID, "ok", "Approve")
                        .style(ButtonStyle::Primary)
                        .value(value.clone())
                        .confirm(Confirmation {
                            title: "Approve this deployment?".to_owned(),
                            text: "Are you sure?".to_owned(),
                            ok_text: "OK".to_owned(),
                            dismiss_text: "Cancel".to_owned(),
                        }),
                )
                .button(
                    AttachmentAction::button(REJECT_ACTION_ID, "cancel", "Reject")
                        .style(ButtonStyle::Danger)
                        .value(value),
                );
        })
        .build()
}
