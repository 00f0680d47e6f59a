//! Slack delivery for approval requests.
//!
//! - **Messages** (`blocks`) - renders an approval request as a `chat.postMessage`
//!   body with a legacy interactive attachment (Approve / Reject buttons)
//! - **Web API** (`client`) - `SlackWebClient`, the `ChatDelivery` implementation
//!
//! # Setup
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Add the `chat:write` bot scope and install the app to the workspace
//! 3. Invite the bot to the approval channel
//! 4. Set env vars: `GATEBELL_SLACK_BOT_TOKEN`, `GATEBELL_SLACK_CHANNEL_ID`
//!
//! Button clicks are handled by a separate interactivity endpoint. Each button's
//! `value` is `"<token>,<pipeline-name>"`; see `gatebell_core::ApprovalActionValue`.

pub mod blocks;
pub mod client;

pub use client::SlackWebClient;
