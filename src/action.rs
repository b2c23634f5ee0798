//! One-shot outbound messages sent outside the polling loop.
//!
//! The text goes through the same length formatting as generated replies but
//! never touches the cursor, so a later poll still sees the original event.

use tracing::info;

use crate::error::{ReplyError, Result};
use crate::event::EventKind;
use crate::formatter::format_reply;
use crate::gateway::PlatformGateway;

/// Where a manual message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Threaded reply under a tweet
    Reply { tweet_id: String },
    /// Direct message to a user
    DirectMessage { user_id: String },
}

impl Action {
    pub fn kind(&self) -> EventKind {
        match self {
            Action::Reply { .. } => EventKind::Mention,
            Action::DirectMessage { .. } => EventKind::DirectMessage,
        }
    }

    fn target(&self) -> &str {
        match self {
            Action::Reply { tweet_id } => tweet_id,
            Action::DirectMessage { user_id } => user_id,
        }
    }
}

/// Format `text` to `message_limit` and send it. Returns the text as sent.
pub async fn perform<G: PlatformGateway>(
    gateway: &G,
    action: &Action,
    text: &str,
    message_limit: usize,
) -> Result<String> {
    if text.trim().is_empty() {
        return Err(ReplyError::EmptyMessage);
    }
    let formatted = format_reply(text, message_limit);

    match action {
        Action::Reply { tweet_id } => gateway.reply_to_mention(tweet_id, &formatted).await?,
        Action::DirectMessage { user_id } => {
            gateway.send_direct_message(user_id, &formatted).await?
        }
    }
    info!("Sent {} to {}", action.kind(), action.target());
    Ok(formatted)
}
