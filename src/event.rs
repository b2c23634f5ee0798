//! Inbound events and outbound replies.

use chrono::{DateTime, Utc};
use std::fmt;

/// Which conversation surface an event arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A public post addressing the bot
    Mention,
    /// A private message sent to the bot
    DirectMessage,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Mention => write!(f, "mention"),
            EventKind::DirectMessage => write!(f, "direct message"),
        }
    }
}

/// An event fetched from the platform, immutable once fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: String,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
    pub raw_text: String,
    pub sender_id: String,
}

impl InboundEvent {
    pub fn mention(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        raw_text: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::Mention,
            created_at,
            raw_text: raw_text.into(),
            sender_id: sender_id.into(),
        }
    }

    pub fn direct_message(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        raw_text: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::DirectMessage,
            created_at,
            raw_text: raw_text.into(),
            sender_id: sender_id.into(),
        }
    }
}

/// A formatted reply ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    /// Post id for mentions, sender id for direct messages
    pub target_id: String,
    pub text: String,
}

impl OutboundReply {
    /// Address a reply to the conversation an event came from
    pub fn for_event(event: &InboundEvent, text: String) -> Self {
        let target_id = match event.kind {
            EventKind::Mention => event.id.clone(),
            EventKind::DirectMessage => event.sender_id.clone(),
        };
        Self { target_id, text }
    }
}
