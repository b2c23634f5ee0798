use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::event::InboundEvent;

/// The bot's own account on the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

/// Capability interface to the social platform (real API or fake)
///
/// Any error from a fetch aborts the current cycle; any error from a send
/// only affects the event being answered.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Look up the authenticated account. Called once at startup.
    async fn resolve_self_identity(&self) -> Result<BotIdentity>;

    /// Recent mentions, oldest first
    async fn fetch_mentions(&self) -> Result<Vec<InboundEvent>>;

    /// Recent direct messages received by the bot
    async fn fetch_direct_messages(&self) -> Result<Vec<InboundEvent>>;

    /// Post `text` as a reply to the mention with id `event_id`
    async fn reply_to_mention(&self, event_id: &str, text: &str) -> Result<()>;

    /// Send `text` as a direct message to `sender_id`
    async fn send_direct_message(&self, sender_id: &str, text: &str) -> Result<()>;
}

#[async_trait]
impl<T: PlatformGateway + ?Sized> PlatformGateway for Arc<T> {
    async fn resolve_self_identity(&self) -> Result<BotIdentity> {
        (**self).resolve_self_identity().await
    }

    async fn fetch_mentions(&self) -> Result<Vec<InboundEvent>> {
        (**self).fetch_mentions().await
    }

    async fn fetch_direct_messages(&self) -> Result<Vec<InboundEvent>> {
        (**self).fetch_direct_messages().await
    }

    async fn reply_to_mention(&self, event_id: &str, text: &str) -> Result<()> {
        (**self).reply_to_mention(event_id, text).await
    }

    async fn send_direct_message(&self, sender_id: &str, text: &str) -> Result<()> {
        (**self).send_direct_message(sender_id, text).await
    }
}
