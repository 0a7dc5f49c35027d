// src/publisher.rs
use async_trait::async_trait;
use log::{debug, error, info};
use thiserror::Error;

use crate::models::summary::SummaryDocument;

/// How many recent messages the startup cleanup inspects.
pub const CLEANUP_SCAN_LIMIT: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotUser {
    pub id: u64,
    pub name: String,
}

/// A message seen while scanning a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub handle: MessageHandle,
    pub author_id: u64,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("resource not found")]
    NotFound,
    #[error("missing permissions")]
    Forbidden,
    #[error("rate limited, retry after {retry_after:.1}s")]
    RateLimited { retry_after: f64 },
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// What the publisher needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn current_user(&self) -> Result<BotUser, PlatformError>;

    /// `Ok(None)` when the channel does not exist or is not visible to the bot.
    async fn resolve_channel(&self, channel_id: u64) -> Result<Option<ChannelHandle>, PlatformError>;

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        document: &SummaryDocument,
    ) -> Result<MessageHandle, PlatformError>;

    /// Fails with [`PlatformError::NotFound`] if the message was deleted.
    async fn edit_message(
        &self,
        message: &MessageHandle,
        document: &SummaryDocument,
    ) -> Result<MessageHandle, PlatformError>;

    async fn recent_messages(
        &self,
        channel: &ChannelHandle,
        limit: u8,
    ) -> Result<Vec<MessageRef>, PlatformError>;

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), PlatformError>;
}

/// The one piece of state carried across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PublishState {
    #[default]
    Absent,
    Active(MessageHandle),
}

impl PublishState {
    pub fn handle(&self) -> Option<&MessageHandle> {
        match self {
            Self::Absent => None,
            Self::Active(handle) => Some(handle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Edited,
    Recreated,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to send status message: {0}")]
    Send(#[source] PlatformError),
    #[error("failed to edit status message: {0}")]
    Edit(#[source] PlatformError),
    #[error("failed to recreate status message: {0}")]
    Recreate(#[source] PlatformError),
}

/// Creates the status message on first use, edits it afterwards, and sends a
/// fresh one if the old message has disappeared.
///
/// On `Edit` errors `state` is left untouched. On `Recreate` errors it is reset
/// to `Absent`, since the old handle is known to be dead.
pub async fn publish<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel: &ChannelHandle,
    document: &SummaryDocument,
    state: &mut PublishState,
) -> Result<PublishOutcome, PublishError> {
    let Some(existing) = state.handle().cloned() else {
        let handle = platform
            .send_message(channel, document)
            .await
            .map_err(PublishError::Send)?;
        *state = PublishState::Active(handle);
        info!("Initial status message posted");
        return Ok(PublishOutcome::Created);
    };

    match platform.edit_message(&existing, document).await {
        Ok(handle) => {
            *state = PublishState::Active(handle);
            info!("Status message updated");
            Ok(PublishOutcome::Edited)
        }
        Err(PlatformError::NotFound) => {
            debug!(
                "Status message {} no longer exists, sending a new one",
                existing.message_id
            );
            match platform.send_message(channel, document).await {
                Ok(handle) => {
                    *state = PublishState::Active(handle);
                    info!("Status message recreated (previous message was deleted)");
                    Ok(PublishOutcome::Recreated)
                }
                Err(e) => {
                    *state = PublishState::Absent;
                    Err(PublishError::Recreate(e))
                }
            }
        }
        Err(e) => Err(PublishError::Edit(e)),
    }
}

/// Deletes messages the bot left in `channel` during earlier runs. Returns the
/// number removed. Individual delete failures are logged and skipped.
pub async fn cleanup_previous_messages<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel: &ChannelHandle,
    bot: &BotUser,
) -> Result<usize, PlatformError> {
    let messages = platform.recent_messages(channel, CLEANUP_SCAN_LIMIT).await?;

    let mut deleted = 0;
    for message in messages.iter().filter(|m| m.author_id == bot.id) {
        match platform.delete_message(&message.handle).await {
            Ok(()) => deleted += 1,
            Err(PlatformError::NotFound) => {}
            Err(e) => error!(
                "Failed to delete message {}: {}",
                message.handle.message_id, e
            ),
        }
    }

    info!("Cleaned up {} old bot messages", deleted);
    Ok(deleted)
}
