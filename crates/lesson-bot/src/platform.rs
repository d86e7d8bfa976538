//! Chat platform operations the engine depends on.

use std::future::Future;

use lesson_types::{DiscordMember, DiscordMessage, DiscordUser, SummaryDocument};

use crate::errors::PlatformError;

/// Everything the reconciliation engine asks of the chat platform.
///
/// Production uses [`crate::discord::DiscordPlatform`]; tests use the
/// in-memory platform from `mocks`.
pub trait ChatPlatform: Send + Sync {
    /// The bot's own user id, known after authentication.
    fn bot_user_id(&self) -> u64;

    /// Up to `limit` most recent messages in a channel, newest first.
    fn recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> impl Future<Output = Result<Vec<DiscordMessage>, PlatformError>> + Send;

    /// Every user who reacted to a message with `emoji`.
    fn reaction_users(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> impl Future<Output = Result<Vec<DiscordUser>, PlatformError>> + Send;

    /// Member from the local cache; never touches the network.
    fn cached_member(&self, guild_id: u64, user_id: u64) -> Option<DiscordMember>;

    /// Fetch a member from the API. Successful fetches populate the cache.
    fn fetch_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> impl Future<Output = Result<DiscordMember, PlatformError>> + Send;

    /// Post a summary embed; returns the new message id.
    fn send_summary(
        &self,
        channel_id: u64,
        document: &SummaryDocument,
    ) -> impl Future<Output = Result<u64, PlatformError>> + Send;

    /// Replace the embed of an existing bot message.
    fn edit_summary(
        &self,
        channel_id: u64,
        message_id: u64,
        document: &SummaryDocument,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;
}
