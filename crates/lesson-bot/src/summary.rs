//! Summary document upsert.

use lesson_types::SummaryDocument;
use tracing::{debug, info};

use crate::errors::PlatformError;
use crate::platform::ChatPlatform;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created(u64),
    Updated(u64),
    /// Dry run: nothing was written.
    Skipped,
}

/// Edit the bot's existing summary with the same title, or post a new one.
///
/// Only the newest `scan_limit` messages are searched; a summary older than
/// that is not found and a second copy gets posted.
pub async fn upsert_summary<P: ChatPlatform>(
    platform: &P,
    channel_id: u64,
    document: &SummaryDocument,
    scan_limit: u8,
    dry_run: bool,
) -> Result<UpsertAction, PlatformError> {
    let existing = find_summary(platform, channel_id, &document.title, scan_limit).await?;

    if dry_run {
        info!(
            channel_id,
            existing = ?existing,
            items = document.fields.len(),
            "Dry run: summary '{}' not written",
            document.title
        );
        return Ok(UpsertAction::Skipped);
    }

    match existing {
        Some(message_id) => {
            platform
                .edit_summary(channel_id, message_id, document)
                .await?;
            debug!(channel_id, message_id, "Edited summary '{}'", document.title);
            Ok(UpsertAction::Updated(message_id))
        }
        None => {
            let message_id = platform.send_summary(channel_id, document).await?;
            debug!(channel_id, message_id, "Posted summary '{}'", document.title);
            Ok(UpsertAction::Created(message_id))
        }
    }
}

/// Newest bot-authored message whose first embed title is exactly `title`.
async fn find_summary<P: ChatPlatform>(
    platform: &P,
    channel_id: u64,
    title: &str,
    scan_limit: u8,
) -> Result<Option<u64>, PlatformError> {
    let bot_id = platform.bot_user_id();
    let recent = platform.recent_messages(channel_id, scan_limit).await?;
    Ok(recent
        .iter()
        .find(|m| m.author.id == bot_id && m.first_embed_title() == Some(title))
        .map(|m| m.id))
}
