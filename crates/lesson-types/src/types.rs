//! Core Discord domain types
//!
//! Platform-neutral snapshots of the serenity models the engine reads. The
//! Discord adapter in `lesson-bot` converts into these so the reconciler can
//! be exercised without a live connection.

use serde::{Deserialize, Serialize};

/// Discord user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordUser {
    pub id: u64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_name: Option<String>,
    pub bot: bool,
}

impl DiscordUser {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            global_name: None,
            bot: false,
        }
    }

    pub fn with_global_name(mut self, name: impl Into<String>) -> Self {
        self.global_name = Some(name.into());
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }
}

/// Discord guild member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordMember {
    pub user: DiscordUser,
    pub guild_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

/// Message kind, reduced to what eligibility checks need
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Regular,
    Reply,
    /// Joins, pins, thread notices and every other system message.
    System,
}

/// Aggregated reaction on a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReactionCount {
    /// Unicode emoji, or `<:name:id>` / `<a:name:id>` for custom emoji.
    pub emoji: String,
    pub count: u64,
}

/// Discord message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordMessage {
    pub id: u64,
    pub channel_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,
    pub author: DiscordUser,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
    /// One entry per embed, in order; `None` for an untitled embed.
    #[serde(default)]
    pub embed_titles: Vec<Option<String>>,
}

impl DiscordMessage {
    /// Link that opens this message in the Discord client.
    pub fn jump_link(&self) -> String {
        let guild = self
            .guild_id
            .map_or_else(|| "@me".to_string(), |id| id.to_string());
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild, self.channel_id, self.id
        )
    }

    /// The reaction matching `emoji` with a non-zero count, spelled the way
    /// Discord reported it.
    pub fn matching_reaction(&self, emoji: &str) -> Option<&ReactionCount> {
        self.reactions
            .iter()
            .find(|r| r.count > 0 && emoji_matches(&r.emoji, emoji))
    }

    pub fn has_reaction(&self, emoji: &str) -> bool {
        self.matching_reaction(emoji).is_some()
    }

    /// Title of the first embed, if that embed has one.
    pub fn first_embed_title(&self) -> Option<&str> {
        self.embed_titles.first()?.as_deref()
    }
}

/// Compare two emoji strings the way Discord treats them.
///
/// Custom emoji compare by id only (names can be renamed). Unicode emoji
/// ignore the U+FE0F variation selector, which clients add inconsistently.
pub fn emoji_matches(a: &str, b: &str) -> bool {
    match (custom_emoji_id(a), custom_emoji_id(b)) {
        (Some(x), Some(y)) => x == y,
        (None, None) => strip_variation(a) == strip_variation(b),
        _ => false,
    }
}

/// Extract the id from `<:name:id>`, `<a:name:id>` or bare `name:id`.
///
/// Discord ids are never 0, so `<:name:0>` is not a custom emoji.
pub fn custom_emoji_id(emoji: &str) -> Option<u64> {
    let inner = emoji.trim().trim_start_matches('<').trim_end_matches('>');
    let (_, id) = inner.rsplit_once(':')?;
    id.parse().ok().filter(|id| *id != 0)
}

fn strip_variation(s: &str) -> String {
    s.trim().chars().filter(|c| *c != '\u{FE0F}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(guild_id: Option<u64>) -> DiscordMessage {
        DiscordMessage {
            id: 30,
            channel_id: 20,
            guild_id,
            author: DiscordUser::new(1, "form-bot").as_bot(),
            kind: MessageKind::Regular,
            content: String::new(),
            reactions: vec![
                ReactionCount {
                    emoji: "✅".to_string(),
                    count: 2,
                },
                ReactionCount {
                    emoji: "<:done:998877>".to_string(),
                    count: 0,
                },
            ],
            embed_titles: vec![],
        }
    }

    #[test]
    fn test_jump_link_guild() {
        assert_eq!(
            message(Some(10)).jump_link(),
            "https://discord.com/channels/10/20/30"
        );
    }

    #[test]
    fn test_jump_link_without_guild() {
        assert_eq!(
            message(None).jump_link(),
            "https://discord.com/channels/@me/20/30"
        );
    }

    #[test]
    fn test_has_reaction_ignores_variation_selector() {
        assert!(message(None).has_reaction("✅\u{FE0F}"));
        assert!(!message(None).has_reaction("👀"));
    }

    #[test]
    fn test_matching_reaction_keeps_reported_spelling() {
        let msg = message(None);
        let matched = msg.matching_reaction("✅\u{FE0F}").unwrap();
        assert_eq!(matched.emoji, "✅");
    }

    #[test]
    fn test_has_reaction_zero_count_is_absent() {
        assert!(!message(None).has_reaction("<:done:998877>"));
    }

    #[test]
    fn test_custom_emoji_match_by_id() {
        assert!(emoji_matches("<:done:42>", "renamed:42"));
        assert!(emoji_matches("<a:spin:42>", "<:spin:42>"));
        assert!(!emoji_matches("<:done:42>", "<:done:43>"));
        assert!(!emoji_matches("<:done:42>", "✅"));
    }

    #[test]
    fn test_custom_emoji_id() {
        assert_eq!(custom_emoji_id("<:done:42>"), Some(42));
        assert_eq!(custom_emoji_id("done:42"), Some(42));
        assert_eq!(custom_emoji_id("✅"), None);
        assert_eq!(custom_emoji_id("<:done:0>"), None);
    }

    #[test]
    fn test_first_embed_title_requires_titled_first_embed() {
        let mut msg = message(None);
        msg.embed_titles = vec![None, Some("一覧".to_string())];
        assert_eq!(msg.first_embed_title(), None);
        msg.embed_titles = vec![Some("一覧".to_string())];
        assert_eq!(msg.first_embed_title(), Some("一覧"));
    }

    #[test]
    fn test_user_builder() {
        let user = DiscordUser::new(5, "alice").with_global_name("Alice");
        assert_eq!(user.global_name.as_deref(), Some("Alice"));
        assert!(!user.bot);
    }

    #[test]
    fn test_message_kind_serde() {
        let json = serde_json::to_string(&MessageKind::Reply).unwrap();
        assert_eq!(json, "\"reply\"");
    }
}
