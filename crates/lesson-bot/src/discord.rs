//! Discord implementation of [`ChatPlatform`] over serenity's HTTP client.
//!
//! The bot runs as a batch job, so it never opens a gateway session. Member
//! lookups are cached for the duration of the run, and the guild of each
//! channel is resolved once because history fetched over REST carries no
//! guild id.

#[path = "discord_tests.rs"]
mod discord_tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lesson_types::{
    DiscordMember, DiscordMessage, DiscordUser, MessageKind, ReactionCount, SummaryDocument,
    custom_emoji_id,
};
use serenity::builder::{CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage, GetMessages};
use serenity::http::Http;
use serenity::model::channel::{Message as SerenityMessage, MessageType, ReactionType};
use serenity::model::guild::Member;
use serenity::model::id::{ChannelId, EmojiId, GuildId, MessageId, UserId};
use serenity::model::user::User as SerenityUser;
use tracing::{debug, info, warn};

use crate::errors::PlatformError;
use crate::platform::ChatPlatform;

/// Discord caps reaction user pages at 100.
const REACTION_PAGE: u8 = 100;

pub struct DiscordPlatform {
    http: Arc<Http>,
    bot_user_id: u64,
    members: Mutex<HashMap<(u64, u64), DiscordMember>>,
    channel_guilds: Mutex<HashMap<u64, Option<u64>>>,
}

impl DiscordPlatform {
    /// Authenticate with `token`. Failure here aborts the run.
    pub async fn connect(token: &str) -> Result<Self, PlatformError> {
        Self::from_http(Arc::new(Http::new(token))).await
    }

    /// Authenticate an existing HTTP client by fetching the current user.
    pub async fn from_http(http: Arc<Http>) -> Result<Self, PlatformError> {
        let me = http.get_current_user().await?;
        info!("Authenticated to Discord as {} ({})", me.name, me.id);
        Ok(Self {
            http,
            bot_user_id: me.id.get(),
            members: Mutex::new(HashMap::new()),
            channel_guilds: Mutex::new(HashMap::new()),
        })
    }

    async fn channel_guild(&self, channel_id: u64) -> Option<u64> {
        if let Some(known) = self
            .channel_guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel_id)
        {
            return *known;
        }

        let lookup = match snowflake(channel_id, "channel", ChannelId::new) {
            Ok(id) => self.http.get_channel(id).await.map_err(PlatformError::from),
            Err(e) => Err(e),
        };
        let guild_id = match lookup {
            Ok(channel) => channel.guild().map(|gc| gc.guild_id.get()),
            Err(e) => {
                warn!("Could not resolve guild of channel {}: {}", channel_id, e);
                None
            }
        };
        self.channel_guilds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel_id, guild_id);
        guild_id
    }
}

impl ChatPlatform for DiscordPlatform {
    fn bot_user_id(&self) -> u64 {
        self.bot_user_id
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>, PlatformError> {
        let messages = snowflake(channel_id, "channel", ChannelId::new)?
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await?;
        let guild_id = self.channel_guild(channel_id).await;
        Ok(messages
            .iter()
            .map(|m| convert_message(m, guild_id))
            .collect())
    }

    async fn reaction_users(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<Vec<DiscordUser>, PlatformError> {
        let reaction = reaction_type(emoji);
        let channel = snowflake(channel_id, "channel", ChannelId::new)?;
        let message = snowflake(message_id, "message", MessageId::new)?;
        let mut users = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = channel
                .reaction_users(
                    &*self.http,
                    message,
                    reaction.clone(),
                    Some(REACTION_PAGE),
                    after,
                )
                .await?;
            let full_page = page.len() == REACTION_PAGE as usize;
            after = page.last().map(|u| u.id);
            users.extend(page.iter().map(convert_user));
            if !full_page {
                break;
            }
        }
        Ok(users)
    }

    fn cached_member(&self, guild_id: u64, user_id: u64) -> Option<DiscordMember> {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(guild_id, user_id))
            .cloned()
    }

    async fn fetch_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<DiscordMember, PlatformError> {
        let member = self
            .http
            .get_member(
                snowflake(guild_id, "guild", GuildId::new)?,
                snowflake(user_id, "user", UserId::new)?,
            )
            .await?;
        let member = convert_member(&member);
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((guild_id, user_id), member.clone());
        Ok(member)
    }

    async fn send_summary(
        &self,
        channel_id: u64,
        document: &SummaryDocument,
    ) -> Result<u64, PlatformError> {
        let message = snowflake(channel_id, "channel", ChannelId::new)?
            .send_message(&*self.http, CreateMessage::new().embed(build_embed(document)))
            .await?;
        Ok(message.id.get())
    }

    async fn edit_summary(
        &self,
        channel_id: u64,
        message_id: u64,
        document: &SummaryDocument,
    ) -> Result<(), PlatformError> {
        snowflake(channel_id, "channel", ChannelId::new)?
            .edit_message(
                &*self.http,
                snowflake(message_id, "message", MessageId::new)?,
                EditMessage::new().embed(build_embed(document)),
            )
            .await?;
        Ok(())
    }
}

// ── Conversion helpers ────────────────────────────────────────────────────────

/// Serenity id constructors panic on 0.
fn snowflake<T>(raw: u64, kind: &'static str, new: fn(u64) -> T) -> Result<T, PlatformError> {
    if raw == 0 {
        return Err(PlatformError::ZeroId(kind));
    }
    Ok(new(raw))
}

pub fn convert_user(user: &SerenityUser) -> DiscordUser {
    DiscordUser {
        id: user.id.get(),
        username: user.name.clone(),
        global_name: user.global_name.as_deref().map(String::from),
        bot: user.bot,
    }
}

pub fn convert_member(member: &Member) -> DiscordMember {
    DiscordMember {
        user: convert_user(&member.user),
        guild_id: member.guild_id.get(),
        nick: member.nick.clone(),
    }
}

/// Convert a fetched message. `guild_id` fills in what REST history omits.
pub fn convert_message(msg: &SerenityMessage, guild_id: Option<u64>) -> DiscordMessage {
    let kind = match msg.kind {
        MessageType::Regular => MessageKind::Regular,
        MessageType::InlineReply => MessageKind::Reply,
        _ => MessageKind::System,
    };

    DiscordMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()).or(guild_id),
        author: convert_user(&msg.author),
        kind,
        content: msg.content.clone(),
        reactions: msg
            .reactions
            .iter()
            .map(|r| ReactionCount {
                emoji: emoji_string(&r.reaction_type),
                count: r.count,
            })
            .collect(),
        embed_titles: msg.embeds.iter().map(|e| e.title.clone()).collect(),
    }
}

fn emoji_string(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Custom { animated, id, name } => format!(
            "<{}:{}:{}>",
            if *animated { "a" } else { "" },
            name.as_deref().unwrap_or_default(),
            id.get()
        ),
        ReactionType::Unicode(s) => s.clone(),
        _ => String::new(),
    }
}

/// Config emoji string → serenity reaction type.
pub fn reaction_type(emoji: &str) -> ReactionType {
    let emoji = emoji.trim();
    match custom_emoji_id(emoji) {
        Some(id) => {
            let inner = emoji.trim_start_matches('<').trim_end_matches('>');
            let animated = inner.starts_with("a:");
            let name = inner
                .trim_start_matches("a:")
                .trim_start_matches(':')
                .rsplit_once(':')
                .map(|(name, _)| name.to_string())
                .filter(|name| !name.is_empty());
            ReactionType::Custom {
                animated,
                id: EmojiId::new(id),
                name,
            }
        }
        None => ReactionType::Unicode(emoji.to_string()),
    }
}

pub fn build_embed(document: &SummaryDocument) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&document.title)
        .color(document.color)
        .footer(CreateEmbedFooter::new(&document.footer));
    if let Some(description) = &document.description {
        embed = embed.description(description);
    }
    for field in &document.fields {
        embed = embed.field(&field.name, &field.value, false);
    }
    embed
}
