//! Reactor display-name resolution.

use lesson_types::{DiscordUser, MentionMap};
use tracing::{debug, info, warn};

use crate::config::MentionTableConfig;
use crate::platform::ChatPlatform;
use crate::store::{RowStore, Workbook};

/// Resolves reacting users to the names written into the sheet.
///
/// Order: mention table, guild nickname (cache, then a live fetch), global
/// display name, username. Never fails; the username is always there.
pub struct MentionResolver<'a, P> {
    platform: &'a P,
    mentions: &'a MentionMap,
}

impl<'a, P: ChatPlatform> MentionResolver<'a, P> {
    pub fn new(platform: &'a P, mentions: &'a MentionMap) -> Self {
        Self { platform, mentions }
    }

    pub async fn resolve(&self, user: &DiscordUser, guild_id: Option<u64>) -> String {
        if let Some(name) = self.mentions.get(user.id) {
            return name.to_string();
        }

        if let Some(guild_id) = guild_id {
            if let Some(nick) = self.nickname(guild_id, user.id).await {
                return nick;
            }
        }

        user.global_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&user.username)
            .to_string()
    }

    async fn nickname(&self, guild_id: u64, user_id: u64) -> Option<String> {
        let member = match self.platform.cached_member(guild_id, user_id) {
            Some(member) => member,
            None => match self.platform.fetch_member(guild_id, user_id).await {
                Ok(member) => member,
                Err(e) => {
                    debug!("Member {} of guild {} not resolved: {}", user_id, guild_id, e);
                    return None;
                }
            },
        };
        member
            .nick
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
    }
}

/// Load the id → name table. Any failure yields an empty map.
pub async fn load_mention_map<W: Workbook>(
    workbook: &W,
    table: &MentionTableConfig,
) -> MentionMap {
    let sheet = match workbook.open(&table.spreadsheet_id, &table.sheet_name).await {
        Ok(sheet) => sheet,
        Err(e) => {
            warn!("Mention table unavailable, falling back to live names: {}", e);
            return MentionMap::new();
        }
    };

    let ids = match sheet.read_column(table.id_column).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Failed to read mention ids: {}", e);
            return MentionMap::new();
        }
    };
    let names = match sheet.read_column(table.name_column).await {
        Ok(names) => names,
        Err(e) => {
            warn!("Failed to read mention names: {}", e);
            return MentionMap::new();
        }
    };

    let map = MentionMap::from_columns(&ids, &names);
    info!(entries = map.len(), "Loaded mention table");
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MemoryRowStore, MemoryWorkbook, MockPlatform, member};
    use lesson_types::join_names;

    const GUILD: u64 = 200;

    fn table() -> MentionTableConfig {
        MentionTableConfig {
            spreadsheet_id: "mentions".to_string(),
            sheet_name: "一覧".to_string(),
            id_column: 1,
            name_column: 2,
        }
    }

    #[tokio::test]
    async fn test_mention_map_wins_over_nickname() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato");
        platform.cache_member(member(GUILD, user.clone(), Some("さとう")));
        let map: MentionMap = [(10, "佐藤".to_string())].into_iter().collect();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "佐藤");
        assert_eq!(platform.member_fetches(), 0);
    }

    #[tokio::test]
    async fn test_cached_nickname() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato").with_global_name("Sato");
        platform.cache_member(member(GUILD, user.clone(), Some("さとう")));
        let map = MentionMap::new();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "さとう");
        assert_eq!(platform.member_fetches(), 0);
    }

    #[tokio::test]
    async fn test_fetched_nickname_is_cached() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato");
        platform.remote_member(member(GUILD, user.clone(), Some("さとう")));
        let map = MentionMap::new();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "さとう");
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "さとう");
        assert_eq!(platform.member_fetches(), 1);
    }

    #[tokio::test]
    async fn test_member_without_nick_falls_back_to_global_name() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato").with_global_name("Sato Taro");
        platform.cache_member(member(GUILD, user.clone(), None));
        let map = MentionMap::new();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "Sato Taro");
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_username() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato");
        let map = MentionMap::new();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, Some(GUILD)).await, "sato");
        assert_eq!(platform.member_fetches(), 1);
    }

    #[tokio::test]
    async fn test_no_guild_skips_member_lookup() {
        let platform = MockPlatform::new(999);
        let user = DiscordUser::new(10, "sato").with_global_name("Sato");
        let map = MentionMap::new();

        let resolver = MentionResolver::new(&platform, &map);
        assert_eq!(resolver.resolve(&user, None).await, "Sato");
        assert_eq!(platform.member_fetches(), 0);
    }

    #[tokio::test]
    async fn test_names_dedupe_across_resolution_sources() {
        let platform = MockPlatform::new(999);
        // Same person reached through the table and through a nickname.
        let a = DiscordUser::new(10, "yamada_main");
        let b = DiscordUser::new(11, "yamada_alt");
        let c = DiscordUser::new(12, "sato").with_global_name("佐藤");
        platform.cache_member(member(GUILD, b.clone(), Some("山田")));
        let map: MentionMap = [(10, "山田".to_string())].into_iter().collect();

        let resolver = MentionResolver::new(&platform, &map);
        let mut names = Vec::new();
        for user in [&a, &b, &c] {
            names.push(resolver.resolve(user, Some(GUILD)).await);
        }
        assert_eq!(join_names(names), "佐藤, 山田");
    }

    #[tokio::test]
    async fn test_load_mention_map() {
        let workbook = MemoryWorkbook::new();
        workbook.insert(
            "mentions",
            "一覧",
            MemoryRowStore::new()
                .with_column(1, &["Discord ID", "<@10>", "11"])
                .with_column(2, &["名前", "佐藤", "山田"]),
        );

        let map = load_mention_map(&workbook, &table()).await;
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(10), Some("佐藤"));
        assert_eq!(map.get(11), Some("山田"));
    }

    #[tokio::test]
    async fn test_load_mention_map_missing_sheet_is_empty() {
        let workbook = MemoryWorkbook::new();
        assert!(load_mention_map(&workbook, &table()).await.is_empty());
    }

    #[tokio::test]
    async fn test_load_mention_map_read_failure_is_empty() {
        let workbook = MemoryWorkbook::new();
        let sheet = MemoryRowStore::new().with_column(1, &["10"]);
        sheet.fail_reads();
        workbook.insert("mentions", "一覧", sheet);
        assert!(load_mention_map(&workbook, &table()).await.is_empty());
    }
}
