//! In-memory platform and workbook for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lesson_types::{
    DiscordErrorCode, DiscordMember, DiscordMessage, DiscordUser, MessageKind, ReactionCount,
    SummaryDocument,
};

use crate::errors::{PlatformError, StoreError};
use crate::platform::ChatPlatform;
use crate::store::{RowStore, Workbook};

// ── MockPlatform ──────────────────────────────────────────────────────────────

/// Discord stand-in. Channels hold messages oldest first; summaries the bot
/// sends become ordinary bot-authored messages in the channel.
pub struct MockPlatform {
    bot_id: u64,
    state: Mutex<MockState>,
    member_fetches: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    channels: HashMap<u64, Vec<DiscordMessage>>,
    reactors: HashMap<(u64, String), Vec<DiscordUser>>,
    cached_members: HashMap<(u64, u64), DiscordMember>,
    remote_members: HashMap<(u64, u64), DiscordMember>,
    documents: HashMap<u64, SummaryDocument>,
    failing_history: HashSet<u64>,
    failing_reactions: HashSet<u64>,
    next_id: u64,
}

impl MockPlatform {
    pub fn new(bot_id: u64) -> Self {
        Self {
            bot_id,
            state: Mutex::new(MockState {
                next_id: 10_000,
                ..Default::default()
            }),
            member_fetches: AtomicUsize::new(0),
        }
    }

    pub fn push_message(&self, message: DiscordMessage) {
        self.state
            .lock()
            .unwrap()
            .channels
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    /// Record who reacted to `message_id` with `emoji`.
    pub fn set_reactors(&self, message_id: u64, emoji: &str, users: Vec<DiscordUser>) {
        self.state
            .lock()
            .unwrap()
            .reactors
            .insert((message_id, emoji.to_string()), users);
    }

    pub fn cache_member(&self, member: DiscordMember) {
        self.state
            .lock()
            .unwrap()
            .cached_members
            .insert((member.guild_id, member.user.id), member);
    }

    /// Member only reachable through `fetch_member`.
    pub fn remote_member(&self, member: DiscordMember) {
        self.state
            .lock()
            .unwrap()
            .remote_members
            .insert((member.guild_id, member.user.id), member);
    }

    pub fn fail_history(&self, channel_id: u64) {
        self.state.lock().unwrap().failing_history.insert(channel_id);
    }

    pub fn fail_reactions(&self, message_id: u64) {
        self.state
            .lock()
            .unwrap()
            .failing_reactions
            .insert(message_id);
    }

    /// Summary documents currently live in a channel, oldest first.
    pub fn documents_in(&self, channel_id: u64) -> Vec<(u64, SummaryDocument)> {
        let state = self.state.lock().unwrap();
        state
            .channels
            .get(&channel_id)
            .into_iter()
            .flatten()
            .filter_map(|m| state.documents.get(&m.id).map(|d| (m.id, d.clone())))
            .collect()
    }

    pub fn member_fetches(&self) -> usize {
        self.member_fetches.load(Ordering::SeqCst)
    }
}

impl ChatPlatform for MockPlatform {
    fn bot_user_id(&self) -> u64 {
        self.bot_id
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>, PlatformError> {
        let state = self.state.lock().unwrap();
        if state.failing_history.contains(&channel_id) {
            return Err(PlatformError::Network("history unavailable".to_string()));
        }
        Ok(state
            .channels
            .get(&channel_id)
            .map(|msgs| msgs.iter().rev().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn reaction_users(
        &self,
        _channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<Vec<DiscordUser>, PlatformError> {
        let state = self.state.lock().unwrap();
        if state.failing_reactions.contains(&message_id) {
            return Err(PlatformError::Network("reactions unavailable".to_string()));
        }
        Ok(state
            .reactors
            .iter()
            // Discord keys reactions by the exact emoji spelling.
            .find(|((id, e), _)| *id == message_id && e == emoji)
            .map(|(_, users)| users.clone())
            .unwrap_or_default())
    }

    fn cached_member(&self, guild_id: u64, user_id: u64) -> Option<DiscordMember> {
        self.state
            .lock()
            .unwrap()
            .cached_members
            .get(&(guild_id, user_id))
            .cloned()
    }

    async fn fetch_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<DiscordMember, PlatformError> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let member = state
            .remote_members
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or_else(|| not_found(DiscordErrorCode::UnknownMember, "Unknown Member"))?;
        state
            .cached_members
            .insert((guild_id, user_id), member.clone());
        Ok(member)
    }

    async fn send_summary(
        &self,
        channel_id: u64,
        document: &SummaryDocument,
    ) -> Result<u64, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let message = DiscordMessage {
            id,
            channel_id,
            guild_id: None,
            author: DiscordUser::new(self.bot_id, "lesson-bot").as_bot(),
            kind: MessageKind::Regular,
            content: String::new(),
            reactions: vec![],
            embed_titles: vec![Some(document.title.clone())],
        };
        state.channels.entry(channel_id).or_default().push(message);
        state.documents.insert(id, document.clone());
        Ok(id)
    }

    async fn edit_summary(
        &self,
        channel_id: u64,
        message_id: u64,
        document: &SummaryDocument,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        let message = state
            .channels
            .get_mut(&channel_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| not_found(DiscordErrorCode::UnknownMessage, "Unknown Message"))?;
        message.embed_titles = vec![Some(document.title.clone())];
        state.documents.insert(message_id, document.clone());
        Ok(())
    }
}

fn not_found(code: DiscordErrorCode, message: &str) -> PlatformError {
    PlatformError::Api {
        code,
        http_status: 404,
        message: message.to_string(),
    }
}

/// Request message as the form webhook posts it.
pub fn request_message(
    id: u64,
    channel_id: u64,
    guild_id: Option<u64>,
    content: &str,
    reactions: &[(&str, u64)],
) -> DiscordMessage {
    DiscordMessage {
        id,
        channel_id,
        guild_id,
        author: DiscordUser::new(1, "form-webhook").as_bot(),
        kind: MessageKind::Regular,
        content: content.to_string(),
        reactions: reactions
            .iter()
            .map(|(emoji, count)| ReactionCount {
                emoji: emoji.to_string(),
                count: *count,
            })
            .collect(),
        embed_titles: vec![],
    }
}

pub fn member(guild_id: u64, user: DiscordUser, nick: Option<&str>) -> DiscordMember {
    DiscordMember {
        user,
        guild_id,
        nick: nick.map(String::from),
    }
}

// ── MemoryRowStore ───────────────────────────────────────────────────────────

/// One sheet held in memory. Clones share the same cells.
#[derive(Clone, Default)]
pub struct MemoryRowStore {
    cells: Arc<Mutex<HashMap<(u32, u32), String>>>,
    writes: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill `column` from row 1 downwards.
    pub fn with_column(self, column: u32, values: &[&str]) -> Self {
        {
            let mut cells = self.cells.lock().unwrap();
            for (idx, value) in values.iter().enumerate() {
                cells.insert((idx as u32 + 1, column), value.to_string());
            }
        }
        self
    }

    pub fn cell(&self, row: u32, column: u32) -> Option<String> {
        self.cells.lock().unwrap().get(&(row, column)).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

impl RowStore for MemoryRowStore {
    async fn read_column(&self, column: u32) -> Result<Vec<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        let cells = self.cells.lock().unwrap();
        let last = cells
            .keys()
            .filter(|(_, c)| *c == column)
            .map(|(r, _)| *r)
            .max()
            .unwrap_or(0);
        Ok((1..=last)
            .map(|row| cells.get(&(row, column)).cloned().unwrap_or_default())
            .collect())
    }

    async fn write_cell(&self, row: u32, column: u32, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 500,
                message: "write rejected".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.cells
            .lock()
            .unwrap()
            .insert((row, column), value.to_string());
        Ok(())
    }
}

// ── MemoryWorkbook ───────────────────────────────────────────────────────────

/// Spreadsheets keyed by (spreadsheet id, sheet name).
#[derive(Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Arc<Mutex<HashMap<(String, String), MemoryRowStore>>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, spreadsheet_id: &str, sheet_name: &str, sheet: MemoryRowStore) {
        self.sheets
            .lock()
            .unwrap()
            .insert((spreadsheet_id.to_string(), sheet_name.to_string()), sheet);
    }
}

impl Workbook for MemoryWorkbook {
    type Sheet = MemoryRowStore;

    async fn open(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<MemoryRowStore, StoreError> {
        self.sheets
            .lock()
            .unwrap()
            .get(&(spreadsheet_id.to_string(), sheet_name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::SheetNotFound {
                spreadsheet_id: spreadsheet_id.to_string(),
                sheet: sheet_name.to_string(),
            })
    }
}
