//! Configuration management for lesson-bot

#[path = "config_tests.rs"]
mod config_tests;

use std::fs;

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;
use lesson_types::SegmentLayout;
use serde::{Deserialize, Serialize};

/// Environment variable access, swappable in tests.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Tiers recognised in env mode, in processing order.
const ENV_TIERS: &[&str] = &["LOWER", "UPPER", "INTERCOLLEGE"];

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordSettings,
    #[serde(default)]
    pub sheets: SheetsSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_table: Option<MentionTableConfig>,
    /// Processed in order, one after another.
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
}

/// Discord specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Bot token from the Discord developer portal
    #[serde(default)]
    pub bot_token: String,
    /// Reaction that marks a request as taken
    #[serde(default = "default_ack_emoji")]
    pub ack_emoji: String,
    /// Messages read per source channel (Discord caps a page at 100)
    #[serde(default = "default_history_limit")]
    pub history_limit: u8,
    /// Messages scanned in a list channel when looking for the previous summary
    #[serde(default = "default_summary_scan_limit")]
    pub summary_scan_limit: u8,
    /// Offset used for the "last refreshed" stamp
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Google Sheets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsSettings {
    /// Path to a service-account JSON key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,
    /// The service-account JSON key itself; wins over `credentials_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_json: Option<String>,
    /// Written to the status column of every acknowledged row
    #[serde(default = "default_status_label")]
    pub status_label: String,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            credentials_file: None,
            credentials_json: None,
            status_label: default_status_label(),
        }
    }
}

/// Sheet mapping Discord user ids to the names written into request rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentionTableConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    #[serde(default = "default_mention_id_column")]
    pub id_column: u32,
    #[serde(default = "default_mention_name_column")]
    pub name_column: u32,
}

/// One applicant tier: where its requests arrive, where the summary goes,
/// and which sheet records acknowledgements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_title: Option<String>,
    #[serde(default)]
    pub source_channel_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_channel_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: u32,
    #[serde(default = "default_names_column")]
    pub names_column: u32,
    #[serde(default = "default_status_column")]
    pub status_column: u32,
    #[serde(default)]
    pub segment_layout: SegmentLayout,
}

impl TierConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary_title: None,
            source_channel_ids: Vec::new(),
            list_channel_id: None,
            spreadsheet_id: None,
            sheet_name: None,
            timestamp_column: default_timestamp_column(),
            names_column: default_names_column(),
            status_column: default_status_column(),
            segment_layout: SegmentLayout::default(),
        }
    }

    pub fn title(&self) -> String {
        self.summary_title
            .clone()
            .unwrap_or_else(|| format!("未対応の指導依頼一覧 ({})", self.name))
    }

    /// Spreadsheet id and sheet name, when both are set and non-empty.
    pub fn sheet(&self) -> Option<(&str, &str)> {
        let id = self.spreadsheet_id.as_deref().filter(|s| !s.is_empty())?;
        let name = self.sheet_name.as_deref().filter(|s| !s.is_empty())?;
        Some((id, name))
    }

    pub fn summary_enabled(&self) -> bool {
        !self.source_channel_ids.is_empty() && self.list_channel_id.is_some()
    }

    pub fn reconcile_enabled(&self) -> bool {
        !self.source_channel_ids.is_empty() && self.sheet().is_some()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.discard_zero_ids();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env(env: &impl ReadEnv) -> Result<Self> {
        let bot_token = env
            .var("DISCORD_BOT_TOKEN")
            .filter(|t| !t.is_empty())
            .context("DISCORD_BOT_TOKEN not set")?;

        let discord = DiscordSettings {
            bot_token,
            ack_emoji: env.var("ACK_EMOJI").unwrap_or_else(default_ack_emoji),
            history_limit: parse_or(env, "HISTORY_LIMIT", default_history_limit())?,
            summary_scan_limit: parse_or(env, "SUMMARY_SCAN_LIMIT", default_summary_scan_limit())?,
            utc_offset_hours: parse_or(env, "UTC_OFFSET_HOURS", default_utc_offset_hours())?,
        };

        let sheets = SheetsSettings {
            credentials_file: non_empty(env, "GOOGLE_CREDENTIALS_FILE"),
            credentials_json: non_empty(env, "GOOGLE_CREDENTIALS_JSON"),
            status_label: env.var("STATUS_LABEL").unwrap_or_else(default_status_label),
        };

        let mention_table = match (
            non_empty(env, "MENTION_SPREADSHEET_ID"),
            non_empty(env, "MENTION_SHEET_NAME"),
        ) {
            (Some(spreadsheet_id), Some(sheet_name)) => Some(MentionTableConfig {
                spreadsheet_id,
                sheet_name,
                id_column: parse_or(env, "MENTION_ID_COLUMN", default_mention_id_column())?,
                name_column: parse_or(env, "MENTION_NAME_COLUMN", default_mention_name_column())?,
            }),
            _ => None,
        };

        let tiers = ENV_TIERS
            .iter()
            .map(|prefix| tier_from_env(env, prefix))
            .collect::<Result<Vec<_>>>()?;

        let config = Config {
            discord,
            sheets,
            mention_table,
            tiers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Drop channel ids of 0. Discord never issues them, so a tier left
    /// without channels is skipped like one that was never filled in.
    fn discard_zero_ids(&mut self) {
        for tier in &mut self.tiers {
            tier.source_channel_ids.retain(|id| *id != 0);
            tier.list_channel_id = tier.list_channel_id.filter(|id| *id != 0);
        }
    }

    /// Reject values that can only be typos.
    pub fn validate(&self) -> Result<()> {
        if self.discord.history_limit == 0 || self.discord.history_limit > 100 {
            bail!(
                "history_limit must be between 1 and 100, got {}",
                self.discord.history_limit
            );
        }
        if self.discord.summary_scan_limit == 0 || self.discord.summary_scan_limit > 100 {
            bail!(
                "summary_scan_limit must be between 1 and 100, got {}",
                self.discord.summary_scan_limit
            );
        }
        if self.discord.ack_emoji.trim().is_empty() {
            bail!("ack_emoji must not be empty");
        }
        let zero_emoji_id = self
            .discord
            .ack_emoji
            .trim()
            .strip_suffix('>')
            .and_then(|e| e.rsplit_once(':'))
            .is_some_and(|(_, id)| id.parse::<u64>() == Ok(0));
        if zero_emoji_id {
            bail!("ack_emoji custom emoji id must not be 0");
        }
        self.utc_offset()?;

        for tier in &self.tiers {
            for (label, column) in [
                ("timestamp_column", tier.timestamp_column),
                ("names_column", tier.names_column),
                ("status_column", tier.status_column),
            ] {
                if column == 0 {
                    bail!("tier '{}': {} is 1-based, got 0", tier.name, label);
                }
            }
        }
        if let Some(table) = &self.mention_table {
            if table.id_column == 0 || table.name_column == 0 {
                bail!("mention_table columns are 1-based, got 0");
            }
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.discord.utc_offset_hours * 3600).with_context(|| {
            format!(
                "utc_offset_hours out of range: {}",
                self.discord.utc_offset_hours
            )
        })
    }

    /// The service-account key, read from `credentials_json` or `credentials_file`.
    pub fn credentials_blob(&self) -> Result<Option<String>> {
        if let Some(json) = self.sheets.credentials_json.as_ref().filter(|s| !s.is_empty()) {
            return Ok(Some(json.clone()));
        }
        match &self.sheets.credentials_file {
            Some(path) if !path.is_empty() => fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read credentials file: {}", path)),
            _ => Ok(None),
        }
    }

    /// Human-readable notes about tiers that will only partly run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.tiers.is_empty() {
            warnings.push("no tiers configured; nothing to do".to_string());
        }
        for tier in &self.tiers {
            if tier.source_channel_ids.is_empty() {
                warnings.push(format!("tier '{}': no source channels, skipped", tier.name));
                continue;
            }
            if !tier.summary_enabled() {
                warnings.push(format!(
                    "tier '{}': no list channel, summary disabled",
                    tier.name
                ));
            }
            if !tier.reconcile_enabled() {
                warnings.push(format!(
                    "tier '{}': no spreadsheet, reaction sync disabled",
                    tier.name
                ));
            }
        }
        warnings
    }
}

fn tier_from_env(env: &impl ReadEnv, prefix: &str) -> Result<TierConfig> {
    let key = |suffix: &str| format!("{prefix}_{suffix}");

    let mut tier = TierConfig::new(prefix.to_lowercase());
    tier.summary_title = non_empty(env, &key("SUMMARY_TITLE"));
    tier.source_channel_ids =
        parse_id_list(&env.var(&key("SOURCE_CHANNEL_IDS")).unwrap_or_default());
    tier.list_channel_id = non_empty(env, &key("LIST_CHANNEL_ID"))
        .and_then(|s| s.parse().ok())
        .filter(|id| *id != 0);
    tier.spreadsheet_id = non_empty(env, &key("SPREADSHEET_ID"));
    tier.sheet_name = non_empty(env, &key("SHEET_NAME"));
    tier.timestamp_column = parse_or(env, &key("TIMESTAMP_COLUMN"), tier.timestamp_column)?;
    tier.names_column = parse_or(env, &key("NAMES_COLUMN"), tier.names_column)?;
    tier.status_column = parse_or(env, &key("STATUS_COLUMN"), tier.status_column)?;
    if let Some(layout) = non_empty(env, &key("SEGMENT_LAYOUT")) {
        tier.segment_layout = match layout.to_lowercase().as_str() {
            "id_name_rule_weapon" => SegmentLayout::IdNameRuleWeapon,
            _ => SegmentLayout::NameRuleWeapon,
        };
    }
    Ok(tier)
}

fn non_empty(env: &impl ReadEnv, key: &str) -> Option<String> {
    env.var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(env: &impl ReadEnv, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(env, key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} is not a valid number: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_id_list(s: &str) -> Vec<u64> {
    s.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .filter_map(|x| x.parse::<u64>().ok())
        .filter(|id| *id != 0)
        .collect()
}

fn default_ack_emoji() -> String {
    "✅".to_string()
}

fn default_history_limit() -> u8 {
    100
}

fn default_summary_scan_limit() -> u8 {
    50
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_status_label() -> String {
    "済".to_string()
}

fn default_mention_id_column() -> u32 {
    1
}

fn default_mention_name_column() -> u32 {
    2
}

fn default_timestamp_column() -> u32 {
    1
}

fn default_names_column() -> u32 {
    8
}

fn default_status_column() -> u32 {
    9
}
