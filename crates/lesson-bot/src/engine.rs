//! One reconciliation pass over every configured tier.
//!
//! Tiers, channels and messages are processed strictly in order. For each
//! source channel the history is fetched once and split into
//! unacknowledged requests (listed in the tier's summary) and acknowledged
//! ones (written back to the tier's sheet).

#[path = "engine_tests.rs"]
mod engine_tests;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use lesson_types::{
    DiscordMessage, MentionMap, MessageKind, MessageSource, ParsedRequest, RequestParser,
    SummaryDocument,
};
use tracing::{error, info, warn};

use crate::config::{Config, TierConfig};
use crate::errors::log_platform_error;
use crate::mention::MentionResolver;
use crate::platform::ChatPlatform;
use crate::reconciler::{MessageOutcome, ReactionReconciler, SheetLayout};
use crate::store::Workbook;
use crate::summary::{UpsertAction, upsert_summary};

/// What happened to one tier during a pass.
#[derive(Debug, Clone, Default)]
pub struct TierReport {
    pub tier: String,
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub pending: usize,
    pub summary: Option<UpsertAction>,
    pub summary_error: Option<String>,
    pub sheet_error: Option<String>,
    pub outcomes: Vec<MessageOutcome>,
}

impl TierReport {
    fn new(tier: &str) -> Self {
        Self {
            tier: tier.to_string(),
            ..Default::default()
        }
    }

    pub fn updated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    MessageOutcome::Updated { .. } | MessageOutcome::WouldUpdate { .. }
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.updated() - self.failed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tiers: Vec<TierReport>,
}

impl RunReport {
    /// One summary line per tier.
    pub fn log(&self) {
        for t in &self.tiers {
            info!(
                tier = %t.tier,
                channels = t.channels_scanned,
                channel_errors = t.channels_failed,
                pending = t.pending,
                summary = ?t.summary,
                updated = t.updated(),
                skipped = t.skipped(),
                failed = t.failed(),
                "Tier finished"
            );
        }
    }

    pub fn failures(&self) -> usize {
        self.tiers
            .iter()
            .map(|t| {
                t.failed()
                    + t.channels_failed
                    + usize::from(t.summary_error.is_some())
                    + usize::from(t.sheet_error.is_some())
            })
            .sum()
    }
}

pub struct Engine<'a, P, W> {
    platform: &'a P,
    workbook: Option<&'a W>,
    config: &'a Config,
    mentions: &'a MentionMap,
    offset: FixedOffset,
    now: DateTime<Utc>,
    dry_run: bool,
}

impl<'a, P: ChatPlatform, W: Workbook> Engine<'a, P, W> {
    pub fn new(
        platform: &'a P,
        workbook: Option<&'a W>,
        config: &'a Config,
        mentions: &'a MentionMap,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            workbook,
            config,
            mentions,
            offset: config.utc_offset()?,
            now: Utc::now(),
            dry_run: false,
        })
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pin the refresh time stamped on summaries.
    #[cfg(test)]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        for tier in &self.config.tiers {
            report.tiers.push(self.run_tier(tier).await);
        }
        report
    }

    async fn run_tier(&self, tier: &TierConfig) -> TierReport {
        let mut report = TierReport::new(&tier.name);
        if tier.source_channel_ids.is_empty() {
            info!(tier = %tier.name, "No source channels, skipping tier");
            return report;
        }

        let sheet = self.open_sheet(tier, &mut report).await;
        let parser = RequestParser::new(tier.segment_layout);
        let discord = &self.config.discord;
        let mut pending = Vec::new();

        for &channel_id in &tier.source_channel_ids {
            let history = match self
                .platform
                .recent_messages(channel_id, discord.history_limit)
                .await
            {
                Ok(history) => history,
                Err(e) => {
                    log_platform_error(&format!("Failed to read channel {channel_id}"), &e);
                    report.channels_failed += 1;
                    continue;
                }
            };
            report.channels_scanned += 1;

            // History arrives newest first; list requests oldest first.
            let (acknowledged, open): (Vec<&DiscordMessage>, Vec<&DiscordMessage>) = history
                .iter()
                .rev()
                .filter(|m| is_request(m, self.platform.bot_user_id()))
                .partition(|m| m.has_reaction(&discord.ack_emoji));

            pending.extend(open.iter().map(|m| parse_request(&parser, m)));

            if let Some(sheet) = &sheet {
                let resolver = MentionResolver::new(self.platform, self.mentions);
                let layout = SheetLayout::for_tier(tier, &self.config.sheets.status_label);
                let outcomes = ReactionReconciler::new(
                    self.platform,
                    resolver,
                    sheet,
                    layout,
                    &discord.ack_emoji,
                )
                .dry_run(self.dry_run)
                .reconcile(&acknowledged)
                .await;
                report.outcomes.extend(outcomes);
            }
        }

        report.pending = pending.len();
        self.publish_summary(tier, &pending, &mut report).await;
        report
    }

    async fn open_sheet(&self, tier: &TierConfig, report: &mut TierReport) -> Option<W::Sheet> {
        let Some((spreadsheet_id, sheet_name)) = tier.sheet() else {
            info!(tier = %tier.name, "No spreadsheet configured, reaction sync disabled");
            return None;
        };
        let Some(workbook) = self.workbook else {
            info!(tier = %tier.name, "No Sheets credentials, reaction sync disabled");
            return None;
        };
        match workbook.open(spreadsheet_id, sheet_name).await {
            Ok(sheet) => Some(sheet),
            Err(e) => {
                error!(tier = %tier.name, "Failed to open sheet '{}': {}", sheet_name, e);
                report.sheet_error = Some(e.to_string());
                None
            }
        }
    }

    async fn publish_summary(
        &self,
        tier: &TierConfig,
        pending: &[ParsedRequest],
        report: &mut TierReport,
    ) {
        let Some(list_channel_id) = tier.list_channel_id else {
            info!(tier = %tier.name, "No list channel, summary disabled");
            return;
        };
        // A partial listing would drop requests that are still open.
        if report.channels_failed > 0 {
            warn!(
                tier = %tier.name,
                "Source channel unreadable, leaving the previous summary in place"
            );
            return;
        }

        let document = SummaryDocument::build(tier.title(), pending, self.now, self.offset);
        match upsert_summary(
            self.platform,
            list_channel_id,
            &document,
            self.config.discord.summary_scan_limit,
            self.dry_run,
        )
        .await
        {
            Ok(action) => report.summary = Some(action),
            Err(e) => {
                log_platform_error(
                    &format!("Failed to update summary in channel {list_channel_id}"),
                    &e,
                );
                report.summary_error = Some(e.to_string());
            }
        }
    }
}

/// A message that may be a request: a user or webhook post with text,
/// never a system notice or one of this bot's own summaries.
pub fn is_request(message: &DiscordMessage, bot_user_id: u64) -> bool {
    message.kind != MessageKind::System
        && message.author.id != bot_user_id
        && !message.content.trim().is_empty()
}

fn parse_request(parser: &RequestParser, message: &DiscordMessage) -> ParsedRequest {
    parser.parse(&message.content).with_source(MessageSource {
        message_id: message.id,
        channel_id: message.channel_id,
        jump_link: message.jump_link(),
    })
}
