//! Write acknowledgers of request messages back to the request sheet.
//!
//! Each acknowledged message is handled on its own: a failed reaction fetch
//! or cell write becomes a [`MessageOutcome::Failed`] for that message and
//! the rest of the channel carries on.

#[path = "reconciler_tests.rs"]
mod reconciler_tests;

use lesson_types::{AcknowledgementSet, DiscordMessage, DiscordUser, canonical_key, join_names};
use tracing::{debug, info, warn};

use crate::config::TierConfig;
use crate::mention::MentionResolver;
use crate::platform::ChatPlatform;
use crate::store::{RowStore, find_row};

/// Result of reconciling one acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Names and status written to `row`.
    Updated {
        message_id: u64,
        row: u32,
        names: String,
    },
    /// Dry run: the write that would have happened.
    WouldUpdate {
        message_id: u64,
        row: u32,
        names: String,
    },
    /// The message text has no timestamp line.
    KeyNotFound { message_id: u64 },
    /// No sheet row carries the message's timestamp.
    RowNotFound { message_id: u64, key: String },
    /// Only bots reacted.
    NoHumanReactors { message_id: u64 },
    Failed { message_id: u64, error: String },
}

impl MessageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Sheet columns and labels used when writing acknowledgements.
#[derive(Debug, Clone)]
pub struct SheetLayout<'a> {
    pub key_column: u32,
    pub names_column: u32,
    pub status_column: u32,
    pub status_label: &'a str,
}

impl<'a> SheetLayout<'a> {
    pub fn for_tier(tier: &TierConfig, status_label: &'a str) -> Self {
        Self {
            key_column: tier.timestamp_column,
            names_column: tier.names_column,
            status_column: tier.status_column,
            status_label,
        }
    }
}

pub struct ReactionReconciler<'a, P, S> {
    platform: &'a P,
    resolver: MentionResolver<'a, P>,
    sheet: &'a S,
    layout: SheetLayout<'a>,
    ack_emoji: &'a str,
    dry_run: bool,
}

impl<'a, P: ChatPlatform, S: RowStore> ReactionReconciler<'a, P, S> {
    pub fn new(
        platform: &'a P,
        resolver: MentionResolver<'a, P>,
        sheet: &'a S,
        layout: SheetLayout<'a>,
        ack_emoji: &'a str,
    ) -> Self {
        Self {
            platform,
            resolver,
            sheet,
            layout,
            ack_emoji,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reconcile the acknowledged messages of one channel.
    ///
    /// The key column is read once for the whole batch. If that read fails,
    /// every message in the batch is reported as failed.
    pub async fn reconcile(&self, acknowledged: &[&DiscordMessage]) -> Vec<MessageOutcome> {
        if acknowledged.is_empty() {
            return Vec::new();
        }

        let keys = match self.sheet.read_column(self.layout.key_column).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to read key column {}: {}", self.layout.key_column, e);
                return acknowledged
                    .iter()
                    .map(|m| MessageOutcome::Failed {
                        message_id: m.id,
                        error: e.to_string(),
                    })
                    .collect();
            }
        };

        let mut outcomes = Vec::with_capacity(acknowledged.len());
        for message in acknowledged {
            let outcome = self.reconcile_message(message, &keys).await;
            log_outcome(&outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn reconcile_message(&self, message: &DiscordMessage, keys: &[String]) -> MessageOutcome {
        let message_id = message.id;
        let Some(key) = canonical_key(&message.content) else {
            return MessageOutcome::KeyNotFound { message_id };
        };

        let emoji = message
            .matching_reaction(self.ack_emoji)
            .map_or(self.ack_emoji, |r| r.emoji.as_str());
        let reactors = match self
            .platform
            .reaction_users(message.channel_id, message_id, emoji)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                return MessageOutcome::Failed {
                    message_id,
                    error: e.to_string(),
                };
            }
        };

        let (ack, humans) = acknowledgement(message_id, Some(key.clone()), reactors);
        if ack.is_empty() {
            return MessageOutcome::NoHumanReactors { message_id };
        }

        let mut names = Vec::with_capacity(humans.len());
        for user in &humans {
            names.push(self.resolver.resolve(user, message.guild_id).await);
        }
        let names = join_names(names);

        let Some(row) = find_row(keys, &key) else {
            return MessageOutcome::RowNotFound { message_id, key };
        };

        if self.dry_run {
            return MessageOutcome::WouldUpdate {
                message_id,
                row,
                names,
            };
        }

        if let Err(e) = self.write_row(row, &names).await {
            return MessageOutcome::Failed {
                message_id,
                error: e.to_string(),
            };
        }
        MessageOutcome::Updated {
            message_id,
            row,
            names,
        }
    }

    async fn write_row(&self, row: u32, names: &str) -> Result<(), crate::errors::StoreError> {
        self.sheet
            .write_cell(row, self.layout.names_column, names)
            .await?;
        self.sheet
            .write_cell(row, self.layout.status_column, self.layout.status_label)
            .await
    }
}

/// Human reactors of a message, each user once.
fn acknowledgement(
    message_id: u64,
    key: Option<String>,
    reactors: Vec<DiscordUser>,
) -> (AcknowledgementSet, Vec<DiscordUser>) {
    let mut ack = AcknowledgementSet::new(message_id, key);
    let humans = reactors
        .into_iter()
        .filter(|u| !u.bot)
        .filter(|u| ack.reactor_ids.insert(u.id))
        .collect();
    (ack, humans)
}

fn log_outcome(outcome: &MessageOutcome) {
    match outcome {
        MessageOutcome::Updated {
            message_id,
            row,
            names,
        } => info!(message_id, row, names = %names, "Recorded acknowledgement"),
        MessageOutcome::WouldUpdate {
            message_id,
            row,
            names,
        } => info!(message_id, row, names = %names, "Dry run: acknowledgement not written"),
        MessageOutcome::KeyNotFound { message_id } => {
            warn!(message_id, "Acknowledged message has no timestamp line")
        }
        MessageOutcome::RowNotFound { message_id, key } => {
            warn!(message_id, key = %key, "No sheet row for timestamp")
        }
        MessageOutcome::NoHumanReactors { message_id } => {
            debug!(message_id, "Only bots reacted, skipped")
        }
        MessageOutcome::Failed { message_id, error } => {
            warn!(message_id, error = %error, "Failed to reconcile message")
        }
    }
}
