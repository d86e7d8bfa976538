//! Summary document for the list channel
//!
//! A summary is rebuilt from scratch on every run and rendered as a single
//! embed. The engine upserts it by title, so the title is its identity.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ParsedRequest;

/// Discord allows at most 25 fields per embed.
pub const MAX_SUMMARY_FIELDS: usize = 25;
/// Shown instead of an empty list.
pub const EMPTY_SUMMARY_TEXT: &str = "現在、未対応の依頼はありません。";

/// Discord rejects embeds whose title, description, fields and footer
/// together exceed this many characters.
pub const MAX_EMBED_CHARS: usize = 6000;

const MAX_TITLE: usize = 256;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const PENDING_COLOR: u32 = 0xE67E22;
const CLEAR_COLOR: u32 = 0x2ECC71;

/// One listed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryField {
    pub name: String,
    pub value: String,
}

/// Rendered summary, ready to send as an embed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryDocument {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<SummaryField>,
    pub footer: String,
    pub color: u32,
}

impl SummaryDocument {
    /// Build a summary of unacknowledged requests.
    ///
    /// Lists requests in the given order until [`MAX_SUMMARY_FIELDS`] or
    /// [`MAX_EMBED_CHARS`] would be exceeded; the rest are left out of this
    /// pass. The footer carries the refresh time in `offset`.
    pub fn build(
        title: impl Into<String>,
        requests: &[ParsedRequest],
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        let title: String = title.into();
        let title = truncate_chars(&title, MAX_TITLE);
        let footer = refreshed_at(now, offset);
        let mut budget = MAX_EMBED_CHARS
            .saturating_sub(title.chars().count())
            .saturating_sub(footer.chars().count());

        let mut fields = Vec::new();
        for field in requests.iter().take(MAX_SUMMARY_FIELDS).map(render_field) {
            let size = field.char_count();
            if size > budget {
                break;
            }
            budget -= size;
            fields.push(field);
        }

        let (description, color) = if fields.is_empty() {
            (Some(EMPTY_SUMMARY_TEXT.to_string()), CLEAR_COLOR)
        } else {
            (None, PENDING_COLOR)
        };

        Self {
            title,
            description,
            fields,
            footer,
            color,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Characters Discord counts against [`MAX_EMBED_CHARS`].
    pub fn char_count(&self) -> usize {
        self.title.chars().count()
            + self.description.as_deref().map_or(0, |d| d.chars().count())
            + self.fields.iter().map(SummaryField::char_count).sum::<usize>()
            + self.footer.chars().count()
    }
}

impl SummaryField {
    fn char_count(&self) -> usize {
        self.name.chars().count() + self.value.chars().count()
    }
}

fn render_field(req: &ParsedRequest) -> SummaryField {
    let name = format!("{} ({})", req.applicant_name, req.display_date);
    let mut value = format!(
        "ルール: {}\nブキ: {}\n方法: {}",
        req.rule, req.weapon, req.method
    );
    if let Some(link) = req.jump_link() {
        value.push_str(&format!("\n[依頼メッセージへ]({link})"));
    }
    SummaryField {
        name: truncate_chars(&name, MAX_FIELD_NAME),
        value: truncate_chars(&value, MAX_FIELD_VALUE),
    }
}

fn refreshed_at(now: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = now.with_timezone(&offset);
    format!("最終更新: {} (UTC{})", local.format("%Y/%m/%d %H:%M"), offset)
}

/// Cut to `max` characters, ending with `…` when something was dropped.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
