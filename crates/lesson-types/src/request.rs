//! Parsed lesson requests and acknowledgement sets

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Placeholder for an applicant name that could not be read.
pub const UNKNOWN_NAME: &str = "不明";
/// Placeholder for rule or weapon fields that could not be read.
pub const UNDECIDED: &str = "未定";
/// Placeholder for a method nobody wrote down.
pub const NOT_RECORDED: &str = "未記載";
/// Placeholder for a missing or unparsable date.
pub const UNKNOWN_DATE: &str = "??";

/// How the segment after the student-number label is laid out.
///
/// Both templates have been used for the request form; the tier config picks one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentLayout {
    /// `name / rule / weapon`
    #[default]
    NameRuleWeapon,
    /// `student number / name / rule / weapon`; the number is dropped.
    IdNameRuleWeapon,
}

impl SegmentLayout {
    pub fn field_count(self) -> usize {
        match self {
            Self::NameRuleWeapon => 3,
            Self::IdNameRuleWeapon => 4,
        }
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSource {
    pub message_id: u64,
    pub channel_id: u64,
    pub jump_link: String,
}

/// Structured fields read from one request message.
///
/// Every text field is always populated; unreadable input yields the
/// placeholder constants above.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedRequest {
    pub applicant_name: String,
    /// `MM/DD` or [`UNKNOWN_DATE`]
    pub display_date: String,
    pub rule: String,
    pub weapon: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MessageSource>,
}

impl ParsedRequest {
    pub fn with_source(mut self, source: MessageSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn jump_link(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.jump_link.as_str())
    }
}

/// Human reactors on one acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgementSet {
    pub message_id: u64,
    pub canonical_key: Option<String>,
    pub reactor_ids: BTreeSet<u64>,
}

impl AcknowledgementSet {
    pub fn new(message_id: u64, canonical_key: Option<String>) -> Self {
        Self {
            message_id,
            canonical_key,
            reactor_ids: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reactor_ids.is_empty()
    }
}

/// Dedupe display names, sort them and join with `", "`.
///
/// Two reactors that resolve to the same name appear once.
pub fn join_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}
