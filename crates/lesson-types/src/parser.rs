//! Request text parser
//!
//! Reads the form-generated request template:
//!
//! ```text
//! タイムスタンプ: 2024/05/01 10:00
//! 学籍番号・名前・ルール・ブキ: 山田太郎 / ガチエリア / シューター
//! 希望方法
//! 後日同時視聴で見てほしいです
//! ```
//!
//! Parsing never fails. Anything missing comes back as a placeholder.

#[path = "parser_tests.rs"]
mod parser_tests;

use std::sync::LazyLock;

use regex::Regex;

use crate::request::{
    NOT_RECORDED, ParsedRequest, SegmentLayout, UNDECIDED, UNKNOWN_DATE, UNKNOWN_NAME,
};

const TIMESTAMP_LABEL: &str = "タイムスタンプ";
const METHOD_LABEL: &str = "希望方法";
const SEGMENT_DELIMITER: char = '/';

static TIMESTAMP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{TIMESTAMP_LABEL}(?:\s*[:：])?\s*([^:：\s].*)"))
        .expect("timestamp regex")
});

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[/-](\d{1,2})[/-](\d{1,2})").expect("date regex"));

static STUDENT_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"学籍番号[^:：\n]*[:：]\s*(.+)").expect("segment regex"));

/// Where a method phrase is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Anywhere in the message.
    Anywhere,
    /// Only on the line after the preferred-method label.
    MethodLine,
}

/// Phrase to short label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRule {
    pub phrase: &'static str,
    pub label: &'static str,
    pub scope: MatchScope,
}

impl MethodRule {
    pub const fn new(phrase: &'static str, label: &'static str, scope: MatchScope) -> Self {
        Self {
            phrase,
            label,
            scope,
        }
    }
}

/// Checked in order; the first hit wins.
pub const DEFAULT_METHOD_RULES: &[MethodRule] = &[
    MethodRule::new("同時視聴", "後日同時視聴", MatchScope::Anywhere),
    MethodRule::new("リアルタイム", "リアルタイム", MatchScope::Anywhere),
    MethodRule::new("録画", "録画レビュー", MatchScope::MethodLine),
    MethodRule::new("通話", "通話", MatchScope::MethodLine),
    MethodRule::new("チャット", "チャット", MatchScope::MethodLine),
];

/// Parses request text into [`ParsedRequest`] fields.
#[derive(Debug, Clone)]
pub struct RequestParser {
    layout: SegmentLayout,
    method_rules: Vec<MethodRule>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(SegmentLayout::default())
    }
}

impl RequestParser {
    pub fn new(layout: SegmentLayout) -> Self {
        Self {
            layout,
            method_rules: DEFAULT_METHOD_RULES.to_vec(),
        }
    }

    /// Replace the method table.
    pub fn with_method_rules(mut self, rules: impl Into<Vec<MethodRule>>) -> Self {
        self.method_rules = rules.into();
        self
    }

    pub fn parse(&self, text: &str) -> ParsedRequest {
        let canonical_key = canonical_key(text);
        let display_date = canonical_key
            .as_deref()
            .and_then(display_date)
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());
        let (applicant_name, rule, weapon) = self.segment_fields(text);

        ParsedRequest {
            applicant_name,
            display_date,
            rule,
            weapon,
            method: self.method(text),
            canonical_key,
            source: None,
        }
    }

    fn segment_fields(&self, text: &str) -> (String, String, String) {
        let placeholders = || {
            (
                UNKNOWN_NAME.to_string(),
                UNDECIDED.to_string(),
                UNDECIDED.to_string(),
            )
        };

        let Some(caps) = STUDENT_SEGMENT.captures(text) else {
            return placeholders();
        };
        let segment = caps[1].replace('／', "/");
        let parts: Vec<&str> = segment.split(SEGMENT_DELIMITER).map(str::trim).collect();
        if parts.len() != self.layout.field_count() {
            return placeholders();
        }

        let fields = match self.layout {
            SegmentLayout::NameRuleWeapon => &parts[..],
            SegmentLayout::IdNameRuleWeapon => &parts[1..],
        };
        (
            or_placeholder(fields[0], UNKNOWN_NAME),
            or_placeholder(fields[1], UNDECIDED),
            or_placeholder(fields[2], UNDECIDED),
        )
    }

    fn method(&self, text: &str) -> String {
        let anywhere = self
            .method_rules
            .iter()
            .filter(|r| r.scope == MatchScope::Anywhere)
            .find(|r| text.contains(r.phrase));
        if let Some(rule) = anywhere {
            return rule.label.to_string();
        }

        let Some(line) = method_line(text) else {
            return NOT_RECORDED.to_string();
        };
        self.method_rules
            .iter()
            .find(|r| line.contains(r.phrase))
            .map_or_else(|| line.to_string(), |r| r.label.to_string())
    }
}

/// The trimmed value of the first timestamp line, if any.
pub fn canonical_key(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| line.contains(TIMESTAMP_LABEL))
        .find_map(|line| TIMESTAMP_LINE.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .filter(|key| !key.is_empty())
}

fn display_date(key: &str) -> Option<String> {
    let caps = DATE.captures(key)?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{month:02}/{day:02}"))
}

fn method_line(text: &str) -> Option<&str> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| line.contains(METHOD_LABEL))?;
    lines.next().map(str::trim).filter(|line| !line.is_empty())
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}
