//! Shared types for the lesson request bot
//!
//! Everything in this crate is pure: parsing request text, the mention table,
//! summary rendering and the Discord shapes the engine works with. Network
//! access lives in `lesson-bot`.

pub mod errors;
pub mod mention;
pub mod parser;
pub mod request;
pub mod summary;
pub mod types;

pub use errors::{DiscordErrorCode, ErrorCategory};
pub use mention::MentionMap;
pub use parser::{DEFAULT_METHOD_RULES, MatchScope, MethodRule, RequestParser, canonical_key};
pub use request::{AcknowledgementSet, MessageSource, ParsedRequest, SegmentLayout, join_names};
pub use summary::{
    EMPTY_SUMMARY_TEXT, MAX_EMBED_CHARS, MAX_SUMMARY_FIELDS, SummaryDocument, SummaryField,
};
pub use types::*;
