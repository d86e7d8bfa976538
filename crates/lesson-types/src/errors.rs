//! Discord error classification shared by the adapters.
//!
//! Only the distinction that drives logging is kept: whether repeating a
//! failed call later in the same run could succeed.

/// How a failed Discord call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Channel, message, member or emoji does not exist.
    NotFound,
    PermissionDenied,
    /// The request itself was rejected (oversized embed, bad id).
    InvalidInput,
    /// Token rejected.
    Auth,
    RateLimit,
    /// Network trouble, overload and anything unrecognised.
    Transient,
}

impl ErrorCategory {
    /// True if repeating the same call in this run cannot succeed.
    pub fn is_permanent(self) -> bool {
        !matches!(self, Self::RateLimit | Self::Transient)
    }
}

/// Discord JSON error codes the bot acts on.
///
/// See <https://discord.com/developers/docs/topics/opcodes-and-status-codes#json>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscordErrorCode {
    /// 10003
    UnknownChannel,
    /// 10007: the user left the guild.
    UnknownMember,
    /// 10008
    UnknownMessage,
    /// 10014: usually a misconfigured acknowledgement emoji.
    UnknownEmoji,
    /// 50001
    MissingAccess,
    /// 50013
    MissingPermissions,
    /// 50035: e.g. an embed over Discord's size limits.
    InvalidFormBody,
    /// HTTP 401, or 40001 / 50014.
    InvalidToken,
    /// HTTP 429.
    RateLimited,
    /// Any other code, kept raw for the log line.
    Other(u32),
}

impl DiscordErrorCode {
    pub fn from_raw(code: u32) -> Self {
        match code {
            10003 => Self::UnknownChannel,
            10007 => Self::UnknownMember,
            10008 => Self::UnknownMessage,
            10014 => Self::UnknownEmoji,
            50001 => Self::MissingAccess,
            50013 => Self::MissingPermissions,
            50035 => Self::InvalidFormBody,
            40001 | 50014 => Self::InvalidToken,
            other => Self::Other(other),
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            Self::UnknownChannel
            | Self::UnknownMember
            | Self::UnknownMessage
            | Self::UnknownEmoji => ErrorCategory::NotFound,
            Self::MissingAccess | Self::MissingPermissions => ErrorCategory::PermissionDenied,
            Self::InvalidFormBody => ErrorCategory::InvalidInput,
            Self::InvalidToken => ErrorCategory::Auth,
            Self::RateLimited => ErrorCategory::RateLimit,
            Self::Other(_) => ErrorCategory::Transient,
        }
    }

    pub fn is_permanent(self) -> bool {
        self.category().is_permanent()
    }
}
