//! Error types for the chat platform and the row store.
//!
//! Serenity errors are classified into a [`DiscordErrorCode`] so callers can
//! log permanent failures (missing permissions, deleted messages) louder than
//! transient ones. Nothing here retries: a failed call skips its unit of work.

use lesson_types::{DiscordErrorCode, ErrorCategory};
use serenity::http::HttpError;
use thiserror::Error;
use tracing::{error, warn};

/// Failure talking to the chat platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Discord API error [{code:?}] (HTTP {http_status}): {message}")]
    Api {
        code: DiscordErrorCode,
        http_status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    /// Discord snowflakes are never 0.
    #[error("Invalid {0} id: 0")]
    ZeroId(&'static str),
}

impl PlatformError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api { code, .. } => code.category(),
            Self::Network(_) => ErrorCategory::Transient,
            Self::ZeroId(_) => ErrorCategory::InvalidInput,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.category().is_permanent()
    }
}

impl From<serenity::Error> for PlatformError {
    fn from(err: serenity::Error) -> Self {
        classify(&err)
    }
}

/// Classify a serenity error.
pub fn classify(err: &serenity::Error) -> PlatformError {
    match err {
        serenity::Error::Http(http_err) => classify_http(http_err),
        _ => PlatformError::Network(err.to_string()),
    }
}

fn classify_http(http_err: &HttpError) -> PlatformError {
    match http_err {
        HttpError::UnsuccessfulRequest(resp) => {
            let http_status = resp.status_code.as_u16();
            let code = if http_status == 429 {
                DiscordErrorCode::RateLimited
            } else if http_status == 401 {
                DiscordErrorCode::InvalidToken
            } else {
                DiscordErrorCode::from_raw(resp.error.code as u32)
            };
            PlatformError::Api {
                code,
                http_status,
                message: resp.error.message.clone(),
            }
        }
        _ => PlatformError::Network(http_err.to_string()),
    }
}

/// Log a platform error at the level its permanence deserves.
///
/// - Permanent errors → `error!`
/// - Everything else → `warn!`
pub fn log_platform_error(context: &str, err: &PlatformError) {
    if err.is_permanent() {
        error!(category = ?err.category(), "{}: {}", context, err);
    } else {
        warn!(category = ?err.category(), "{}: {}", context, err);
    }
}

/// Failure talking to the spreadsheet service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Sheet '{sheet}' not found in spreadsheet {spreadsheet_id}")]
    SheetNotFound {
        spreadsheet_id: String,
        sheet: String,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("Invalid cell reference: {0}")]
    InvalidReference(String),
}
