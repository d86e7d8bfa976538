//! Google Sheets API v4 client
//!
//! Talks to the values endpoints directly over reqwest. Authentication uses a
//! service-account key: a signed JWT is exchanged for a short-lived access
//! token, which is cached until shortly before it expires.

#[path = "sheets_tests.rs"]
mod sheets_tests;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::StoreError;
use crate::store::{RowStore, Workbook, column_letter};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The fields of a service-account JSON key we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(blob: &str) -> Result<Self, StoreError> {
        serde_json::from_str(blob).map_err(|e| StoreError::Credentials(e.to_string()))
    }

    fn assertion(&self, now: i64) -> Result<String, StoreError> {
        #[derive(Debug, Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let claims = Claims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| StoreError::Credentials(e.to_string()))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Credentials(e.to_string()))
    }
}

/// Where access tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    ServiceAccount(ServiceAccountKey),
    /// A fixed bearer token.
    #[cfg(test)]
    Static(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

struct SheetsInner {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

/// Cheap to clone; clones share the HTTP client and the token cache.
#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<SheetsInner>,
}

impl SheetsClient {
    pub fn new(tokens: TokenSource) -> Self {
        Self::with_base_url(tokens, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(tokens: TokenSource, base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SheetsInner {
                http: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                tokens,
                cached: Mutex::new(None),
            }),
        }
    }

    /// Build from a service-account JSON blob.
    pub fn from_credentials(blob: &str) -> Result<Self, StoreError> {
        Ok(Self::new(TokenSource::ServiceAccount(
            ServiceAccountKey::from_json(blob)?,
        )))
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        let key = match &self.inner.tokens {
            #[cfg(test)]
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(key) => key,
        };

        let mut cached = self.inner.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > now) {
            return Ok(token.token.clone());
        }

        let assertion = key.assertion(now.timestamp())?;
        let response = self
            .inner
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let payload: TokenResponse = response.json().await?;
        debug!("Obtained Sheets access token for {}", key.client_email);

        let expires_at =
            now + Duration::seconds((payload.expires_in - EXPIRY_MARGIN_SECS).max(0));
        *cached = Some(CachedToken {
            token: payload.access_token.clone(),
            expires_at,
        });
        Ok(payload.access_token)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.inner.base_url)
            .map_err(|e| StoreError::InvalidReference(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidReference(self.inner.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Titles of every sheet in a spreadsheet.
    pub async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, StoreError> {
        #[derive(Deserialize)]
        struct Spreadsheet {
            #[serde(default)]
            sheets: Vec<Sheet>,
        }
        #[derive(Deserialize)]
        struct Sheet {
            properties: SheetProperties,
        }
        #[derive(Deserialize)]
        struct SheetProperties {
            title: String,
        }

        let mut url = self.url(&["v4", "spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let token = self.access_token().await?;
        let response = self.inner.http.get(url).bearer_auth(token).send().await?;
        let spreadsheet: Spreadsheet = check(response).await?.json().await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn get_column(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        column: u32,
    ) -> Result<Vec<String>, StoreError> {
        #[derive(Deserialize)]
        struct ValueRange {
            #[serde(default)]
            values: Vec<Vec<String>>,
        }

        let letter = letter(column)?;
        let range = format!("{}!{}:{}", quote_sheet(sheet_name), letter, letter);
        let mut url = self.url(&["v4", "spreadsheets", spreadsheet_id, "values", &range])?;
        url.query_pairs_mut().append_pair("majorDimension", "COLUMNS");

        let token = self.access_token().await?;
        let response = self.inner.http.get(url).bearer_auth(token).send().await?;
        let body: ValueRange = check(response).await?.json().await?;
        Ok(body.values.into_iter().next().unwrap_or_default())
    }

    async fn put_cell(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        row: u32,
        column: u32,
        value: &str,
    ) -> Result<(), StoreError> {
        if row == 0 {
            return Err(StoreError::InvalidReference("row 0".to_string()));
        }
        let range = format!("{}!{}{}", quote_sheet(sheet_name), letter(column)?, row);
        let mut url = self.url(&["v4", "spreadsheets", spreadsheet_id, "values", &range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [[value]],
        });
        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

impl Workbook for SheetsClient {
    type Sheet = SheetHandle;

    /// Fails with [`StoreError::SheetNotFound`] when the title does not exist.
    async fn open(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<SheetHandle, StoreError> {
        let titles = self.sheet_titles(spreadsheet_id).await?;
        if !titles.iter().any(|t| t == sheet_name) {
            return Err(StoreError::SheetNotFound {
                spreadsheet_id: spreadsheet_id.to_string(),
                sheet: sheet_name.to_string(),
            });
        }
        Ok(SheetHandle {
            client: self.clone(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
        })
    }
}

/// One sheet inside a spreadsheet.
#[derive(Clone)]
pub struct SheetHandle {
    client: SheetsClient,
    spreadsheet_id: String,
    sheet_name: String,
}

impl RowStore for SheetHandle {
    async fn read_column(&self, column: u32) -> Result<Vec<String>, StoreError> {
        self.client
            .get_column(&self.spreadsheet_id, &self.sheet_name, column)
            .await
    }

    async fn write_cell(&self, row: u32, column: u32, value: &str) -> Result<(), StoreError> {
        self.client
            .put_cell(&self.spreadsheet_id, &self.sheet_name, row, column, value)
            .await
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

fn letter(column: u32) -> Result<String, StoreError> {
    column_letter(column).ok_or_else(|| StoreError::InvalidReference(format!("column {column}")))
}

/// Sheet names go in single quotes; embedded quotes are doubled.
fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
