//! Gmail REST adapter using an OAuth2 refresh token.
//!
//! Access tokens are cached and refreshed 60s before expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    AttachmentData, AttachmentMeta, MailboxError, MailboxProvider, MessageDetail, MessageRef,
};
use crate::extraction::TransferEncoding;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn from_response(token: TokenResponse, now: Instant) -> Self {
        Self {
            access_token: token.access_token,
            expires_at: now + Duration::from_secs(token.expires_in),
        }
    }

    /// Usable only while more than `TOKEN_REFRESH_MARGIN` of its lifetime remains.
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + TOKEN_REFRESH_MARGIN
    }
}

pub struct GmailClient {
    client: Client,
    credentials: OAuthCredentials,
    user_id: String,
    token: RwLock<Option<CachedToken>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<GmailMessageRef>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    filename: String,
    mime_type: Option<String>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GmailAttachment {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

impl GmailClient {
    pub fn new(credentials: OAuthCredentials, user_id: String) -> Result<Self, MailboxError> {
        Ok(Self {
            client: Client::builder().timeout(HTTP_TIMEOUT).build()?,
            credentials,
            user_id,
            token: RwLock::new(None),
        })
    }

    /// Returns a valid access token, refreshing if needed.
    async fn access_token(&self) -> Result<String, MailboxError> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref().filter(|t| t.is_fresh(Instant::now())) {
                return Ok(cached.access_token.clone());
            }
        }

        let refreshed = self.refresh_token().await?;
        let access_token = refreshed.access_token.clone();
        *self.token.write().await = Some(refreshed);
        Ok(access_token)
    }

    async fn refresh_token(&self) -> Result<CachedToken, MailboxError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(token_refresh_error(status.as_u16(), &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::Auth(format!("invalid token response: {e}")))?;
        info!("Refreshed Gmail access token (expires in {}s)", token.expires_in);

        Ok(CachedToken::from_response(token, Instant::now()))
    }

    fn user_url(&self, path: &str) -> String {
        format!("{GMAIL_API_BASE}/{}/{path}", self.user_id)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GoogleError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(MailboxError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MailboxError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl MailboxProvider for GmailClient {
    async fn list_attachment_messages(
        &self,
        filter: &str,
        limit: u32,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let list: ListMessagesResponse = self
            .get_json(
                &self.user_url("messages"),
                &[("q", filter.to_string()), ("maxResults", limit.to_string())],
            )
            .await?;
        debug!("Gmail list '{filter}' returned {} messages", list.messages.len());

        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageRef { id: m.id })
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail, MailboxError> {
        let message: GmailMessage = self
            .get_json(&self.user_url(&format!("messages/{id}")), &[])
            .await?;
        Ok(into_detail(message))
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentData, MailboxError> {
        let attachment: GmailAttachment = self
            .get_json(
                &self.user_url(&format!("messages/{message_id}/attachments/{attachment_id}")),
                &[],
            )
            .await?;
        into_attachment_data(attachment, message_id, attachment_id)
    }
}

/// Google's token endpoint answers `{"error": "invalid_grant", ...}` for a
/// revoked or expired refresh token.
fn token_refresh_error(status: u16, body: &str) -> MailboxError {
    #[derive(Deserialize)]
    struct OAuthError {
        error: String,
        error_description: Option<String>,
    }

    let detail = match serde_json::from_str::<OAuthError>(body) {
        Ok(e) => match e.error_description {
            Some(description) => format!("{}: {description}", e.error),
            None => e.error,
        },
        Err(_) => body.trim().to_string(),
    };
    MailboxError::Auth(format!("token refresh returned {status}: {detail}"))
}

fn into_attachment_data(
    attachment: GmailAttachment,
    message_id: &str,
    attachment_id: &str,
) -> Result<AttachmentData, MailboxError> {
    if attachment.data.trim().is_empty() {
        return Err(MailboxError::Malformed(format!(
            "attachment {attachment_id} of message {message_id} has no data"
        )));
    }
    Ok(AttachmentData {
        bytes: Bytes::from(attachment.data),
        encoding: TransferEncoding::Base64Url,
    })
}

fn into_detail(message: GmailMessage) -> MessageDetail {
    let mut attachments = Vec::new();
    if let Some(payload) = &message.payload {
        collect_attachments(payload, &mut attachments);
    }
    MessageDetail {
        received_at: message.internal_date.as_deref().and_then(parse_internal_date),
        id: message.id,
        attachments,
    }
}

/// Depth-first walk over MIME parts, keeping named parts that carry an attachment id.
fn collect_attachments(part: &MessagePart, out: &mut Vec<AttachmentMeta>) {
    if !part.filename.is_empty() {
        if let Some(body) = &part.body {
            if let Some(attachment_id) = &body.attachment_id {
                out.push(AttachmentMeta {
                    attachment_id: attachment_id.clone(),
                    filename: part.filename.clone(),
                    mime_type: part.mime_type.clone(),
                    size: body.size,
                });
            }
        }
    }
    for child in &part.parts {
        collect_attachments(child, out);
    }
}

/// Gmail's `internalDate` is epoch milliseconds as a string.
fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
