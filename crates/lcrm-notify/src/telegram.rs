//! Minimal Telegram Bot API client: long-polled updates and Markdown messages.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";
pub const LONG_POLL_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
}

// reqwest errors carry the request url, which embeds the bot token
impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        TelegramError::Request(err.without_url())
    }
}

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, TelegramError> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(TelegramError::Api(self.description.unwrap_or_default()))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Anything that can deliver a text message to a chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError>;
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Updates after `offset`, waiting up to [`LONG_POLL_SECS`] for new ones.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>, TelegramError> {
        let body: TelegramApiResponse<Vec<TelegramUpdate>> = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;
        Ok(body.into_result()?.unwrap_or_default())
    }

    pub async fn get_me(&self) -> Result<TelegramUser, TelegramError> {
        let body: TelegramApiResponse<TelegramUser> = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await?
            .json()
            .await?;
        body.into_result()?
            .ok_or_else(|| TelegramError::Api("getMe returned no user".into()))
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let body: TelegramApiResponse<serde_json::Value> = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;
        body.into_result()?;
        Ok(())
    }
}

/// Escapes the characters legacy Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
