//! Telegram Bot API transport for signal delivery.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::NotifierTransport;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> Self {
        Self::with_api_base("https://api.telegram.org", bot_token)
    }

    /// Point the transport at a different API host (tests).
    pub fn with_api_base(api_base: &str, bot_token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }
}

#[async_trait]
impl NotifierTransport for TelegramTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response: SendMessageResponse = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("sendMessage HTTP failed")?
            .json()
            .await
            .context("sendMessage JSON parse failed")?;

        if !response.ok {
            return Err(AppError::TelegramApi {
                code: response.error_code.unwrap_or(0),
                description: response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_request_serializes_expected_fields() {
        let req = SendMessageRequest {
            chat_id: "12345",
            text: "hello",
            parse_mode: "Markdown",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["chat_id"], "12345");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["parse_mode"], "Markdown");
    }

    #[test]
    fn error_response_deserializes_description() {
        let resp: SendMessageResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        )
        .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(401));
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
    }
}
