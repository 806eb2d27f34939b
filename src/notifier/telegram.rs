//! Telegram Bot API delivery.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::settings::TelegramSettings;
use crate::error::{AppError, Result};
use crate::notifier::Notifier;

pub struct TelegramNotifier {
    http: reqwest::Client,
    base: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        Self::with_base(settings, "https://api.telegram.org".into())
    }

    pub(crate) fn with_base(settings: &TelegramSettings, api_base: String) -> Result<Self> {
        if settings.bot_token.is_empty() || settings.chat_id.is_empty() {
            return Err(AppError::Config(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID are required for notifications".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Notifier(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base: format!("{api_base}/bot{}", settings.bot_token),
            chat_id: settings.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, text: &str) -> Result<bool> {
        let url = format!("{}/sendMessage", self.base);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
            "disable_web_page_preview": true,
        });

        let response = match self.http.post(&url).json(&payload).send().await {
            Ok(r) => r,
            Err(err) => {
                error!(%err, "Telegram send failed");
                return Ok(false);
            }
        };
        if !response.status().is_success() {
            error!(status = %response.status(), "Telegram HTTP error");
            return Ok(false);
        }
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Notifier(format!("Telegram response: {e}")))?;
        if !body.ok {
            error!(
                description = body.description.as_deref().unwrap_or("unknown"),
                "Telegram API error"
            );
        }
        Ok(body.ok)
    }

    async fn close(&self) {
        debug!("Telegram notifier closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TelegramSettings {
        TelegramSettings {
            bot_token: "token123".into(),
            chat_id: "42".into(),
        }
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let bad = TelegramSettings {
            bot_token: String::new(),
            chat_id: "42".into(),
        };
        assert!(matches!(
            TelegramNotifier::new(&bad),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_send_message_reports_ok() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/bottoken123/sendMessage")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": "42",
                "parse_mode": "MarkdownV2",
            })))
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base(&settings(), server.url()).unwrap();
        assert!(notifier.send_message("hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_api_rejection_is_false_not_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/bottoken123/sendMessage")
            .with_body(r#"{"ok":false,"description":"Bad Request"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base(&settings(), server.url()).unwrap();
        assert!(!notifier.send_message("hello").await.unwrap());
    }
}
