//! Telegram bot integration
//!
//! Webhook registration, inbound `/start` handling, and the short-lived
//! verification codes that link a Telegram chat to a user account.

use rand::Rng;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Verification codes expire after 15 minutes
pub const CODE_TTL_MINUTES: i64 = 15;

/// Inbound update from the Bot API
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct CodeRow {
    id: Uuid,
    chat_id: i64,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramService {
    http: reqwest::Client,
    pool: PgPool,
    bot_token: String,
    api_base: String,
}

impl TelegramService {
    pub fn new(pool: PgPool, bot_token: String, http: reqwest::Client) -> Self {
        Self {
            http,
            pool,
            bot_token,
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (tests only)
    #[cfg(test)]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }

    async fn call_method(&self, method: &str, form: &[(&str, String)]) -> ApiResult<()> {
        if !self.is_configured() {
            return Err(ApiError::Upstream(
                "Telegram bot token not configured".to_string(),
            ));
        }

        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let response = self.http.post(&url).form(form).send().await?;

        let status = response.status();
        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Telegram response parse failed: {}", e)))?;

        if !status.is_success() || !body.ok {
            let description = body.description.unwrap_or_else(|| status.to_string());
            tracing::error!(method = method, error = %description, "Telegram API call failed");
            return Err(ApiError::Upstream(format!(
                "Telegram {} failed: {}",
                method, description
            )));
        }

        Ok(())
    }

    /// Register the bot webhook
    pub async fn set_webhook(&self, url: &str) -> ApiResult<()> {
        self.call_method("setWebhook", &[("url", url.to_string())])
            .await?;
        tracing::info!(url = url, "Telegram webhook registered");
        Ok(())
    }

    /// Remove the bot webhook
    pub async fn remove_webhook(&self) -> ApiResult<()> {
        self.call_method("deleteWebhook", &[]).await?;
        tracing::info!("Telegram webhook removed");
        Ok(())
    }

    /// Send a plain-text message to a chat
    pub async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<()> {
        self.call_method(
            "sendMessage",
            &[
                ("chat_id", chat_id.to_string()),
                ("text", text.to_string()),
            ],
        )
        .await
    }

    /// Handle an inbound update
    ///
    /// `/start` issues a 6-digit verification code, delivered back to the
    /// chat. Everything else is ignored.
    pub async fn handle_update(&self, update: TelegramUpdate) -> ApiResult<()> {
        let Some(message) = update.message else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        if !text.trim().starts_with("/start") {
            return Ok(());
        }

        let chat_id = message.chat.id;
        let code = self.issue_code(chat_id).await?;

        self.send_message(
            chat_id,
            &format!(
                "Your Chartsight verification code is {}. It expires in {} minutes.",
                code, CODE_TTL_MINUTES
            ),
        )
        .await?;

        tracing::info!(chat_id = chat_id, update_id = update.update_id, "Issued verification code");
        Ok(())
    }

    /// Create a 6-digit code for a chat, valid for [`CODE_TTL_MINUTES`]
    pub async fn issue_code(&self, chat_id: i64) -> ApiResult<String> {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));

        sqlx::query(
            r#"
            INSERT INTO telegram_codes (chat_id, code, expires_at)
            VALUES ($1, $2, NOW() + make_interval(mins => $3))
            "#,
        )
        .bind(chat_id)
        .bind(&code)
        .bind(CODE_TTL_MINUTES as i32)
        .execute(&self.pool)
        .await?;

        Ok(code)
    }

    /// Consume a verification code and link the chat to the user
    pub async fn verify_code(&self, user_id: Uuid, code: &str) -> ApiResult<i64> {
        let row: Option<CodeRow> = sqlx::query_as(
            r#"
            SELECT id, chat_id FROM telegram_codes
            WHERE code = $1 AND used = FALSE AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| {
            ApiError::Validation("invalid or expired verification code".to_string())
        })?;

        sqlx::query("UPDATE telegram_codes SET used = TRUE WHERE id = $1")
            .bind(row.id)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE users SET telegram_chat_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(row.chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(user_id = %user_id, chat_id = row.chat_id, "Linked Telegram account");
        Ok(row.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_with_text(text: &str) -> TelegramUpdate {
        TelegramUpdate {
            update_id: 1,
            message: Some(TelegramMessage {
                chat: TelegramChat { id: 42 },
                text: Some(text.to_string()),
            }),
        }
    }

    #[test]
    fn update_json_parses() {
        let update: TelegramUpdate = serde_json::from_str(
            r#"{"update_id": 7, "message": {"chat": {"id": 42}, "text": "/start"}}"#,
        )
        .unwrap();
        assert_eq!(update.update_id, 7);
        assert_eq!(update.message.unwrap().chat.id, 42);
    }

    #[test]
    fn update_without_message_parses() {
        let update: TelegramUpdate = serde_json::from_str(r#"{"update_id": 7}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn start_command_is_recognized() {
        let update = update_with_text("/start");
        let text = update.message.unwrap().text.unwrap();
        assert!(text.trim().starts_with("/start"));
    }

    fn lazy_pool() -> PgPool {
        // Never actually connects; the mockito tests only exercise HTTP
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/chartsight_test")
            .unwrap()
    }

    #[tokio::test]
    async fn set_webhook_posts_to_bot_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/setWebhook")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let service =
            TelegramService::new(lazy_pool(), "test-token".to_string(), reqwest::Client::new())
                .with_api_base(&server.url());

        service
            .set_webhook("https://example.com/api/v1/telegram/webhook")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bot_api_error_surfaces_description() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bottest-token/deleteWebhook")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": false, "description": "Unauthorized"}"#)
            .create_async()
            .await;

        let service =
            TelegramService::new(lazy_pool(), "test-token".to_string(), reqwest::Client::new())
                .with_api_base(&server.url());

        let err = service.remove_webhook().await.unwrap_err();
        assert!(err.to_string().contains("deleteWebhook"));
    }

    #[tokio::test]
    async fn unconfigured_bot_token_is_rejected() {
        let service =
            TelegramService::new(lazy_pool(), String::new(), reqwest::Client::new());
        assert!(service.remove_webhook().await.is_err());
    }
}
