//! Telegram routes: inbound bot updates, code verification, webhook admin

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;
use crate::telegram::TelegramUpdate;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub telegram_chat_id: i64,
}

/// Inbound updates from the Bot API
///
/// Failures are logged and acknowledged with 200 anyway; Telegram retries
/// forever on error responses and the updates are not worth replaying.
pub async fn inbound_webhook(
    State(state): State<AppState>,
    Json(update): Json<TelegramUpdate>,
) -> ApiResult<Json<Envelope<()>>> {
    if let Err(e) = state.telegram.handle_update(update).await {
        tracing::error!(error = %e, "Failed to handle Telegram update");
    }
    Ok(ok(()))
}

/// Consume a 6-digit code and link the Telegram chat to the caller
pub async fn verify_code(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<Envelope<VerifyResponse>>> {
    let code = req.code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(
            "verification code must be 6 digits".to_string(),
        ));
    }

    let telegram_chat_id = state.telegram.verify_code(auth_user.user_id, code).await?;
    Ok(ok_with(
        "telegram account linked",
        VerifyResponse { telegram_chat_id },
    ))
}

/// Register the bot webhook with Telegram
pub async fn register_webhook(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<()>>> {
    let url = &state.config.telegram_webhook_url;
    if url.is_empty() {
        return Err(ApiError::Validation(
            "TELEGRAM_WEBHOOK_URL not configured".to_string(),
        ));
    }

    state.telegram.set_webhook(url).await?;
    Ok(ok_with("webhook registered", ()))
}

/// Remove the bot webhook
pub async fn remove_webhook(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<()>>> {
    state.telegram.remove_webhook().await?;
    Ok(ok_with("webhook removed", ()))
}
