//! Application state

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::calendar::CalendarClient;
use crate::config::Config;
use crate::email::Mailer;
use crate::error::{ApiError, ApiResult};
use crate::telegram::TelegramService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    /// Billing service (None when Stripe is not configured)
    pub billing: Option<Arc<chartsight_billing::BillingService>>,
    pub http_client: Client,
    pub mailer: Mailer,
    pub telegram: TelegramService,
    pub calendar: CalendarClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        // Try to initialize billing if Stripe env vars are set
        let billing = match chartsight_billing::BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        // Shared HTTP client with a fixed timeout for all outbound calls
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_default();

        let mailer = Mailer::new(pool.clone());

        let telegram = TelegramService::new(
            pool.clone(),
            config.telegram_bot_token.clone(),
            http_client.clone(),
        );
        if telegram.is_configured() {
            tracing::info!("Telegram bot integration enabled");
        } else {
            tracing::warn!("Telegram bot integration not configured (missing TELEGRAM_BOT_TOKEN)");
        }

        let calendar = CalendarClient::new(http_client.clone(), config.calendar_feed_url.clone());

        Self {
            pool,
            config,
            jwt_manager,
            billing,
            http_client,
            mailer,
            telegram,
            calendar,
        }
    }

    /// Get the billing service, failing requests that need it when Stripe is
    /// not configured
    pub fn billing(&self) -> ApiResult<&Arc<chartsight_billing::BillingService>> {
        self.billing
            .as_ref()
            .ok_or_else(|| ApiError::Upstream("Billing not configured".to_string()))
    }
}
