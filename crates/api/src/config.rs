//! Environment-driven configuration

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub telegram_bot_token: String,
    pub telegram_webhook_url: String,
    pub chart_api_url: String,
    pub analysis_api_url: String,
    pub calendar_feed_url: String,
    /// Fixed timeout applied to every outbound HTTP call
    pub http_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        Ok(Self {
            database_url,
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8080"),
            jwt_secret,
            jwt_expiry_hours: env_or("JWT_EXPIRY_HOURS", "24").parse().unwrap_or(24),
            telegram_bot_token: env_or("TELEGRAM_BOT_TOKEN", ""),
            telegram_webhook_url: env_or("TELEGRAM_WEBHOOK_URL", ""),
            chart_api_url: env_or("CHART_API_URL", "http://localhost:9100"),
            analysis_api_url: env_or("ANALYSIS_API_URL", "http://localhost:9200"),
            calendar_feed_url: env_or(
                "CALENDAR_FEED_URL",
                "https://nfs.faireconomy.media/ff_calendar_thisweek.json",
            ),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", "30").parse().unwrap_or(30),
        })
    }
}
