//! Outbound mail
//!
//! The SMTP transport is rebuilt on every send from whichever `smtp_configs`
//! row is marked default, so operators can repoint mail delivery without a
//! restart.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SmtpConfigRow {
    pub id: Uuid,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    pub encryption: String,
    pub from_address: String,
    pub from_name: String,
}

/// Mailer backed by the default SMTP config row
#[derive(Clone)]
pub struct Mailer {
    pool: PgPool,
}

impl Mailer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn default_config(&self) -> anyhow::Result<SmtpConfigRow> {
        let config: Option<SmtpConfigRow> = sqlx::query_as(
            r#"
            SELECT id, host, port, username, password, encryption, from_address, from_name
            FROM smtp_configs
            WHERE is_default
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        config.ok_or_else(|| anyhow::anyhow!("no default SMTP configuration"))
    }

    fn build_transport(
        config: &SmtpConfigRow,
    ) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = match config.encryption.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
        };

        Ok(builder
            .port(config.port as u16)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build())
    }

    /// Send an HTML email through the current default SMTP configuration
    pub async fn send(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()> {
        let config = self.default_config().await?;
        let transport = Self::build_transport(&config)?;

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address).parse()?;
        let to: Mailbox = to.parse()?;

        let message = Message::builder()
            .from(from)
            .to(to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)?;

        transport.send(message).await?;

        tracing::info!(
            to = %to,
            subject = subject,
            smtp_host = %config.host,
            "Email sent"
        );

        Ok(())
    }
}
