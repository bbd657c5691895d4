// Worker clippy configuration
#![allow(dead_code)]

//! Chartsight Background Worker
//!
//! Handles scheduled jobs including:
//! - Report dispatch for due schedule tasks (every minute)
//! - Subscription renewal processing (daily at 2:15 UTC)
//! - Monthly token grant (1st of the month at 3:00 UTC)
//! - Health check heartbeat (every 5 minutes)

mod reports;

use std::sync::Arc;
use std::time::Duration;

use chartsight_api::email::Mailer;
use chartsight_billing::{RenewalService, TokenService};
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::reports::{AnalysisClient, ChartClient, ReportDispatcher};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Chartsight Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Outbound HTTP client with a fixed timeout
    let timeout_secs: u64 = env_or("HTTP_TIMEOUT_SECS", "30").parse().unwrap_or(30);
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default();

    // Report pipeline collaborators
    let charts = ChartClient::new(
        http_client.clone(),
        env_or("CHART_API_URL", "http://localhost:9100"),
    );
    let analysis = AnalysisClient::new(
        http_client.clone(),
        env_or("ANALYSIS_API_URL", "http://localhost:9200"),
    );
    let mailer = Mailer::new(pool.clone());
    let dispatcher = Arc::new(ReportDispatcher::new(
        pool.clone(),
        charts,
        analysis,
        mailer,
    ));

    // Billing batch services
    let renewal = Arc::new(RenewalService::new(pool.clone()));
    let tokens = Arc::new(TokenService::new(pool.clone()));

    // Optional override for the monthly grant amount
    let grant_amount: Option<i64> = std::env::var("MONTHLY_GRANT_TOKENS")
        .ok()
        .and_then(|v| v.parse().ok());

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Dispatch due report schedules (every minute)
    let report_dispatcher = dispatcher.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let dispatcher = report_dispatcher.clone();
            Box::pin(async move {
                dispatcher.run_tick().await;
            })
        })?)
        .await?;
    info!("Scheduled: Report dispatch (every minute)");

    // Job 2: Process due subscription renewals (daily at 2:15 UTC)
    let renewal_service = renewal.clone();
    scheduler
        .add(Job::new_async("0 15 2 * * *", move |_uuid, _l| {
            let service = renewal_service.clone();
            Box::pin(async move {
                info!("Running subscription renewal job");
                if let Err(e) = service.process_due_renewals().await {
                    error!(error = %e, "Renewal job failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription renewals (daily at 2:15 UTC)");

    // Job 3: Monthly token grant (1st of the month at 3:00 UTC)
    let token_service = tokens.clone();
    scheduler
        .add(Job::new_async("0 0 3 1 * *", move |_uuid, _l| {
            let service = token_service.clone();
            Box::pin(async move {
                info!("Running monthly token grant job");
                // All-or-nothing: any failure rolled the whole batch back
                if let Err(e) = service.run_monthly_grant(grant_amount).await {
                    error!(error = %e, "Monthly token grant failed and was rolled back");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Monthly token grant (1st at 3:00 UTC)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Chartsight Worker started successfully with 4 scheduled jobs");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
