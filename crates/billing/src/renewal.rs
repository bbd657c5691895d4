//! Renewal processing
//!
//! Runs daily against every active subscription whose billing date has
//! arrived. Each row renews inside its own transaction so one bad
//! subscription never aborts the batch.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::plans::Plan;
use crate::subscriptions::{advance_billing_date, Subscription};

/// Counts for one renewal cycle
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RenewalSummary {
    pub due: usize,
    pub renewed: usize,
    pub downgrades_applied: usize,
    pub errors: usize,
}

/// Renewal batch service
pub struct RenewalService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl RenewalService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    pub async fn process_due_renewals(&self) -> BillingResult<RenewalSummary> {
        self.process_due_renewals_at(OffsetDateTime::now_utc()).await
    }

    pub async fn process_due_renewals_at(
        &self,
        now: OffsetDateTime,
    ) -> BillingResult<RenewalSummary> {
        let due: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active' AND next_billing_date <= $1
            ORDER BY next_billing_date ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = RenewalSummary {
            due: due.len(),
            ..Default::default()
        };

        for sub in due {
            match self.renew_one(&sub).await {
                Ok(downgrade_applied) => {
                    summary.renewed += 1;
                    if downgrade_applied {
                        summary.downgrades_applied += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        subscription_id = %sub.id,
                        user_id = %sub.user_id,
                        error = %e,
                        "Failed to renew subscription"
                    );
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            due = summary.due,
            renewed = summary.renewed,
            downgrades_applied = summary.downgrades_applied,
            errors = summary.errors,
            "Renewal cycle complete"
        );

        Ok(summary)
    }

    /// Renew a single subscription; returns whether a pending downgrade was
    /// applied.
    async fn renew_one(&self, sub: &Subscription) -> BillingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let mut plan_id = sub.plan_id;
        let mut downgrade_applied = false;

        if let Some(pending_plan_id) = sub.pending_downgrade_plan_id() {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM plans WHERE id = $1")
                .bind(pending_plan_id)
                .fetch_optional(&mut *tx)
                .await?;

            if exists.is_some() {
                sqlx::query(
                    r#"
                    UPDATE subscriptions SET
                        plan_id = $1,
                        metadata = metadata - 'pending_downgrade_plan_id',
                        updated_at = NOW()
                    WHERE id = $2
                    "#,
                )
                .bind(pending_plan_id)
                .bind(sub.id)
                .execute(&mut *tx)
                .await?;

                plan_id = pending_plan_id;
                downgrade_applied = true;
            } else {
                // Dangling reference: drop the key rather than renew onto a
                // plan that no longer exists
                tracing::warn!(
                    subscription_id = %sub.id,
                    pending_plan_id = %pending_plan_id,
                    "Pending downgrade references a missing plan; clearing"
                );
                sqlx::query(
                    r#"
                    UPDATE subscriptions SET
                        metadata = metadata - 'pending_downgrade_plan_id',
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(sub.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let plan: Option<Plan> = sqlx::query_as("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?;
        let plan = plan.ok_or_else(|| BillingError::NotFound(format!("plan {}", plan_id)))?;

        // Cycle grant replaces, never accumulates; free/addons stay untouched
        sqlx::query("UPDATE users SET subscription_token = $1, updated_at = NOW() WHERE id = $2")
            .bind(plan.tokens_per_cycle)
            .bind(sub.user_id)
            .execute(&mut *tx)
            .await?;

        let next = advance_billing_date(sub.next_billing_date, plan.interval());
        sqlx::query(
            r#"
            UPDATE subscriptions SET
                current_period_start = $1,
                next_billing_date = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(sub.next_billing_date)
        .bind(next)
        .bind(sub.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            plan_id = %plan.id,
            next_billing_date = %next,
            downgrade_applied = downgrade_applied,
            "Renewed subscription"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::SubscriptionRenewed)
                    .user(sub.user_id)
                    .data(serde_json::json!({
                        "subscription_id": sub.id,
                        "plan_id": plan.id,
                        "downgrade_applied": downgrade_applied,
                        "next_billing_date": next.to_string(),
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log renewal event");
        }

        Ok(downgrade_applied)
    }
}
