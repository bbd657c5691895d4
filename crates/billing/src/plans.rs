//! Plan catalog
//!
//! Plans are admin-managed rows. A plan referenced by a live subscription is
//! only ever touched through the admin update path, which leaves an audit
//! event behind.

use chartsight_shared::BillingInterval;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// A subscription plan
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub billing_interval: String,
    pub tokens_per_cycle: i64,
    pub stripe_price_id: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Plan {
    pub fn interval(&self) -> BillingInterval {
        BillingInterval::parse(&self.billing_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub price_cents: i64,
    pub billing_interval: String,
    pub tokens_per_cycle: i64,
    pub stripe_price_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub billing_interval: Option<String>,
    pub tokens_per_cycle: Option<i64>,
    pub stripe_price_id: Option<String>,
    pub active: Option<bool>,
}

fn validate_interval(interval: &str) -> BillingResult<()> {
    match interval {
        "monthly" | "yearly" => Ok(()),
        other => Err(BillingError::Validation(format!(
            "invalid billing interval '{}' (expected monthly or yearly)",
            other
        ))),
    }
}

/// Plan catalog service
pub struct PlanService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl PlanService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    pub async fn list_active(&self) -> BillingResult<Vec<Plan>> {
        let plans: Vec<Plan> = sqlx::query_as(
            "SELECT * FROM plans WHERE active ORDER BY price_cents ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn get(&self, plan_id: Uuid) -> BillingResult<Plan> {
        let plan: Option<Plan> = sqlx::query_as("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;
        plan.ok_or_else(|| BillingError::NotFound(format!("plan {}", plan_id)))
    }

    pub async fn create(&self, new_plan: NewPlan, admin_id: Uuid) -> BillingResult<Plan> {
        validate_interval(&new_plan.billing_interval)?;
        if new_plan.price_cents < 0 || new_plan.tokens_per_cycle < 0 {
            return Err(BillingError::Validation(
                "price and token grant must be non-negative".to_string(),
            ));
        }

        let plan: Plan = sqlx::query_as(
            r#"
            INSERT INTO plans (name, price_cents, billing_interval, tokens_per_cycle, stripe_price_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new_plan.name)
        .bind(new_plan.price_cents)
        .bind(&new_plan.billing_interval)
        .bind(new_plan.tokens_per_cycle)
        .bind(&new_plan.stripe_price_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(plan_id = %plan.id, name = %plan.name, "Created plan");

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::PlanEdited)
                    .data(serde_json::json!({"action": "create", "plan_id": plan.id}))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log plan creation event");
        }

        Ok(plan)
    }

    pub async fn update(
        &self,
        plan_id: Uuid,
        update: PlanUpdate,
        admin_id: Uuid,
    ) -> BillingResult<Plan> {
        if let Some(interval) = update.billing_interval.as_deref() {
            validate_interval(interval)?;
        }

        let current = self.get(plan_id).await?;

        let plan: Plan = sqlx::query_as(
            r#"
            UPDATE plans SET
                name = $1,
                price_cents = $2,
                billing_interval = $3,
                tokens_per_cycle = $4,
                stripe_price_id = $5,
                active = $6,
                updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(update.name.unwrap_or(current.name))
        .bind(update.price_cents.unwrap_or(current.price_cents))
        .bind(update.billing_interval.unwrap_or(current.billing_interval))
        .bind(update.tokens_per_cycle.unwrap_or(current.tokens_per_cycle))
        .bind(update.stripe_price_id.unwrap_or(current.stripe_price_id))
        .bind(update.active.unwrap_or(current.active))
        .bind(plan_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(plan_id = %plan.id, "Updated plan");

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::PlanEdited)
                    .data(serde_json::json!({"action": "update", "plan_id": plan.id}))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log plan update event");
        }

        Ok(plan)
    }

    /// Plans referenced by subscriptions are retired, not deleted.
    pub async fn retire(&self, plan_id: Uuid, admin_id: Uuid) -> BillingResult<()> {
        let rows = sqlx::query("UPDATE plans SET active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(plan_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(BillingError::NotFound(format!("plan {}", plan_id)));
        }

        tracing::info!(plan_id = %plan_id, "Retired plan");

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::PlanEdited)
                    .data(serde_json::json!({"action": "retire", "plan_id": plan_id}))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log plan retire event");
        }

        Ok(())
    }
}
