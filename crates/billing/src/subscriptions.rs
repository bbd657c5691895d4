//! Subscription lifecycle
//!
//! Plan changes compare prices and split into two paths:
//!
//! - upgrades apply immediately (plan swap, token reset, prorated invoice)
//! - downgrades are deferred: only `pending_downgrade_plan_id` is written to
//!   the subscription metadata, and the renewal job applies it at the next
//!   billing date
//!
//! The database is the source of truth for plan assignment; Stripe is for
//! payment processing only.

use std::collections::HashMap;

use chartsight_shared::{BillingInterval, SubscriptionStatus};
use serde::Serialize;
use sqlx::PgPool;
use stripe::{
    CancelSubscription, CreateCustomer, CreateSubscription, CreateSubscriptionItems, Customer,
    CustomerId, Subscription as StripeSubscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus,
};
use time::{Month, OffsetDateTime};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::invoices::InvoiceService;
use crate::plans::Plan;

/// Metadata key holding a deferred plan change
pub const PENDING_DOWNGRADE_KEY: &str = "pending_downgrade_plan_id";

/// A subscription row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub stripe_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub next_billing_date: OffsetDateTime,
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Deferred plan change stashed in metadata, if any
    pub fn pending_downgrade_plan_id(&self) -> Option<Uuid> {
        self.metadata
            .get(PENDING_DOWNGRADE_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Outcome of a plan change request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PlanChangeOutcome {
    Upgrade {
        plan_id: Uuid,
        /// Credit for unused time on the old plan, in cents
        prorated_amount_cents: i64,
        invoice_url: Option<String>,
    },
    Downgrade {
        pending_plan_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        effective_date: OffsetDateTime,
    },
}

/// Result of creating a subscription at checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    pub subscription_id: Uuid,
    pub stripe_subscription_id: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub next_billing_date: OffsetDateTime,
}

/// Result of a cancellation
#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    pub subscription_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub canceled_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
}

/// Credit for unused time on the current plan, floored to whole cents.
///
/// `old_price × remaining_days / total_days`; a period already over (or of
/// zero length) yields no credit.
pub fn prorated_credit_cents(
    old_price_cents: i64,
    period_start: OffsetDateTime,
    period_end: OffsetDateTime,
    now: OffsetDateTime,
) -> i64 {
    if now >= period_end {
        return 0;
    }

    let total_days = (period_end - period_start).whole_days() as f64;
    if total_days <= 0.0 {
        return 0;
    }

    let remaining_days = (period_end - now).whole_days().max(0) as f64;
    let prorated = (old_price_cents as f64) * (remaining_days / total_days);

    prorated.floor() as i64
}

fn add_months(date: OffsetDateTime, months: i32) -> OffsetDateTime {
    let month0 = date.month() as i32 - 1 + months;
    let year = date.year() + month0.div_euclid(12);
    let month = Month::try_from((month0.rem_euclid(12) + 1) as u8).unwrap_or(date.month());
    let day = date.day().min(time::util::days_in_year_month(year, month));

    date.replace_day(1)
        .and_then(|d| d.replace_year(year))
        .and_then(|d| d.replace_month(month))
        .and_then(|d| d.replace_day(day))
        .unwrap_or(date)
}

/// Advance a billing date by one plan interval, clamping short months.
pub fn advance_billing_date(from: OffsetDateTime, interval: BillingInterval) -> OffsetDateTime {
    match interval {
        BillingInterval::Monthly => add_months(from, 1),
        BillingInterval::Yearly => add_months(from, 12),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    email: String,
    stripe_customer_id: Option<String>,
}

/// Subscription service
pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
    invoices: InvoiceService,
    event_logger: BillingEventLogger,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let invoices = InvoiceService::new(stripe.clone());
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            stripe,
            pool,
            invoices,
            event_logger,
        }
    }

    /// The user's current (non-terminal) subscription, if any
    pub async fn current_subscription(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        let sub: Option<Subscription> = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1 AND status IN ('active', 'past_due', 'incomplete')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    /// Create a subscription at checkout
    ///
    /// Creates the Stripe customer on first use, creates the gateway
    /// subscription against the plan's price, and inserts the local row. The
    /// row starts `incomplete` until the gateway reports the first payment.
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> BillingResult<CheckoutResult> {
        if self.current_subscription(user_id).await?.is_some() {
            return Err(BillingError::Validation(
                "user already has a current subscription".to_string(),
            ));
        }

        let plan: Option<Plan> = sqlx::query_as("SELECT * FROM plans WHERE id = $1 AND active")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;
        let plan = plan.ok_or_else(|| BillingError::NotFound(format!("plan {}", plan_id)))?;

        let customer_id = self.ensure_stripe_customer(user_id).await?;
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan_id".to_string(), plan.id.to_string());

        let mut params = CreateSubscription::new(customer_id);
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(plan.stripe_price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(metadata);

        let stripe_sub = StripeSubscription::create(self.stripe.inner(), params).await?;

        let status = match stripe_sub.status {
            StripeSubStatus::Active => SubscriptionStatus::Active,
            StripeSubStatus::PastDue => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Incomplete,
        };

        let now = OffsetDateTime::now_utc();
        let next_billing_date = advance_billing_date(now, plan.interval());

        let subscription_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (user_id, plan_id, status, stripe_subscription_id,
                 current_period_start, next_billing_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(plan.id)
        .bind(status.as_str())
        .bind(stripe_sub.id.as_str())
        .bind(now)
        .bind(next_billing_date)
        .fetch_one(&self.pool)
        .await?;

        // Grant the first cycle of subscription tokens on an active start
        if status == SubscriptionStatus::Active {
            sqlx::query(
                "UPDATE users SET subscription_token = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(plan.tokens_per_cycle)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(
            user_id = %user_id,
            plan_id = %plan.id,
            subscription_id = %subscription_id.0,
            stripe_subscription_id = %stripe_sub.id,
            status = status.as_str(),
            "Created subscription"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::SubscriptionCreated)
                    .user(user_id)
                    .data(serde_json::json!({
                        "plan_id": plan.id,
                        "status": status.as_str(),
                    }))
                    .actor(user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription creation event");
        }

        Ok(CheckoutResult {
            subscription_id: subscription_id.0,
            stripe_subscription_id: stripe_sub.id.to_string(),
            status: status.as_str().to_string(),
            next_billing_date,
        })
    }

    /// Change the user's plan
    ///
    /// Price up: immediate upgrade with prorated invoice. Price down: deferred
    /// downgrade. Same plan or same price: rejected.
    pub async fn change_plan(
        &self,
        user_id: Uuid,
        target_plan_id: Uuid,
    ) -> BillingResult<PlanChangeOutcome> {
        self.change_plan_at(user_id, target_plan_id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn change_plan_at(
        &self,
        user_id: Uuid,
        target_plan_id: Uuid,
        now: OffsetDateTime,
    ) -> BillingResult<PlanChangeOutcome> {
        let sub = self
            .current_subscription(user_id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(user_id.to_string()))?;

        if sub.plan_id == target_plan_id {
            return Err(BillingError::SamePlan);
        }

        let current_plan: Option<Plan> = sqlx::query_as("SELECT * FROM plans WHERE id = $1")
            .bind(sub.plan_id)
            .fetch_optional(&self.pool)
            .await?;
        let current_plan =
            current_plan.ok_or_else(|| BillingError::NotFound(format!("plan {}", sub.plan_id)))?;

        let target_plan: Option<Plan> =
            sqlx::query_as("SELECT * FROM plans WHERE id = $1 AND active")
                .bind(target_plan_id)
                .fetch_optional(&self.pool)
                .await?;
        let target_plan = target_plan
            .ok_or_else(|| BillingError::NotFound(format!("plan {}", target_plan_id)))?;

        if target_plan.price_cents == current_plan.price_cents {
            return Err(BillingError::SamePlan);
        }

        if target_plan.price_cents < current_plan.price_cents {
            return self.schedule_downgrade(&sub, &target_plan).await;
        }

        self.apply_upgrade(&sub, &current_plan, &target_plan, now)
            .await
    }

    async fn schedule_downgrade(
        &self,
        sub: &Subscription,
        target_plan: &Plan,
    ) -> BillingResult<PlanChangeOutcome> {
        // An existing pending downgrade is replaced, not stacked
        if let Some(existing) = sub.pending_downgrade_plan_id() {
            if existing != target_plan.id {
                tracing::warn!(
                    subscription_id = %sub.id,
                    existing_pending_plan_id = %existing,
                    new_pending_plan_id = %target_plan.id,
                    "Overwriting existing pending downgrade"
                );
            }
        }

        sqlx::query(
            r#"
            UPDATE subscriptions SET
                metadata = jsonb_set(
                    COALESCE(metadata, '{}'::jsonb),
                    '{pending_downgrade_plan_id}',
                    to_jsonb($1::text)
                ),
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(target_plan.id.to_string())
        .bind(sub.id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %sub.user_id,
            subscription_id = %sub.id,
            pending_plan_id = %target_plan.id,
            effective_date = %sub.next_billing_date,
            "Scheduled downgrade for next billing date"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::DowngradeScheduled)
                    .user(sub.user_id)
                    .data(serde_json::json!({
                        "from_plan_id": sub.plan_id,
                        "to_plan_id": target_plan.id,
                        "effective_date": sub.next_billing_date.to_string(),
                    }))
                    .actor(sub.user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log downgrade event");
        }

        Ok(PlanChangeOutcome::Downgrade {
            pending_plan_id: target_plan.id,
            effective_date: sub.next_billing_date,
        })
    }

    async fn apply_upgrade(
        &self,
        sub: &Subscription,
        current_plan: &Plan,
        target_plan: &Plan,
        now: OffsetDateTime,
    ) -> BillingResult<PlanChangeOutcome> {
        let credit_cents = prorated_credit_cents(
            current_plan.price_cents,
            sub.current_period_start,
            sub.next_billing_date,
            now,
        );
        let amount_due_cents = (target_plan.price_cents - credit_cents).max(0);

        // Charge first; the local plan swap only happens after the gateway
        // accepted the invoice.
        let customer_id = self.ensure_stripe_customer(sub.user_id).await?;
        let description = format!(
            "Upgrade from {} to {} ({} remaining-time credit applied)",
            current_plan.name,
            target_plan.name,
            format_cents(credit_cents)
        );
        let invoice = self
            .invoices
            .charge_amount(&customer_id, amount_due_cents, &description)
            .await?;

        let mut tx = self.pool.begin().await?;

        // Optimistic guard: a concurrent change invalidates this upgrade
        let rows = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan_id = $1,
                metadata = metadata - 'pending_downgrade_plan_id',
                updated_at = NOW()
            WHERE id = $2 AND plan_id = $3
            "#,
        )
        .bind(target_plan.id)
        .bind(sub.id)
        .bind(sub.plan_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(BillingError::ConcurrentModification(
                "Subscription was modified by another process. Please retry.".to_string(),
            ));
        }

        sqlx::query("UPDATE users SET subscription_token = $1, updated_at = NOW() WHERE id = $2")
            .bind(target_plan.tokens_per_cycle)
            .bind(sub.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %sub.user_id,
            subscription_id = %sub.id,
            from_plan_id = %sub.plan_id,
            to_plan_id = %target_plan.id,
            prorated_credit_cents = credit_cents,
            amount_due_cents = amount_due_cents,
            invoice_id = %invoice.invoice_id,
            "Applied upgrade"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::PlanChanged)
                    .user(sub.user_id)
                    .data(serde_json::json!({
                        "from_plan_id": sub.plan_id,
                        "to_plan_id": target_plan.id,
                        "prorated_credit_cents": credit_cents,
                        "amount_due_cents": amount_due_cents,
                        "invoice_id": invoice.invoice_id,
                    }))
                    .actor(sub.user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log plan change event");
        }

        Ok(PlanChangeOutcome::Upgrade {
            plan_id: target_plan.id,
            prorated_amount_cents: credit_cents,
            invoice_url: invoice.hosted_invoice_url,
        })
    }

    /// Cancel the user's subscription at the end of the paid period
    pub async fn cancel(&self, user_id: Uuid) -> BillingResult<CancelResult> {
        let sub = self
            .current_subscription(user_id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(user_id.to_string()))?;

        if let Some(stripe_id) = sub.stripe_subscription_id.as_deref() {
            let sub_id = stripe_id
                .parse::<SubscriptionId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;

            let params = CancelSubscription {
                cancellation_details: None,
                invoice_now: None,
                prorate: None,
            };
            StripeSubscription::cancel(self.stripe.inner(), &sub_id, params).await?;
        }

        let now = OffsetDateTime::now_utc();
        let ends_at = sub.next_billing_date;

        sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = 'canceled',
                canceled_at = $1,
                ends_at = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(ends_at)
        .bind(sub.id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %sub.id,
            ends_at = %ends_at,
            "Cancelled subscription"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::SubscriptionCanceled)
                    .user(user_id)
                    .data(serde_json::json!({
                        "subscription_id": sub.id,
                        "ends_at": ends_at.to_string(),
                    }))
                    .actor(user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log cancellation event");
        }

        Ok(CancelResult {
            subscription_id: sub.id,
            canceled_at: now,
            ends_at,
        })
    }

    /// Fetch or create the user's Stripe customer, persisting the id
    async fn ensure_stripe_customer(&self, user_id: Uuid) -> BillingResult<String> {
        let row: Option<CustomerRow> =
            sqlx::query_as("SELECT email, stripe_customer_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let row = row.ok_or_else(|| BillingError::NotFound(format!("user {}", user_id)))?;

        if let Some(customer_id) = row.stripe_customer_id {
            return Ok(customer_id);
        }

        let mut params = CreateCustomer::new();
        params.email = Some(&row.email);

        let customer = Customer::create(self.stripe.inner(), params).await?;

        sqlx::query("UPDATE users SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(customer.id.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(user_id = %user_id, customer_id = %customer.id, "Created Stripe customer");

        Ok(customer.id.to_string())
    }
}

fn format_cents(cents: i64) -> String {
    format!("${:.2}", cents as f64 / 100.0)
}
