//! Billing event audit log
//!
//! Append-only record of every billing mutation. Logging failures never fail
//! the operation that produced the event; callers log a warning and move on.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventType {
    SubscriptionCreated,
    SubscriptionCanceled,
    SubscriptionRenewed,
    PlanChanged,
    DowngradeScheduled,
    PlanEdited,
    TokensGranted,
    TokensPurchased,
    RewardGranted,
    RewardStatusChanged,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::SubscriptionCreated => "subscription_created",
            BillingEventType::SubscriptionCanceled => "subscription_canceled",
            BillingEventType::SubscriptionRenewed => "subscription_renewed",
            BillingEventType::PlanChanged => "plan_changed",
            BillingEventType::DowngradeScheduled => "downgrade_scheduled",
            BillingEventType::PlanEdited => "plan_edited",
            BillingEventType::TokensGranted => "tokens_granted",
            BillingEventType::TokensPurchased => "tokens_purchased",
            BillingEventType::RewardGranted => "reward_granted",
            BillingEventType::RewardStatusChanged => "reward_status_changed",
        }
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    User,
    Admin,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Admin => "admin",
            ActorType::System => "system",
        }
    }
}

/// Builder for a billing event row
#[derive(Debug, Clone)]
pub struct BillingEventBuilder {
    user_id: Option<Uuid>,
    event_type: BillingEventType,
    data: serde_json::Value,
    actor_id: Option<Uuid>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    pub fn new(event_type: BillingEventType) -> Self {
        Self {
            user_id: None,
            event_type,
            data: serde_json::Value::Null,
            actor_id: None,
            actor_type: ActorType::System,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_type = actor_type;
        self
    }
}

/// Writes billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_event(&self, event: BillingEventBuilder) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (user_id, event_type, data, actor_id, actor_type)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(&event.data)
        .bind(event.actor_id)
        .bind(event.actor_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
