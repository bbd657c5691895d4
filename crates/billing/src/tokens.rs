//! Token-credit accounting
//!
//! Balances live on the user row across four buckets. The monthly grant is a
//! reset, not an accumulation, and runs as one all-or-nothing transaction.
//! Purchases are gated for messaging-channel signups that burned through
//! their starting allotment without subscribing.

use chartsight_shared::{
    SignupChannel, StartingAllotment, TokenBalances, DEFAULT_MONTHLY_GRANT_TOKENS,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Which balance a manual grant credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBucket {
    Free,
    Subscription,
    Addons,
    Registration,
}

impl TokenBucket {
    fn column(&self) -> &'static str {
        match self {
            TokenBucket::Free => "free_token",
            TokenBucket::Subscription => "subscription_token",
            TokenBucket::Addons => "addons_token",
            TokenBucket::Registration => "registration_token",
        }
    }
}

/// Decision of the purchase gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseGate {
    Allowed,
    SubscriptionRequired,
}

/// Gate an additional token purchase.
///
/// Only messaging-channel signups are gated, and only once they have consumed
/// part of their starting allotment without holding an active subscription.
pub fn purchase_gate(
    channel: SignupChannel,
    balances: &TokenBalances,
    starting: &StartingAllotment,
    has_active_subscription: bool,
) -> PurchaseGate {
    if !channel.is_messaging() {
        return PurchaseGate::Allowed;
    }
    if has_active_subscription {
        return PurchaseGate::Allowed;
    }

    let consumed = balances.free_token < starting.free
        || balances.subscription_token < starting.subscription
        || balances.addons_token < starting.addons;

    if consumed {
        PurchaseGate::SubscriptionRequired
    } else {
        PurchaseGate::Allowed
    }
}

/// Counts for one monthly grant run
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct GrantSummary {
    pub grant_amount: i64,
    pub subscribers: u64,
    pub non_subscribers: u64,
}

#[derive(Debug, sqlx::FromRow)]
struct GateRow {
    signup_channel: String,
    free_token: i64,
    subscription_token: i64,
    addons_token: i64,
    registration_token: i64,
    has_active_subscription: bool,
}

/// Token accounting service
pub struct TokenService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl TokenService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Current balances for a user
    pub async fn balances(&self, user_id: Uuid) -> BillingResult<TokenBalances> {
        let balances: Option<TokenBalances> = sqlx::query_as(
            r#"
            SELECT free_token, subscription_token, addons_token, registration_token
            FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        balances.ok_or_else(|| BillingError::NotFound(format!("user {}", user_id)))
    }

    /// Monthly token grant: one transaction, all users.
    ///
    /// Subscribers get `subscription_token` reset to the grant amount;
    /// everyone else gets `free_token` reset. Any failure rolls back the
    /// whole batch.
    pub async fn run_monthly_grant(&self, amount: Option<i64>) -> BillingResult<GrantSummary> {
        let grant_amount = amount.unwrap_or(DEFAULT_MONTHLY_GRANT_TOKENS);
        if grant_amount < 0 {
            return Err(BillingError::Validation(
                "grant amount must be non-negative".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let subscribers = sqlx::query(
            r#"
            UPDATE users u SET subscription_token = $1, updated_at = NOW()
            WHERE EXISTS (
                SELECT 1 FROM subscriptions s
                WHERE s.user_id = u.id AND s.status = 'active'
            )
            "#,
        )
        .bind(grant_amount)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let non_subscribers = sqlx::query(
            r#"
            UPDATE users u SET free_token = $1, updated_at = NOW()
            WHERE NOT EXISTS (
                SELECT 1 FROM subscriptions s
                WHERE s.user_id = u.id AND s.status = 'active'
            )
            "#,
        )
        .bind(grant_amount)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(
            grant_amount = grant_amount,
            subscribers = subscribers,
            non_subscribers = non_subscribers,
            "Monthly token grant complete"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::TokensGranted).data(
                    serde_json::json!({
                        "grant_amount": grant_amount,
                        "subscribers": subscribers,
                        "non_subscribers": non_subscribers,
                    }),
                ),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log monthly grant event");
        }

        Ok(GrantSummary {
            grant_amount,
            subscribers,
            non_subscribers,
        })
    }

    /// Apply the purchase gate for a user
    pub async fn check_purchase_allowed(&self, user_id: Uuid) -> BillingResult<()> {
        let row: Option<GateRow> = sqlx::query_as(
            r#"
            SELECT
                u.signup_channel,
                u.free_token, u.subscription_token, u.addons_token, u.registration_token,
                EXISTS (
                    SELECT 1 FROM subscriptions s
                    WHERE s.user_id = u.id AND s.status = 'active'
                ) AS has_active_subscription
            FROM users u WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| BillingError::NotFound(format!("user {}", user_id)))?;

        let balances = TokenBalances {
            free_token: row.free_token,
            subscription_token: row.subscription_token,
            addons_token: row.addons_token,
            registration_token: row.registration_token,
        };

        match purchase_gate(
            SignupChannel::parse(&row.signup_channel),
            &balances,
            &StartingAllotment::default(),
            row.has_active_subscription,
        ) {
            PurchaseGate::Allowed => Ok(()),
            PurchaseGate::SubscriptionRequired => {
                tracing::info!(
                    user_id = %user_id,
                    signup_channel = %row.signup_channel,
                    "Token purchase blocked: subscription required"
                );
                Err(BillingError::SubscriptionRequired)
            }
        }
    }

    /// Purchase additional tokens (credits the addons bucket)
    pub async fn purchase_tokens(&self, user_id: Uuid, amount: i64) -> BillingResult<TokenBalances> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "purchase amount must be positive".to_string(),
            ));
        }

        self.check_purchase_allowed(user_id).await?;

        let balances: TokenBalances = sqlx::query_as(
            r#"
            UPDATE users SET addons_token = addons_token + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING free_token, subscription_token, addons_token, registration_token
            "#,
        )
        .bind(amount)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, amount = amount, "Token purchase applied");

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::TokensPurchased)
                    .user(user_id)
                    .data(serde_json::json!({"amount": amount}))
                    .actor(user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log token purchase event");
        }

        Ok(balances)
    }

    /// Admin credit to a chosen bucket
    pub async fn grant_tokens(
        &self,
        user_id: Uuid,
        bucket: TokenBucket,
        amount: i64,
        admin_id: Uuid,
    ) -> BillingResult<TokenBalances> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "grant amount must be positive".to_string(),
            ));
        }

        // Column name comes from a fixed enum, never from input
        let sql = format!(
            r#"
            UPDATE users SET {col} = {col} + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING free_token, subscription_token, addons_token, registration_token
            "#,
            col = bucket.column()
        );

        let balances: Option<TokenBalances> = sqlx::query_as(&sql)
            .bind(amount)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let balances =
            balances.ok_or_else(|| BillingError::NotFound(format!("user {}", user_id)))?;

        tracing::info!(
            user_id = %user_id,
            bucket = bucket.column(),
            amount = amount,
            admin_id = %admin_id,
            "Manual token grant applied"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::TokensGranted)
                    .user(user_id)
                    .data(serde_json::json!({
                        "bucket": bucket.column(),
                        "amount": amount,
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log manual grant event");
        }

        Ok(balances)
    }
}
