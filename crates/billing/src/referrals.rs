//! Referral and sales-milestone tiers
//!
//! Static lookup ranges mapping referral counts (or sales totals) to reward
//! payloads. Referral ranges must stay pairwise disjoint; the check runs at
//! write time, not as a database constraint.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

pub const REWARD_STATUSES: &[&str] = &["pending", "approved", "rejected", "paid"];

/// Inclusive range overlap
pub fn ranges_overlap(a_min: i32, a_max: i32, b_min: i32, b_max: i32) -> bool {
    a_min <= b_max && b_min <= a_max
}

/// A referral tier row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReferralTier {
    pub id: Uuid,
    pub name: String,
    pub min_referrals: i32,
    pub max_referrals: i32,
    pub reward_tokens: i64,
    pub reward_subscription_months: i32,
    pub reward_badge: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralTierInput {
    pub name: String,
    pub min_referrals: i32,
    pub max_referrals: i32,
    pub reward_tokens: i64,
    pub reward_subscription_months: i32,
    pub reward_badge: Option<String>,
}

/// A sales milestone tier row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SalesMilestoneTier {
    pub id: Uuid,
    pub name: String,
    pub required_sales: i64,
    pub reward_tokens: i64,
    pub reward_subscription_months: i32,
    pub reward_badge: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SalesMilestoneTierInput {
    pub name: String,
    pub required_sales: i64,
    pub reward_tokens: i64,
    pub reward_subscription_months: i32,
    pub reward_badge: Option<String>,
}

/// A granted reward awaiting admin action
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserReward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier_kind: String,
    pub tier_id: Uuid,
    pub reward_tokens: i64,
    pub reward_subscription_months: i32,
    pub reward_badge: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Tier and reward administration
pub struct ReferralService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl ReferralService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    // =========================================================================
    // Referral tiers
    // =========================================================================

    pub async fn list_referral_tiers(&self) -> BillingResult<Vec<ReferralTier>> {
        let tiers: Vec<ReferralTier> =
            sqlx::query_as("SELECT * FROM referral_tiers ORDER BY min_referrals ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(tiers)
    }

    pub async fn create_referral_tier(
        &self,
        input: ReferralTierInput,
    ) -> BillingResult<ReferralTier> {
        self.validate_referral_range(&input, None).await?;

        let tier: ReferralTier = sqlx::query_as(
            r#"
            INSERT INTO referral_tiers
                (name, min_referrals, max_referrals, reward_tokens,
                 reward_subscription_months, reward_badge)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.min_referrals)
        .bind(input.max_referrals)
        .bind(input.reward_tokens)
        .bind(input.reward_subscription_months)
        .bind(&input.reward_badge)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            tier_id = %tier.id,
            min = tier.min_referrals,
            max = tier.max_referrals,
            "Created referral tier"
        );
        Ok(tier)
    }

    pub async fn update_referral_tier(
        &self,
        tier_id: Uuid,
        input: ReferralTierInput,
    ) -> BillingResult<ReferralTier> {
        self.validate_referral_range(&input, Some(tier_id)).await?;

        let tier: Option<ReferralTier> = sqlx::query_as(
            r#"
            UPDATE referral_tiers SET
                name = $1, min_referrals = $2, max_referrals = $3,
                reward_tokens = $4, reward_subscription_months = $5,
                reward_badge = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.min_referrals)
        .bind(input.max_referrals)
        .bind(input.reward_tokens)
        .bind(input.reward_subscription_months)
        .bind(&input.reward_badge)
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        tier.ok_or_else(|| BillingError::NotFound(format!("referral tier {}", tier_id)))
    }

    pub async fn delete_referral_tier(&self, tier_id: Uuid) -> BillingResult<()> {
        let rows = sqlx::query("DELETE FROM referral_tiers WHERE id = $1")
            .bind(tier_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(BillingError::NotFound(format!("referral tier {}", tier_id)));
        }
        Ok(())
    }

    /// Pairwise overlap check against every other tier
    async fn validate_referral_range(
        &self,
        input: &ReferralTierInput,
        exclude: Option<Uuid>,
    ) -> BillingResult<()> {
        if input.min_referrals < 0 || input.max_referrals < input.min_referrals {
            return Err(BillingError::Validation(
                "referral range must satisfy 0 <= min <= max".to_string(),
            ));
        }

        let existing = self.list_referral_tiers().await?;
        for tier in existing {
            if Some(tier.id) == exclude {
                continue;
            }
            if ranges_overlap(
                input.min_referrals,
                input.max_referrals,
                tier.min_referrals,
                tier.max_referrals,
            ) {
                return Err(BillingError::TierOverlap(format!(
                    "range [{}, {}] overlaps tier '{}' [{}, {}]",
                    input.min_referrals,
                    input.max_referrals,
                    tier.name,
                    tier.min_referrals,
                    tier.max_referrals
                )));
            }
        }
        Ok(())
    }

    /// Match a referral count to its tier, if any
    pub async fn tier_for_referral_count(&self, count: i32) -> BillingResult<Option<ReferralTier>> {
        let tier: Option<ReferralTier> = sqlx::query_as(
            r#"
            SELECT * FROM referral_tiers
            WHERE min_referrals <= $1 AND max_referrals >= $1
            LIMIT 1
            "#,
        )
        .bind(count)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    // =========================================================================
    // Sales milestone tiers
    // =========================================================================

    pub async fn list_sales_tiers(&self) -> BillingResult<Vec<SalesMilestoneTier>> {
        let tiers: Vec<SalesMilestoneTier> =
            sqlx::query_as("SELECT * FROM sales_milestone_tiers ORDER BY required_sales ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(tiers)
    }

    pub async fn create_sales_tier(
        &self,
        input: SalesMilestoneTierInput,
    ) -> BillingResult<SalesMilestoneTier> {
        self.validate_sales_milestone(&input, None).await?;

        let tier: SalesMilestoneTier = sqlx::query_as(
            r#"
            INSERT INTO sales_milestone_tiers
                (name, required_sales, reward_tokens, reward_subscription_months, reward_badge)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.required_sales)
        .bind(input.reward_tokens)
        .bind(input.reward_subscription_months)
        .bind(&input.reward_badge)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(tier_id = %tier.id, required_sales = tier.required_sales, "Created sales milestone tier");
        Ok(tier)
    }

    pub async fn update_sales_tier(
        &self,
        tier_id: Uuid,
        input: SalesMilestoneTierInput,
    ) -> BillingResult<SalesMilestoneTier> {
        self.validate_sales_milestone(&input, Some(tier_id)).await?;

        let tier: Option<SalesMilestoneTier> = sqlx::query_as(
            r#"
            UPDATE sales_milestone_tiers SET
                name = $1, required_sales = $2, reward_tokens = $3,
                reward_subscription_months = $4, reward_badge = $5, updated_at = NOW()
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(input.required_sales)
        .bind(input.reward_tokens)
        .bind(input.reward_subscription_months)
        .bind(&input.reward_badge)
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        tier.ok_or_else(|| BillingError::NotFound(format!("sales milestone tier {}", tier_id)))
    }

    pub async fn delete_sales_tier(&self, tier_id: Uuid) -> BillingResult<()> {
        let rows = sqlx::query("DELETE FROM sales_milestone_tiers WHERE id = $1")
            .bind(tier_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(BillingError::NotFound(format!(
                "sales milestone tier {}",
                tier_id
            )));
        }
        Ok(())
    }

    async fn validate_sales_milestone(
        &self,
        input: &SalesMilestoneTierInput,
        exclude: Option<Uuid>,
    ) -> BillingResult<()> {
        if input.required_sales < 0 {
            return Err(BillingError::Validation(
                "required sales must be non-negative".to_string(),
            ));
        }

        let existing = self.list_sales_tiers().await?;
        for tier in existing {
            if Some(tier.id) == exclude {
                continue;
            }
            if tier.required_sales == input.required_sales {
                return Err(BillingError::TierOverlap(format!(
                    "milestone at {} sales already exists ('{}')",
                    tier.required_sales, tier.name
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Rewards
    // =========================================================================

    /// Record the reward for a user hitting a referral tier
    pub async fn grant_referral_reward(
        &self,
        user_id: Uuid,
        referral_count: i32,
    ) -> BillingResult<Option<UserReward>> {
        let Some(tier) = self.tier_for_referral_count(referral_count).await? else {
            return Ok(None);
        };

        // One reward per tier per user
        let already: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM user_rewards WHERE user_id = $1 AND tier_id = $2",
        )
        .bind(user_id)
        .bind(tier.id)
        .fetch_optional(&self.pool)
        .await?;
        if already.is_some() {
            return Ok(None);
        }

        let reward: UserReward = sqlx::query_as(
            r#"
            INSERT INTO user_rewards
                (user_id, tier_kind, tier_id, reward_tokens,
                 reward_subscription_months, reward_badge)
            VALUES ($1, 'referral', $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tier.id)
        .bind(tier.reward_tokens)
        .bind(tier.reward_subscription_months)
        .bind(&tier.reward_badge)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            tier_id = %tier.id,
            referral_count = referral_count,
            "Granted referral reward"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::RewardGranted)
                    .user(user_id)
                    .data(serde_json::json!({
                        "tier_kind": "referral",
                        "tier_id": tier.id,
                        "referral_count": referral_count,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log reward event");
        }

        Ok(Some(reward))
    }

    /// Admin update of a reward's status
    pub async fn update_reward_status(
        &self,
        reward_id: Uuid,
        status: &str,
        admin_id: Uuid,
    ) -> BillingResult<UserReward> {
        if !REWARD_STATUSES.contains(&status) {
            return Err(BillingError::Validation(format!(
                "invalid reward status '{}' (expected one of {})",
                status,
                REWARD_STATUSES.join(", ")
            )));
        }

        let reward: Option<UserReward> = sqlx::query_as(
            r#"
            UPDATE user_rewards SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;
        let reward = reward.ok_or_else(|| BillingError::NotFound(format!("reward {}", reward_id)))?;

        tracing::info!(
            reward_id = %reward_id,
            status = status,
            admin_id = %admin_id,
            "Updated reward status"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(BillingEventType::RewardStatusChanged)
                    .user(reward.user_id)
                    .data(serde_json::json!({
                        "reward_id": reward_id,
                        "status": status,
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log reward status event");
        }

        Ok(reward)
    }
}
