//! Referral tier, sales milestone tier, and reward administration routes

use axum::extract::{Extension, Path, State};
use axum::Json;
use chartsight_billing::{
    ReferralTier, ReferralTierInput, SalesMilestoneTier, SalesMilestoneTierInput, UserReward,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RewardStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateReferralRequest {
    pub user_id: Uuid,
    pub referral_count: i32,
}

// =============================================================================
// Referral tiers
// =============================================================================

pub async fn list_referral_tiers(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<ReferralTier>>>> {
    let billing = state.billing()?;
    let tiers = billing.referrals.list_referral_tiers().await?;
    Ok(ok(tiers))
}

pub async fn create_referral_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Json(req): Json<ReferralTierInput>,
) -> ApiResult<Json<Envelope<ReferralTier>>> {
    let billing = state.billing()?;
    let tier = billing.referrals.create_referral_tier(req).await?;
    Ok(ok_with("referral tier created", tier))
}

pub async fn update_referral_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(tier_id): Path<Uuid>,
    Json(req): Json<ReferralTierInput>,
) -> ApiResult<Json<Envelope<ReferralTier>>> {
    let billing = state.billing()?;
    let tier = billing.referrals.update_referral_tier(tier_id, req).await?;
    Ok(ok_with("referral tier updated", tier))
}

pub async fn delete_referral_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(tier_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    let billing = state.billing()?;
    billing.referrals.delete_referral_tier(tier_id).await?;
    Ok(ok_with("referral tier deleted", ()))
}

// =============================================================================
// Sales milestone tiers
// =============================================================================

pub async fn list_sales_tiers(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<SalesMilestoneTier>>>> {
    let billing = state.billing()?;
    let tiers = billing.referrals.list_sales_tiers().await?;
    Ok(ok(tiers))
}

pub async fn create_sales_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Json(req): Json<SalesMilestoneTierInput>,
) -> ApiResult<Json<Envelope<SalesMilestoneTier>>> {
    let billing = state.billing()?;
    let tier = billing.referrals.create_sales_tier(req).await?;
    Ok(ok_with("sales milestone tier created", tier))
}

pub async fn update_sales_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(tier_id): Path<Uuid>,
    Json(req): Json<SalesMilestoneTierInput>,
) -> ApiResult<Json<Envelope<SalesMilestoneTier>>> {
    let billing = state.billing()?;
    let tier = billing.referrals.update_sales_tier(tier_id, req).await?;
    Ok(ok_with("sales milestone tier updated", tier))
}

pub async fn delete_sales_tier(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(tier_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    let billing = state.billing()?;
    billing.referrals.delete_sales_tier(tier_id).await?;
    Ok(ok_with("sales milestone tier deleted", ()))
}

// =============================================================================
// Rewards
// =============================================================================

/// Match a user's referral count against the tier table and record the reward
pub async fn evaluate_referral_reward(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Json(req): Json<EvaluateReferralRequest>,
) -> ApiResult<Json<Envelope<Option<UserReward>>>> {
    let billing = state.billing()?;
    let reward = billing
        .referrals
        .grant_referral_reward(req.user_id, req.referral_count)
        .await?;

    let message = if reward.is_some() {
        "reward granted"
    } else {
        "no matching tier or reward already granted"
    };
    Ok(ok_with(message, reward))
}

pub async fn update_reward_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(reward_id): Path<Uuid>,
    Json(req): Json<RewardStatusRequest>,
) -> ApiResult<Json<Envelope<UserReward>>> {
    let billing = state.billing()?;
    let reward = billing
        .referrals
        .update_reward_status(reward_id, &req.status, auth_user.user_id)
        .await?;
    Ok(ok_with("reward status updated", reward))
}
