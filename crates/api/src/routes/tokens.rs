//! Token balance, purchase, and manual grant routes

use axum::extract::{Extension, State};
use axum::Json;
use chartsight_billing::TokenBucket;
use chartsight_shared::TokenBalances;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: Uuid,
    pub bucket: TokenBucket,
    pub amount: i64,
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<TokenBalances>>> {
    let billing = state.billing()?;
    let balances = billing.tokens.balances(auth_user.user_id).await?;
    Ok(ok(balances))
}

/// Purchase additional tokens; messaging-channel signups without an active
/// subscription are rejected with `subscription_required` once they have
/// consumed part of their starting allotment.
pub async fn purchase(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Json<Envelope<TokenBalances>>> {
    let billing = state.billing()?;
    let balances = billing
        .tokens
        .purchase_tokens(auth_user.user_id, req.amount)
        .await?;
    Ok(ok_with("tokens purchased", balances))
}

pub async fn grant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<GrantRequest>,
) -> ApiResult<Json<Envelope<TokenBalances>>> {
    let billing = state.billing()?;
    let balances = billing
        .tokens
        .grant_tokens(req.user_id, req.bucket, req.amount, auth_user.user_id)
        .await?;
    Ok(ok_with("tokens granted", balances))
}
