//! Subscription lifecycle routes

use axum::extract::{Extension, State};
use axum::Json;
use chartsight_billing::{CancelResult, CheckoutResult, PlanChangeOutcome, Subscription};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_id: Uuid,
}

pub async fn current(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Option<Subscription>>>> {
    let billing = state.billing()?;
    let sub = billing
        .subscriptions
        .current_subscription(auth_user.user_id)
        .await?;
    Ok(ok(sub))
}

pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<Envelope<CheckoutResult>>> {
    let billing = state.billing()?;
    let result = billing
        .subscriptions
        .create_checkout(auth_user.user_id, req.plan_id)
        .await?;
    Ok(ok_with("subscription created", result))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ChangePlanRequest>,
) -> ApiResult<Json<Envelope<PlanChangeOutcome>>> {
    let billing = state.billing()?;
    let outcome = billing
        .subscriptions
        .change_plan(auth_user.user_id, req.plan_id)
        .await?;

    let message = match &outcome {
        PlanChangeOutcome::Upgrade { .. } => "plan upgraded",
        PlanChangeOutcome::Downgrade { .. } => "downgrade scheduled for next billing date",
    };
    Ok(ok_with(message, outcome))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<CancelResult>>> {
    let billing = state.billing()?;
    let result = billing.subscriptions.cancel(auth_user.user_id).await?;
    Ok(ok_with("subscription canceled", result))
}
