//! Plan catalog routes

use axum::extract::{Extension, Path, State};
use axum::Json;
use chartsight_billing::{NewPlan, Plan, PlanUpdate};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::{ok, ok_with, Envelope};
use crate::state::AppState;

pub async fn list_plans(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<Vec<Plan>>>> {
    let billing = state.billing()?;
    let plans = billing.plans.list_active().await?;
    Ok(ok(plans))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<NewPlan>,
) -> ApiResult<Json<Envelope<Plan>>> {
    let billing = state.billing()?;
    let plan = billing.plans.create(req, auth_user.user_id).await?;
    Ok(ok_with("plan created", plan))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<PlanUpdate>,
) -> ApiResult<Json<Envelope<Plan>>> {
    let billing = state.billing()?;
    let plan = billing.plans.update(plan_id, req, auth_user.user_id).await?;
    Ok(ok_with("plan updated", plan))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(plan_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<()>>> {
    let billing = state.billing()?;
    billing.plans.retire(plan_id, auth_user.user_id).await?;
    Ok(ok_with("plan retired", ()))
}
