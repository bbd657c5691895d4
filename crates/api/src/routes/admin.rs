//! Platform admin routes

use axum::extract::{Extension, State};
use axum::Json;
use chartsight_billing::InvariantCheckSummary;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::{ok, Envelope};
use crate::state::AppState;

/// Run the billing consistency checks
pub async fn run_invariants(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Envelope<InvariantCheckSummary>>> {
    let billing = state.billing()?;
    let summary = billing.invariants.run_all_checks().await?;

    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            "Billing invariant check found violations"
        );
    }

    Ok(ok(summary))
}
