//! Forex calendar route

use axum::extract::{Extension, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::calendar::{filter_events, CalendarEvent};
use crate::error::ApiResult;
use crate::routes::{ok, Envelope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub currency: Option<String>,
    pub impact: Option<String>,
}

pub async fn forex_calendar(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<Envelope<Vec<CalendarEvent>>>> {
    let events = state.calendar.fetch().await?;
    let events = filter_events(events, query.currency.as_deref(), query.impact.as_deref());
    Ok(ok(events))
}
