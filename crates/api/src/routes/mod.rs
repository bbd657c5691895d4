//! Route registration and the JSON response envelope

pub mod admin;
pub mod calendar;
pub mod plans;
pub mod schedules;
pub mod subscriptions;
pub mod telegram;
pub mod tiers;
pub mod tokens;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::{require_admin, require_auth};
use crate::state::AppState;

/// `{success, message, data}` response envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

/// 200 envelope
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: "ok".to_string(),
        data: Some(data),
    })
}

/// 200 envelope with a custom message
pub fn ok_with<T: Serialize>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.to_string(),
        data: Some(data),
    })
}

async fn health() -> Json<Envelope<&'static str>> {
    ok("healthy")
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    // Inbound bot updates authenticate via the webhook registration, not JWT
    let public = Router::new().route("/telegram/webhook", post(telegram::inbound_webhook));

    let user = Router::new()
        .route("/plans", get(plans::list_plans))
        .route("/subscription", get(subscriptions::current))
        .route("/subscription/checkout", post(subscriptions::checkout))
        .route("/subscription/change", post(subscriptions::change_plan))
        .route("/subscription/cancel", post(subscriptions::cancel))
        .route("/tokens/balance", get(tokens::balance))
        .route("/tokens/purchase", post(tokens::purchase))
        .route("/schedules", get(schedules::list).post(schedules::create))
        .route("/schedules/{id}", delete(schedules::remove))
        .route("/calendar", get(calendar::forex_calendar))
        .route("/telegram/verify", post(telegram::verify_code))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/admin/plans", post(plans::create_plan))
        .route(
            "/admin/plans/{id}",
            put(plans::update_plan).delete(plans::delete_plan),
        )
        .route("/admin/tokens/grant", post(tokens::grant))
        .route(
            "/admin/referral-tiers",
            get(tiers::list_referral_tiers).post(tiers::create_referral_tier),
        )
        .route(
            "/admin/referral-tiers/{id}",
            put(tiers::update_referral_tier).delete(tiers::delete_referral_tier),
        )
        .route(
            "/admin/sales-milestone-tiers",
            get(tiers::list_sales_tiers).post(tiers::create_sales_tier),
        )
        .route(
            "/admin/sales-milestone-tiers/{id}",
            put(tiers::update_sales_tier).delete(tiers::delete_sales_tier),
        )
        .route(
            "/admin/rewards/evaluate",
            post(tiers::evaluate_referral_reward),
        )
        .route("/admin/rewards/{id}/status", put(tiers::update_reward_status))
        .route(
            "/admin/telegram/webhook",
            post(telegram::register_webhook).delete(telegram::remove_webhook),
        )
        .route("/admin/invariants", get(admin::run_invariants))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", public.merge(user).merge(admin))
        .with_state(state)
}
