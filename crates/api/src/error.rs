//! API error type and JSON envelope
//!
//! Every error leaves the server as `{success: false, message, data}` with a
//! conventional status code. The subscription gate carries its fixed payload
//! in `data` so clients can branch on it without string matching.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chartsight_billing::BillingError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("an active subscription is required to purchase tokens")]
    SubscriptionRequired,

    #[error("database error: {0}")]
    Database(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::SamePlan => {
                ApiError::Validation("already subscribed to this plan".to_string())
            }
            BillingError::TierOverlap(msg) | BillingError::Validation(msg) => {
                ApiError::Validation(msg)
            }
            BillingError::InvalidPlan(msg) => ApiError::Validation(msg),
            BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::SubscriptionNotFound(_) => {
                ApiError::Validation("no current subscription".to_string())
            }
            BillingError::SubscriptionRequired => ApiError::SubscriptionRequired,
            BillingError::ConcurrentModification(msg) => ApiError::Validation(msg),
            BillingError::Database(e) => ApiError::Database(e.to_string()),
            BillingError::StripeApi(msg) => ApiError::Upstream(msg),
            BillingError::Config(_) | BillingError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, data) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!(null)),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, json!(null)),
            ApiError::SubscriptionRequired => (
                StatusCode::FORBIDDEN,
                json!({"subscription_required": true}),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!(null)),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, json!(null)),
            ApiError::Database(msg) | ApiError::Upstream(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!(null))
            }
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, json!(null)),
        };

        let body = json!({
            "success": false,
            "message": self.to_string(),
            "data": data,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_plan_maps_to_validation() {
        let err: ApiError = BillingError::SamePlan.into();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn gate_maps_to_subscription_required() {
        let err: ApiError = BillingError::SubscriptionRequired.into();
        assert!(matches!(err, ApiError::SubscriptionRequired));
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn gate_renders_403_with_fixed_payload() {
        let response = ApiError::SubscriptionRequired.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["subscription_required"], true);
    }

    #[tokio::test]
    async fn overlap_rejection_renders_422() {
        let err: ApiError = BillingError::TierOverlap(
            "range [0, 10] overlaps tier 'Bronze' [5, 15]".to_string(),
        )
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
