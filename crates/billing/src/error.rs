//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stripe api error: {0}")]
    StripeApi(String),

    #[error("billing configuration error: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("no current subscription for user {0}")]
    SubscriptionNotFound(String),

    #[error("already subscribed to this plan")]
    SamePlan,

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("{0}")]
    TierOverlap(String),

    #[error("{0}")]
    Validation(String),

    #[error("an active subscription is required to purchase tokens")]
    SubscriptionRequired,

    #[error("{0}")]
    ConcurrentModification(String),

    #[error("internal billing error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}
