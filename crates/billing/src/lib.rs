// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Some billing operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Chartsight Billing Module
//!
//! Handles the subscription lifecycle and token-credit accounting.
//!
//! ## Features
//!
//! - **Subscription Management**: Checkout, upgrade, pending downgrade, cancel
//! - **Proration**: Remaining-time credit on upgrades, invoiced via Stripe
//! - **Renewals**: Daily batch applying pending downgrades and cycle grants
//! - **Token Accounting**: Monthly grant, purchase gating, manual credits
//! - **Referral Tiers**: Non-overlapping ranges mapped to reward payloads
//! - **Invariants**: Runnable consistency checks over billing state

pub mod client;
pub mod error;
pub mod events;
pub mod invariants;
pub mod invoices;
pub mod plans;
pub mod referrals;
pub mod renewal;
pub mod subscriptions;
pub mod tokens;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Invoices
pub use invoices::{FinalizedInvoice, InvoiceService};

// Plans
pub use plans::{NewPlan, Plan, PlanService, PlanUpdate};

// Referrals
pub use referrals::{
    ReferralService, ReferralTier, ReferralTierInput, SalesMilestoneTier, SalesMilestoneTierInput,
    UserReward,
};

// Renewal
pub use renewal::{RenewalService, RenewalSummary};

// Subscriptions
pub use subscriptions::{
    advance_billing_date, prorated_credit_cents, CancelResult, CheckoutResult, PlanChangeOutcome,
    Subscription, SubscriptionService, PENDING_DOWNGRADE_KEY,
};

// Tokens
pub use tokens::{purchase_gate, GrantSummary, PurchaseGate, TokenBucket, TokenService};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub plans: PlanService,
    pub subscriptions: SubscriptionService,
    pub renewal: RenewalService,
    pub tokens: TokenService,
    pub referrals: ReferralService,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new(stripe, pool))
    }

    /// Create a new billing service with an explicit Stripe client
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            plans: PlanService::new(pool.clone()),
            subscriptions: SubscriptionService::new(stripe, pool.clone()),
            renewal: RenewalService::new(pool.clone()),
            tokens: TokenService::new(pool.clone()),
            referrals: ReferralService::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
        }
    }
}
