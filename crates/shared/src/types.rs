//! Domain enums and token constants
//!
//! All enums are persisted as TEXT columns; parsing is lenient and falls back
//! to a sensible default so a bad row degrades instead of wedging a batch job.

use serde::{Deserialize, Serialize};

/// Default amount applied by the monthly token grant job
pub const DEFAULT_MONTHLY_GRANT_TOKENS: i64 = 15_000;

/// Free tokens issued at signup (all channels)
pub const SIGNUP_FREE_TOKENS: i64 = 15_000;

/// Registration bonus tokens issued at signup
pub const SIGNUP_REGISTRATION_TOKENS: i64 = 5_000;

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "past_due" => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Canceled rows are terminal; everything else still counts against the
    /// one-subscription-per-user invariant.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }
}

/// Plan billing interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "yearly" => BillingInterval::Yearly,
            _ => BillingInterval::Monthly,
        }
    }
}

/// How the user account was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupChannel {
    Standard,
    Firebase,
    Telegram,
    Whatsapp,
}

impl SignupChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignupChannel::Standard => "standard",
            SignupChannel::Firebase => "firebase",
            SignupChannel::Telegram => "telegram",
            SignupChannel::Whatsapp => "whatsapp",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "firebase" => SignupChannel::Firebase,
            "telegram" => SignupChannel::Telegram,
            "whatsapp" => SignupChannel::Whatsapp,
            _ => SignupChannel::Standard,
        }
    }

    /// Channels subject to the token-purchase subscription gate
    pub fn is_messaging(&self) -> bool {
        matches!(self, SignupChannel::Telegram | SignupChannel::Whatsapp)
    }
}

/// The four token balances carried per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TokenBalances {
    pub free_token: i64,
    pub subscription_token: i64,
    pub addons_token: i64,
    pub registration_token: i64,
}

/// Starting allotments for the balances the purchase gate inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartingAllotment {
    pub free: i64,
    pub subscription: i64,
    pub addons: i64,
}

impl Default for StartingAllotment {
    fn default() -> Self {
        Self {
            free: SIGNUP_FREE_TOKENS,
            subscription: 0,
            addons: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_known_values() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Incomplete,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_degrades_to_incomplete() {
        assert_eq!(
            SubscriptionStatus::parse("trialing"),
            SubscriptionStatus::Incomplete
        );
    }

    #[test]
    fn only_canceled_is_terminal() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
        assert!(!SubscriptionStatus::PastDue.is_terminal());
        assert!(!SubscriptionStatus::Incomplete.is_terminal());
    }

    #[test]
    fn messaging_channels_are_gated() {
        assert!(SignupChannel::Telegram.is_messaging());
        assert!(SignupChannel::Whatsapp.is_messaging());
        assert!(!SignupChannel::Standard.is_messaging());
        assert!(!SignupChannel::Firebase.is_messaging());
    }
}
