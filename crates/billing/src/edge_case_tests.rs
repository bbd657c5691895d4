// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing System
//!
//! Tests critical boundary conditions in:
//! - Proration math (BILL-P01 to BILL-P06)
//! - Billing date advancement (BILL-D01 to BILL-D05)
//! - Token purchase gating (BILL-G01 to BILL-G07)
//! - Referral tier range overlap (BILL-T01 to BILL-T05)
//! - Pending downgrade metadata (BILL-M01 to BILL-M03)

#[cfg(test)]
mod proration_tests {
    use crate::subscriptions::prorated_credit_cents;
    use time::macros::datetime;

    // =========================================================================
    // BILL-P01: 10/mo -> 30/mo with 15 of 30 days remaining yields 5.00 credit
    // =========================================================================
    #[test]
    fn test_half_period_remaining_gives_half_credit() {
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
            datetime!(2024-03-16 00:00:00 UTC),
        );
        assert_eq!(credit, 500, "10.00 with 15/30 days left should credit 5.00");
    }

    // =========================================================================
    // BILL-P02: Period already over - no credit
    // =========================================================================
    #[test]
    fn test_expired_period_gives_no_credit() {
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
            datetime!(2024-04-02 00:00:00 UTC),
        );
        assert_eq!(credit, 0);
    }

    // =========================================================================
    // BILL-P03: now == period_end exactly - no credit
    // =========================================================================
    #[test]
    fn test_boundary_at_period_end_gives_no_credit() {
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
        );
        assert_eq!(credit, 0);
    }

    // =========================================================================
    // BILL-P04: Zero-length period - no credit, no division blowup
    // =========================================================================
    #[test]
    fn test_zero_length_period() {
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-02-28 00:00:00 UTC),
        );
        assert_eq!(credit, 0);
    }

    // =========================================================================
    // BILL-P05: Fractional result floors (never over-credits)
    // =========================================================================
    #[test]
    fn test_fractional_credit_floors() {
        // 10.00 over 30 days, 10 days remaining: 333.33... -> 333
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
            datetime!(2024-03-21 00:00:00 UTC),
        );
        assert_eq!(credit, 333);
    }

    // =========================================================================
    // BILL-P06: Full period remaining - full credit
    // =========================================================================
    #[test]
    fn test_full_period_remaining_gives_full_credit() {
        let credit = prorated_credit_cents(
            1000,
            datetime!(2024-03-01 00:00:00 UTC),
            datetime!(2024-03-31 00:00:00 UTC),
            datetime!(2024-03-01 00:00:00 UTC),
        );
        assert_eq!(credit, 1000);
    }
}

#[cfg(test)]
mod billing_date_tests {
    use crate::subscriptions::advance_billing_date;
    use chartsight_shared::BillingInterval;
    use time::macros::datetime;

    // =========================================================================
    // BILL-D01: Plain monthly advance
    // =========================================================================
    #[test]
    fn test_monthly_advance() {
        let next = advance_billing_date(
            datetime!(2024-03-15 08:30:00 UTC),
            BillingInterval::Monthly,
        );
        assert_eq!(next, datetime!(2024-04-15 08:30:00 UTC));
    }

    // =========================================================================
    // BILL-D02: Jan 31 monthly clamps into February (leap year)
    // =========================================================================
    #[test]
    fn test_monthly_advance_clamps_to_leap_february() {
        let next = advance_billing_date(
            datetime!(2024-01-31 00:00:00 UTC),
            BillingInterval::Monthly,
        );
        assert_eq!(next, datetime!(2024-02-29 00:00:00 UTC));
    }

    // =========================================================================
    // BILL-D03: Mar 31 monthly clamps to Apr 30
    // =========================================================================
    #[test]
    fn test_monthly_advance_clamps_short_month() {
        let next = advance_billing_date(
            datetime!(2024-03-31 00:00:00 UTC),
            BillingInterval::Monthly,
        );
        assert_eq!(next, datetime!(2024-04-30 00:00:00 UTC));
    }

    // =========================================================================
    // BILL-D04: December rolls the year over
    // =========================================================================
    #[test]
    fn test_monthly_advance_across_year_boundary() {
        let next = advance_billing_date(
            datetime!(2024-12-10 00:00:00 UTC),
            BillingInterval::Monthly,
        );
        assert_eq!(next, datetime!(2025-01-10 00:00:00 UTC));
    }

    // =========================================================================
    // BILL-D05: Yearly advance from Feb 29 clamps to Feb 28
    // =========================================================================
    #[test]
    fn test_yearly_advance_from_leap_day() {
        let next = advance_billing_date(
            datetime!(2024-02-29 00:00:00 UTC),
            BillingInterval::Yearly,
        );
        assert_eq!(next, datetime!(2025-02-28 00:00:00 UTC));
    }
}

#[cfg(test)]
mod purchase_gate_tests {
    use crate::tokens::{purchase_gate, PurchaseGate};
    use chartsight_shared::{SignupChannel, StartingAllotment, TokenBalances};

    fn full_balances() -> TokenBalances {
        TokenBalances {
            free_token: 15_000,
            subscription_token: 0,
            addons_token: 0,
            registration_token: 5_000,
        }
    }

    fn consumed_balances() -> TokenBalances {
        TokenBalances {
            free_token: 14_200,
            subscription_token: 0,
            addons_token: 0,
            registration_token: 5_000,
        }
    }

    // =========================================================================
    // BILL-G01: Telegram user with consumed tokens and no subscription - gated
    // =========================================================================
    #[test]
    fn test_telegram_consumed_without_subscription_is_gated() {
        let gate = purchase_gate(
            SignupChannel::Telegram,
            &consumed_balances(),
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::SubscriptionRequired);
    }

    // =========================================================================
    // BILL-G02: Same user with an active subscription - allowed
    // =========================================================================
    #[test]
    fn test_telegram_consumed_with_subscription_is_allowed() {
        let gate = purchase_gate(
            SignupChannel::Telegram,
            &consumed_balances(),
            &StartingAllotment::default(),
            true,
        );
        assert_eq!(gate, PurchaseGate::Allowed);
    }

    // =========================================================================
    // BILL-G03: Telegram user with untouched allotment - allowed
    // =========================================================================
    #[test]
    fn test_telegram_untouched_allotment_is_allowed() {
        let gate = purchase_gate(
            SignupChannel::Telegram,
            &full_balances(),
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::Allowed);
    }

    // =========================================================================
    // BILL-G04: WhatsApp channel is gated the same way
    // =========================================================================
    #[test]
    fn test_whatsapp_consumed_without_subscription_is_gated() {
        let gate = purchase_gate(
            SignupChannel::Whatsapp,
            &consumed_balances(),
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::SubscriptionRequired);
    }

    // =========================================================================
    // BILL-G05: Standard signup is exempt regardless of balances
    // =========================================================================
    #[test]
    fn test_standard_signup_is_exempt() {
        let gate = purchase_gate(
            SignupChannel::Standard,
            &consumed_balances(),
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::Allowed);
    }

    // =========================================================================
    // BILL-G06: Firebase signup is exempt
    // =========================================================================
    #[test]
    fn test_firebase_signup_is_exempt() {
        let gate = purchase_gate(
            SignupChannel::Firebase,
            &consumed_balances(),
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::Allowed);
    }

    // =========================================================================
    // BILL-G07: Single token consumed is enough to trip the gate
    // =========================================================================
    #[test]
    fn test_one_token_consumed_trips_gate() {
        let mut balances = full_balances();
        balances.free_token -= 1;
        let gate = purchase_gate(
            SignupChannel::Telegram,
            &balances,
            &StartingAllotment::default(),
            false,
        );
        assert_eq!(gate, PurchaseGate::SubscriptionRequired);
    }
}

#[cfg(test)]
mod tier_overlap_tests {
    use crate::referrals::ranges_overlap;

    // =========================================================================
    // BILL-T01: [0,10] and [5,15] overlap
    // =========================================================================
    #[test]
    fn test_partial_overlap_detected() {
        assert!(ranges_overlap(0, 10, 5, 15));
        assert!(ranges_overlap(5, 15, 0, 10));
    }

    // =========================================================================
    // BILL-T02: Adjacent but disjoint ranges do not overlap
    // =========================================================================
    #[test]
    fn test_adjacent_ranges_are_disjoint() {
        assert!(!ranges_overlap(0, 10, 11, 20));
        assert!(!ranges_overlap(11, 20, 0, 10));
    }

    // =========================================================================
    // BILL-T03: Shared endpoint counts as overlap (ranges are inclusive)
    // =========================================================================
    #[test]
    fn test_shared_endpoint_overlaps() {
        assert!(ranges_overlap(0, 10, 10, 20));
    }

    // =========================================================================
    // BILL-T04: Containment counts as overlap
    // =========================================================================
    #[test]
    fn test_contained_range_overlaps() {
        assert!(ranges_overlap(0, 100, 20, 30));
        assert!(ranges_overlap(20, 30, 0, 100));
    }

    // =========================================================================
    // BILL-T05: Identical single-point ranges overlap
    // =========================================================================
    #[test]
    fn test_identical_point_ranges_overlap() {
        assert!(ranges_overlap(5, 5, 5, 5));
    }
}

#[cfg(test)]
mod pending_downgrade_tests {
    use crate::subscriptions::{Subscription, PENDING_DOWNGRADE_KEY};
    use time::macros::datetime;
    use uuid::Uuid;

    fn subscription_with_metadata(metadata: serde_json::Value) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: "active".to_string(),
            stripe_subscription_id: None,
            current_period_start: datetime!(2024-03-01 00:00:00 UTC),
            next_billing_date: datetime!(2024-04-01 00:00:00 UTC),
            metadata,
            canceled_at: None,
            ends_at: None,
            created_at: datetime!(2024-03-01 00:00:00 UTC),
            updated_at: datetime!(2024-03-01 00:00:00 UTC),
        }
    }

    // =========================================================================
    // BILL-M01: Valid pending downgrade id round-trips
    // =========================================================================
    #[test]
    fn test_pending_downgrade_parses() {
        let plan_id = Uuid::new_v4();
        let sub = subscription_with_metadata(serde_json::json!({
            PENDING_DOWNGRADE_KEY: plan_id.to_string(),
        }));
        assert_eq!(sub.pending_downgrade_plan_id(), Some(plan_id));
    }

    // =========================================================================
    // BILL-M02: Missing key yields None
    // =========================================================================
    #[test]
    fn test_empty_metadata_has_no_pending_downgrade() {
        let sub = subscription_with_metadata(serde_json::json!({}));
        assert_eq!(sub.pending_downgrade_plan_id(), None);
    }

    // =========================================================================
    // BILL-M03: Garbage value yields None instead of exploding
    // =========================================================================
    #[test]
    fn test_malformed_pending_downgrade_is_ignored() {
        let sub = subscription_with_metadata(serde_json::json!({
            PENDING_DOWNGRADE_KEY: "not-a-uuid",
        }));
        assert_eq!(sub.pending_downgrade_plan_id(), None);
    }
}
