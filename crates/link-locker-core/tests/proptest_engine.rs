// crates/link-locker-core/tests/proptest_engine.rs
// ============================================================================
// Module: Engine Property-Based Tests
// Description: Property tests for targeting, gating, and attribution.
// Purpose: Check invariants across wide input ranges.
// ============================================================================

//! Property-based tests for engine invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeMap;

use common::Harness;
use common::PUBLISHER;
use common::TASK;
use link_locker_core::Browser;
use link_locker_core::CountryCode;
use link_locker_core::Device;
use link_locker_core::EligibilityGate;
use link_locker_core::EligibilityKey;
use link_locker_core::InMemoryLockerStore;
use link_locker_core::LedgerStore;
use link_locker_core::Locker;
use link_locker_core::PublisherId;
use link_locker_core::Task;
use link_locker_core::TaskId;
use link_locker_core::Tier;
use link_locker_core::Timestamp;
use link_locker_core::VisitorContext;
use link_locker_core::runtime::evaluate_task;
use link_locker_core::runtime::sign_params;
use link_locker_core::runtime::verify_params;
use proptest::prelude::*;

const HOUR: i64 = 3_600_000;

fn device_strategy() -> impl Strategy<Value = Device> {
    prop_oneof![Just(Device::Desktop), Just(Device::Mobile), Just(Device::Tablet)]
}

fn browser_strategy() -> impl Strategy<Value = Browser> {
    prop_oneof![
        Just(Browser::Chrome),
        Just(Browser::Firefox),
        Just(Browser::Safari),
        Just(Browser::Edge),
        Just(Browser::Opera),
        Just(Browser::Samsung),
        Just(Browser::Other),
    ]
}

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Tier1), Just(Tier::Tier2), Just(Tier::Tier3)]
}

proptest! {
    #[test]
    fn unconstrained_tasks_are_offered_to_every_visitor(
        device in device_strategy(),
        browser in browser_strategy(),
        tier in tier_strategy(),
        country in "[A-Z]{2}",
    ) {
        let visitor = VisitorContext {
            ip_address: "192.0.2.1".to_string(),
            device,
            browser,
            country_code: CountryCode::parse(&country).unwrap(),
            tier,
            is_vpn: false,
            is_proxy: false,
        };
        let task = Task::new("open", "general");
        let locker = Locker::new("l", "p", "https://publisher.example");
        prop_assert_eq!(evaluate_task(&task, &visitor, &locker, None), Ok(()));
    }

    #[test]
    fn gate_counts_match_the_window_model(
        gaps in prop::collection::vec(0 .. 30 * HOUR, 1 .. 24),
        cooldown in 1u32 .. 48,
    ) {
        let store = InMemoryLockerStore::new();
        let gate = EligibilityGate::new(cooldown);
        let key = EligibilityKey::for_task("192.0.2.2", &TaskId::new("t"));
        let window = i64::from(cooldown) * HOUR;
        let mut now = 1_700_000_000_000_i64;
        let mut first: Option<i64> = None;
        for gap in gaps {
            now += gap;
            let expected = first.is_none_or(|start| now - start > window);
            if expected {
                first = Some(now);
            }
            let decision = gate.check(&store, &key, Timestamp::from_unix_millis(now)).unwrap();
            prop_assert_eq!(decision.should_count, expected);
        }
    }

    #[test]
    fn signatures_verify_and_detect_tampering(
        params in prop::collection::btree_map("[a-z_]{1,8}", "[ -~]{0,16}", 1 .. 6),
        secret in "[a-zA-Z0-9]{1,32}",
    ) {
        let params: BTreeMap<String, String> = params;
        let signature = sign_params(&secret, &params).unwrap();
        prop_assert!(verify_params(&secret, &params, &signature));
        let mut tampered = params.clone();
        tampered.insert("extra9".to_string(), "1".to_string());
        prop_assert!(!verify_params(&secret, &tampered, &signature));
    }

    #[test]
    fn replayed_postbacks_credit_exactly_once(
        replays in 1usize .. 6,
        click in "[a-z0-9]{4,12}",
    ) {
        let harness = Harness::new();
        let params: BTreeMap<String, String> = [
            ("click_id", click.as_str()),
            ("task_id", TASK),
            ("status", "approved"),
            ("payout", "1.25"),
            ("user_id", PUBLISHER),
        ]
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
        for _ in 0 .. replays {
            harness.engine.process_postback(params.clone()).unwrap();
        }
        let events = harness.store.list_revenue_events(&PublisherId::new(PUBLISHER)).unwrap();
        prop_assert_eq!(events.len(), 1);
    }
}
