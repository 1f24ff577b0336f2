// crates/link-locker-core/tests/engine_flow.rs
// ============================================================================
// Module: Engine Flow Tests
// Description: Offer listing, dispatch, and analytics reporting.
// Purpose: Exercise the visitor-facing engine operations end to end.
// ============================================================================

//! Visitor flows over the in-memory store.

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

use std::collections::BTreeSet;

use common::Harness;
use common::LOCKER;
use common::TASK;
use common::money;
use common::visitor;
use link_locker_core::AdUrlMode;
use link_locker_core::AnalyticsReport;
use link_locker_core::AnalyticsStore;
use link_locker_core::CatalogStore;
use link_locker_core::ClickId;
use link_locker_core::CompletionRefusal;
use link_locker_core::CountryCode;
use link_locker_core::Device;
use link_locker_core::DeviceTargetingOverride;
use link_locker_core::EngineError;
use link_locker_core::EventKind;
use link_locker_core::LedgerStore;
use link_locker_core::LockerId;
use link_locker_core::PublisherId;
use link_locker_core::RateRow;
use link_locker_core::TaskId;
use link_locker_core::TaskState;
use link_locker_core::TaskStatus;
use link_locker_core::TaskType;
use link_locker_core::Tier;
use link_locker_core::VisitorContext;
use link_locker_core::runtime::AdUrlSource;
use link_locker_core::runtime::ExclusionReason;
use link_locker_core::runtime::RateSource;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn locker_id() -> LockerId {
    LockerId::new(LOCKER)
}

fn task_id() -> TaskId {
    TaskId::new(TASK)
}

fn mobile_only(harness: &Harness) {
    let mut task = common::task();
    task.task_id = TaskId::new("task-mobile");
    task.target_devices = BTreeSet::from([Device::Mobile]);
    harness.store.put_task(&task).unwrap();
}

fn report(kind: EventKind) -> AnalyticsReport {
    AnalyticsReport::new(locker_id(), kind)
}

fn completion(click_id: Option<&str>, duration: Option<f64>) -> AnalyticsReport {
    let mut report = report(EventKind::TaskComplete);
    report.task_id = Some(task_id());
    report.click_id = click_id.map(str::to_string);
    report.duration_seconds = duration;
    report
}

// ============================================================================
// SECTION: Offers
// ============================================================================

#[test]
fn list_offers_filters_and_explains_each_task() {
    let harness = Harness::new();
    mobile_only(&harness);
    let list = harness.engine.list_offers(&locker_id(), &visitor("198.51.100.1")).unwrap();

    assert_eq!(list.offers.len(), 1);
    let offer = &list.offers[0];
    assert_eq!(offer.task_id, task_id());
    assert_eq!(offer.cpm, money("4.50"));
    assert_eq!(offer.rate_source, RateSource::TaskTier {
        tier: Tier::Tier1
    });
    assert_eq!(offer.ad_url_source, Some(AdUrlSource::TaskDefault));
    assert!(offer.dispatchable);

    assert_eq!(list.verdicts.len(), 2);
    let excluded = list.verdicts.iter().find(|v| v.task_id.as_str() == "task-mobile").unwrap();
    assert_eq!(excluded.excluded, Some(ExclusionReason::DeviceNotTargeted));
}

#[test]
fn list_offers_marks_tasks_without_ad_url_as_not_dispatchable() {
    let harness = Harness::new();
    let mut task = common::task();
    task.ad_url = None;
    harness.store.put_task(&task).unwrap();
    let list = harness.engine.list_offers(&locker_id(), &visitor("198.51.100.2")).unwrap();
    assert!(!list.offers[0].dispatchable);
    assert_eq!(list.offers[0].ad_url_source, None);
}

#[test]
fn override_task_selection_hides_other_tasks() {
    let harness = Harness::new();
    let mut other = common::task();
    other.task_id = TaskId::new("task-2");
    harness.store.put_task(&other).unwrap();
    let mut slot = DeviceTargetingOverride::new(Device::Desktop, CountryCode::us());
    slot.task_id = Some(TaskId::new("task-2"));
    slot.ad_url = Some("https://ads.example/override".to_string());
    harness.engine.save_overrides(&[slot]).unwrap();

    let list = harness.engine.list_offers(&locker_id(), &visitor("198.51.100.3")).unwrap();
    let ids: Vec<&str> = list.offers.iter().map(|offer| offer.task_id.as_str()).collect();
    assert_eq!(ids, vec!["task-2"]);
    assert_eq!(list.offers[0].ad_url_source, Some(AdUrlSource::DeviceOverride));
}

#[test]
fn unknown_locker_is_not_found() {
    let harness = Harness::new();
    let result = harness.engine.list_offers(&LockerId::new("ghost"), &visitor("198.51.100.4"));
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

#[test]
fn dispatch_mints_click_and_replaces_tracking_param() {
    let harness = Harness::new();
    let mut task = common::task();
    task.ad_url = Some("https://ads.example/task?sub1=stale&aff=7".to_string());
    harness.store.put_task(&task).unwrap();

    let dispatch =
        harness.engine.dispatch(&locker_id(), &task_id(), &visitor("198.51.100.5")).unwrap();
    let click = ClickId::parse(&dispatch.click_id).unwrap();
    assert_eq!(click.locker_id, locker_id());
    assert_eq!(click.task_id, task_id());
    assert_eq!(click.dispatched_at, harness.engine.now());
    assert_eq!(dispatch.state, TaskState::Waiting);
    assert_eq!(dispatch.completion_time_seconds, 30);
    assert!(dispatch.ad_url.contains("aff=7"));
    assert!(dispatch.ad_url.contains(&format!("sub1={}", dispatch.click_id)));
    assert!(!dispatch.ad_url.contains("stale"));
}

#[test]
fn dispatch_prefers_tiered_locker_url() {
    let harness = Harness::new();
    let mut locker = common::locker();
    locker.ad_url_mode = AdUrlMode::Tiered;
    locker.tiered_ad_urls.insert(Tier::Tier2, "https://ads.example/tier2".to_string());
    harness.store.put_locker(&locker).unwrap();

    let dispatch =
        harness.engine.dispatch(&locker_id(), &task_id(), &visitor("198.51.100.6")).unwrap();
    assert_eq!(dispatch.ad_url_source, AdUrlSource::LockerTiered {
        tier: Tier::Tier2
    });
    assert!(dispatch.ad_url.starts_with("https://ads.example/tier2?sub1="));
}

#[test]
fn dispatch_errors_cover_missing_untargeted_and_unset() {
    let harness = Harness::new();
    mobile_only(&harness);
    let ip = visitor("198.51.100.7");

    let missing = harness.engine.dispatch(&locker_id(), &TaskId::new("ghost"), &ip);
    assert!(matches!(missing, Err(EngineError::NotFound(_))));

    let untargeted = harness.engine.dispatch(&locker_id(), &TaskId::new("task-mobile"), &ip);
    let Err(EngineError::Forbidden(message)) = untargeted else {
        panic!("expected forbidden");
    };
    assert!(message.contains("device_not_targeted"));

    let mut task = common::task();
    task.ad_url = Some("   ".to_string());
    harness.store.put_task(&task).unwrap();
    let unset = harness.engine.dispatch(&locker_id(), &task_id(), &ip);
    assert!(matches!(unset, Err(EngineError::Conflict(_))));
}

// ============================================================================
// SECTION: Completion Reports
// ============================================================================

#[test]
fn completion_before_dwell_time_is_refused() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.8");
    let dispatch = harness.engine.dispatch(&locker_id(), &task_id(), &ip).unwrap();
    harness.clock.advance_secs(10);

    let receipt =
        harness.engine.record_analytics(&completion(Some(&dispatch.click_id), None), &ip).unwrap();
    assert!(!receipt.counted);
    assert!(receipt.gate.is_none());
    assert_eq!(receipt.refusal, Some(CompletionRefusal::TooEarly {
        remaining_millis: 20_000
    }));

    harness.clock.advance_secs(20);
    let accepted =
        harness.engine.record_analytics(&completion(Some(&dispatch.click_id), None), &ip).unwrap();
    assert!(accepted.counted);
    assert!(accepted.refusal.is_none());
}

#[test]
fn mismatched_click_ids_are_refused() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.9");

    let garbage = harness.engine.record_analytics(&completion(Some("garbage"), None), &ip);
    assert_eq!(garbage.unwrap().refusal, Some(CompletionRefusal::MismatchedClick));

    let mut other = common::locker();
    other.locker_id = LockerId::new("locker-2");
    harness.store.put_locker(&other).unwrap();
    let foreign = harness.engine.dispatch(&LockerId::new("locker-2"), &task_id(), &ip).unwrap();
    harness.clock.advance_secs(60);
    let crossed = harness.engine.record_analytics(&completion(Some(&foreign.click_id), None), &ip);
    assert_eq!(crossed.unwrap().refusal, Some(CompletionRefusal::MismatchedClick));
}

#[test]
fn short_duration_and_missing_tasks_are_refused() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.10");

    let short = harness.engine.record_analytics(&completion(None, Some(5.0)), &ip).unwrap();
    assert_eq!(short.refusal, Some(CompletionRefusal::DurationTooShort));

    let bare = harness.engine.record_analytics(&report(EventKind::TaskComplete), &ip).unwrap();
    assert_eq!(bare.refusal, Some(CompletionRefusal::MissingTask));

    let mut unknown = report(EventKind::TaskComplete);
    unknown.task_id = Some(TaskId::new("ghost"));
    let unknown = harness.engine.record_analytics(&unknown, &ip).unwrap();
    assert_eq!(unknown.refusal, Some(CompletionRefusal::UnknownTask));

    assert!(harness.store.list_revenue_events(&PublisherId::new("pub-1")).unwrap().is_empty());
}

#[test]
fn completions_for_untargeted_tasks_are_refused() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.11");
    let mut task = common::task();
    task.status = TaskStatus::Inactive;
    harness.store.put_task(&task).unwrap();
    harness.clock.advance_secs(60);

    let inactive = harness.engine.record_analytics(&completion(None, None), &ip).unwrap();
    assert!(!inactive.counted);
    assert!(inactive.gate.is_none());
    assert_eq!(inactive.refusal, Some(CompletionRefusal::NotTargeted {
        excluded: ExclusionReason::Inactive
    }));

    harness.store.put_task(&common::task()).unwrap();
    let mut locker = common::locker();
    locker.task_types = BTreeSet::from([TaskType::from("video")]);
    harness.store.put_locker(&locker).unwrap();
    let rejected = harness.engine.record_analytics(&completion(None, None), &ip).unwrap();
    assert_eq!(rejected.refusal, Some(CompletionRefusal::NotTargeted {
        excluded: ExclusionReason::TaskTypeNotAccepted
    }));

    assert!(harness.store.list_revenue_events(&PublisherId::new("pub-1")).unwrap().is_empty());
}

#[test]
fn completion_refused_when_override_selects_another_task() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.12");
    let mut slot = DeviceTargetingOverride::new(Device::Desktop, CountryCode::us());
    slot.task_id = Some(TaskId::new("task-2"));
    harness.engine.save_overrides(&[slot]).unwrap();

    let receipt = harness.engine.record_analytics(&completion(None, None), &ip).unwrap();
    assert!(!receipt.counted);
    assert_eq!(receipt.refusal, Some(CompletionRefusal::NotTargeted {
        excluded: ExclusionReason::OverrideSelectsOtherTask
    }));

    let mobile = VisitorContext {
        device: Device::Mobile,
        ..visitor("198.51.100.12")
    };
    let other_slot = harness.engine.record_analytics(&completion(None, None), &mobile).unwrap();
    assert!(other_slot.counted);
}

#[test]
fn task_id_may_arrive_in_extra_payload() {
    let harness = Harness::new();
    let mut report = report(EventKind::TaskComplete);
    report.extra = json!({ "taskId": TASK });
    let receipt = harness.engine.record_analytics(&report, &visitor("198.51.100.11")).unwrap();
    assert!(receipt.counted);
    let events = harness.store.list_analytics_events(&locker_id()).unwrap();
    assert_eq!(events[0].task_id, Some(task_id()));
}

// ============================================================================
// SECTION: Visit and Unlock Events
// ============================================================================

#[test]
fn visits_and_unlocks_are_gated_per_locker_and_always_stored() {
    let harness = Harness::new();
    let ip = visitor("198.51.100.12");

    assert!(harness.engine.record_analytics(&report(EventKind::Visit), &ip).unwrap().counted);
    assert!(!harness.engine.record_analytics(&report(EventKind::Visit), &ip).unwrap().counted);
    assert!(harness.engine.record_analytics(&report(EventKind::Unlock), &ip).unwrap().counted);

    let events = harness.store.list_analytics_events(&locker_id()).unwrap();
    let flags: Vec<bool> = events.iter().map(|event| event.counted).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert_eq!(events[0].ip_address, "198.51.100.12");
    assert_eq!(events[0].device, Device::Desktop);
}

// ============================================================================
// SECTION: Rates and Overrides
// ============================================================================

#[test]
fn rate_import_merges_valid_uploads_and_rejects_bad_ones() {
    let harness = Harness::new();
    let rows = vec![
        RateRow {
            country: "US".to_string(),
            cpm: json!("7.25"),
            country_code: None,
        },
        RateRow {
            country: "Germany".to_string(),
            cpm: json!(3),
            country_code: Some("de".to_string()),
        },
    ];
    let merged = harness.engine.import_rates(Device::Desktop, &rows).unwrap();
    assert_eq!(merged.len(), 2);
    let saved = harness.store.list_overrides(Some(Device::Desktop)).unwrap();
    assert_eq!(saved.len(), 2);

    let list = harness.engine.list_offers(&locker_id(), &visitor("198.51.100.13")).unwrap();
    assert_eq!(list.offers[0].cpm, money("7.25"));
    assert_eq!(list.offers[0].rate_source, RateSource::DeviceOverride);

    let bad = vec![RateRow {
        country: "FR".to_string(),
        cpm: json!("-2"),
        country_code: None,
    }];
    let rejected = harness.engine.import_rates(Device::Desktop, &bad);
    assert!(matches!(rejected, Err(EngineError::Validation(_))));
    assert_eq!(harness.store.list_overrides(Some(Device::Desktop)).unwrap().len(), 2);
}

#[test]
fn save_overrides_rejects_blank_urls_and_negative_cpm() {
    let harness = Harness::new();
    let mut blank = DeviceTargetingOverride::new(Device::Tablet, CountryCode::us());
    blank.ad_url = Some(String::new());
    assert!(matches!(
        harness.engine.save_overrides(&[blank]),
        Err(EngineError::Validation(_))
    ));

    let mut negative = DeviceTargetingOverride::new(Device::Tablet, CountryCode::us());
    negative.cpm = Some(money("-1"));
    assert!(matches!(
        harness.engine.save_overrides(&[negative]),
        Err(EngineError::Validation(_))
    ));
    assert!(harness.store.list_overrides(None).unwrap().is_empty());
}
