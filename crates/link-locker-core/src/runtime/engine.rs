// crates/link-locker-core/src/runtime/engine.rs
// ============================================================================
// Module: Link Locker Engine
// Description: Request-level orchestration of targeting, dispatch, and credit.
// Purpose: Give every surface one stateless entry point per operation.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror
// ============================================================================

//! ## Overview
//! [`LockerEngine`] is a thin, stateless coordinator over a shared store and
//! a clock. Each method is one request: it loads what it needs, runs the pure
//! targeting and resolution functions, consults the eligibility gate, and
//! delegates revenue to [`AttributionService`]. No decision is cached
//! between calls.
//!
//! Security posture: analytics reports come from visitor browsers. The
//! engine re-verifies the click id and dwell time before counting a
//! completion, and attribution failures never fail the visitor flow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AnalyticsEvent;
use crate::core::Clock;
use crate::core::CooldownStatus;
use crate::core::CountryCode;
use crate::core::Device;
use crate::core::DeviceTargetingOverride;
use crate::core::EligibilityKey;
use crate::core::EventKind;
use crate::core::GateDecision;
use crate::core::GeoInfo;
use crate::core::Label;
use crate::core::Locker;
use crate::core::LockerId;
use crate::core::Money;
use crate::core::PublisherId;
use crate::core::RecordId;
use crate::core::Task;
use crate::core::TaskId;
use crate::core::TaskType;
use crate::core::Tier;
use crate::core::Timestamp;
use crate::core::VisitorContext;
use crate::core::targeting::non_blank;
use crate::interfaces::AnalyticsStore;
use crate::interfaces::BalanceStore;
use crate::interfaces::CatalogStore;
use crate::interfaces::LedgerStore;
use crate::interfaces::StoreError;
use crate::runtime::attribution::AttributionOutcome;
use crate::runtime::attribution::AttributionService;
use crate::runtime::attribution::ClientCompletion;
use crate::runtime::attribution::ReconciliationPolicy;
use crate::runtime::attribution::WebhookRequest;
use crate::runtime::completion::ClickId;
use crate::runtime::completion::CompletionError;
use crate::runtime::completion::TaskInstance;
use crate::runtime::completion::TaskState;
use crate::runtime::gate::DEFAULT_COOLDOWN_HOURS;
use crate::runtime::gate::EligibilityGate;
use crate::runtime::rates::RateRow;
use crate::runtime::rates::merge_rates;
use crate::runtime::rates::validate_rows;
use crate::runtime::resolver::AdUrlResolution;
use crate::runtime::resolver::AdUrlSource;
use crate::runtime::resolver::RateSource;
use crate::runtime::resolver::resolve_ad_url;
use crate::runtime::resolver::resolve_rate;
use crate::runtime::store::SharedLockerStore;
use crate::runtime::targeting::ExclusionReason;
use crate::runtime::targeting::TaskVerdict;
use crate::runtime::targeting::evaluate_task;
use crate::runtime::targeting::resolve_targeting;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default tracking parameter appended at dispatch.
pub const DEFAULT_CLICK_PARAM: &str = "sub1";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Eligibility window length in hours.
    pub cooldown_hours: u32,
    /// Cross-path reconciliation policy.
    pub reconciliation: ReconciliationPolicy,
    /// Query parameter that carries the click id on outbound ad URLs.
    pub click_param: String,
    /// Country used when geolocation fails.
    pub default_country: CountryCode,
    /// Tier used when geolocation fails.
    pub default_tier: Tier,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            reconciliation: ReconciliationPolicy::Independent,
            click_param: DEFAULT_CLICK_PARAM.to_string(),
            default_country: CountryCode::us(),
            default_tier: Tier::Tier1,
        }
    }
}

impl EngineConfig {
    /// Returns the geolocation answer used on lookup failure.
    #[must_use]
    pub fn fallback_geo(&self) -> GeoInfo {
        GeoInfo::fallback(self.default_country.clone(), self.default_tier)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine errors, one variant per response class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Request is malformed or fails validation.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Referenced task or locker does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Credentials or signature are missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The visitor may not act on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The resource is not in a state that allows the request.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Request and Response Types
// ============================================================================

/// One offer shown to a visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Offered task.
    pub task_id: TaskId,
    /// Task title.
    pub title: String,
    /// Task category.
    pub task_type: TaskType,
    /// Dwell time after clamping.
    pub completion_time_seconds: u32,
    /// CPM that applies to this visitor.
    pub cpm: Money,
    /// Chain step that supplied the CPM.
    pub rate_source: RateSource,
    /// Chain step that supplied the ad URL.
    pub ad_url_source: Option<AdUrlSource>,
    /// False when no ad URL resolves.
    pub dispatchable: bool,
}

/// Offers for one visitor on one locker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferList {
    /// Locker the offers belong to.
    pub locker_id: LockerId,
    /// Targeted offers in catalog order.
    pub offers: Vec<Offer>,
    /// Verdict for every candidate task.
    pub verdicts: Vec<TaskVerdict>,
}

/// Result of dispatching a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    /// Minted click identifier.
    pub click_id: String,
    /// Outbound URL carrying the click id.
    pub ad_url: String,
    /// Chain step that supplied the ad URL.
    pub ad_url_source: AdUrlSource,
    /// Dwell time before completion is accepted.
    pub completion_time_seconds: u32,
    /// Dispatch time.
    pub dispatched_at: Timestamp,
    /// Instance state after dispatch.
    pub state: TaskState,
}

/// Analytics report from a visitor browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    /// Locker the event happened on.
    pub locker_id: LockerId,
    /// Event kind.
    #[serde(alias = "event_type")]
    pub event_kind: EventKind,
    /// Signed-in user, when any.
    #[serde(default)]
    pub user_id: Option<PublisherId>,
    /// Position of the task in the offer list.
    #[serde(default)]
    pub task_index: Option<u32>,
    /// Completed task.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Click identifier minted at dispatch.
    #[serde(default)]
    pub click_id: Option<String>,
    /// Seconds the visitor reports having spent.
    #[serde(default, alias = "duration")]
    pub duration_seconds: Option<f64>,
    /// Free-form client payload.
    #[serde(default)]
    pub extra: Value,
}

impl AnalyticsReport {
    /// Creates a bare report.
    #[must_use]
    pub const fn new(locker_id: LockerId, event_kind: EventKind) -> Self {
        Self {
            locker_id,
            event_kind,
            user_id: None,
            task_index: None,
            task_id: None,
            click_id: None,
            duration_seconds: None,
            extra: Value::Null,
        }
    }

    /// Returns the task id from the top level or from `extra`.
    #[must_use]
    pub fn effective_task_id(&self) -> Option<TaskId> {
        self.task_id
            .as_ref()
            .filter(|task_id| !task_id.as_str().trim().is_empty())
            .cloned()
            .or_else(|| self.extra_field(&["taskId", "task_id"]).map(TaskId::new))
    }

    /// Returns the click id from the top level or from `extra`.
    #[must_use]
    pub fn effective_click_id(&self) -> Option<String> {
        non_blank(self.click_id.as_deref())
            .map(str::to_string)
            .or_else(|| self.extra_field(&["clickId", "click_id"]))
    }

    /// Reads the first non-blank string field of `extra`.
    fn extra_field(&self, names: &[&str]) -> Option<String> {
        let object = self.extra.as_object()?;
        names
            .iter()
            .filter_map(|name| object.get(*name).and_then(Value::as_str))
            .find_map(|value| non_blank(Some(value)))
            .map(str::to_string)
    }
}

/// Reason a completion report was not counted before reaching the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CompletionRefusal {
    /// No task id was reported.
    MissingTask,
    /// The reported task does not exist.
    UnknownTask,
    /// The click id is malformed or minted for another locker or task.
    MismatchedClick,
    /// The dwell time has not elapsed since dispatch.
    TooEarly {
        /// Milliseconds left in the dwell timer.
        remaining_millis: i64,
    },
    /// The reported duration is below the task's dwell time.
    DurationTooShort,
    /// Targeting would not offer the task to this visitor.
    NotTargeted {
        /// First failed targeting rule.
        excluded: ExclusionReason,
    },
}

/// Outcome of an analytics report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsReceipt {
    /// Stored analytics event id.
    pub event_id: RecordId,
    /// Whether the event counted.
    pub counted: bool,
    /// Gate decision, when the gate ran.
    pub gate: Option<GateDecision>,
    /// Key the gate was consulted with.
    pub gate_key: Option<EligibilityKey>,
    /// Completion refusal, when the report was refused before the gate.
    pub refusal: Option<CompletionRefusal>,
    /// Attribution outcome, when attribution ran.
    pub attribution: Option<AttributionOutcome>,
    /// Attribution failure captured at the boundary.
    pub attribution_error: Option<EngineError>,
}

/// Ledger totals for one publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    /// Publisher.
    pub publisher_id: PublisherId,
    /// Sum of every revenue row.
    pub lifetime_revenue: Money,
    /// Number of revenue rows.
    pub event_count: usize,
    /// Stored balance.
    pub balance: Money,
    /// Revenue per source label.
    pub by_source: BTreeMap<String, Money>,
}

/// Completion checks that ran before the gate.
struct CompletionCheck {
    /// Task id resolved from the report or the click id.
    task_id: Option<TaskId>,
    /// Loaded task, when it exists.
    task: Option<Task>,
    /// Refusal, if any.
    refusal: Option<CompletionRefusal>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Link locker engine.
#[derive(Clone)]
pub struct LockerEngine {
    /// Backing store.
    store: SharedLockerStore,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Engine configuration.
    config: EngineConfig,
    /// Cooldown gate.
    gate: EligibilityGate,
    /// Revenue attribution.
    attribution: AttributionService,
}

impl LockerEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(store: SharedLockerStore, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let gate = EligibilityGate::new(config.cooldown_hours);
        let attribution =
            AttributionService::new(store.clone(), Arc::clone(&clock), config.reconciliation);
        Self {
            store,
            clock,
            config,
            gate,
            attribution,
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &SharedLockerStore {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Lists the offers a visitor may complete on a locker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown lockers.
    pub fn list_offers(
        &self,
        locker_id: &LockerId,
        visitor: &VisitorContext,
    ) -> Result<OfferList, EngineError> {
        let locker = self.load_locker(locker_id)?;
        let tasks = self.store.list_tasks()?;
        let slot_override = self.store.get_override(&visitor.override_key())?;
        let report = resolve_targeting(&tasks, visitor, &locker, slot_override.as_ref());
        let offers = report
            .included
            .iter()
            .map(|task| {
                let ad_url = resolve_ad_url(task, visitor, &locker, slot_override.as_ref());
                let rate = resolve_rate(task, visitor, slot_override.as_ref());
                Offer {
                    task_id: task.task_id.clone(),
                    title: task.title.clone(),
                    task_type: task.task_type.clone(),
                    completion_time_seconds: task.effective_completion_time_seconds(),
                    cpm: rate.cpm,
                    rate_source: rate.source,
                    ad_url_source: ad_url.source(),
                    dispatchable: ad_url.url().is_some(),
                }
            })
            .collect();
        Ok(OfferList {
            locker_id: locker.locker_id,
            offers,
            verdicts: report.verdicts,
        })
    }

    /// Dispatches a task: mints the click id and builds the outbound URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown lockers or tasks,
    /// [`EngineError::Forbidden`] when the task is not targeted at the
    /// visitor, and [`EngineError::Conflict`] when no usable ad URL resolves.
    pub fn dispatch(
        &self,
        locker_id: &LockerId,
        task_id: &TaskId,
        visitor: &VisitorContext,
    ) -> Result<Dispatch, EngineError> {
        let locker = self.load_locker(locker_id)?;
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
        let slot_override = self.store.get_override(&visitor.override_key())?;
        evaluate_task(&task, visitor, &locker, slot_override.as_ref()).map_err(|reason| {
            EngineError::Forbidden(format!("task {task_id} not targeted: {}", reason.as_str()))
        })?;
        let AdUrlResolution::Resolved {
            url,
            source,
        } = resolve_ad_url(&task, visitor, &locker, slot_override.as_ref())
        else {
            return Err(EngineError::Conflict(format!("task {task_id} has no ad url")));
        };
        let now = self.clock.now();
        let mut instance = TaskInstance::new(locker.locker_id.clone(), &task);
        let click_id = instance
            .dispatch(now)
            .map_err(|err| EngineError::Conflict(err.to_string()))?
            .clone();
        let ad_url = click_id
            .attach_to_url(&url, &self.config.click_param)
            .map_err(|err| EngineError::Conflict(err.to_string()))?;
        Ok(Dispatch {
            click_id: click_id.to_string(),
            ad_url,
            ad_url_source: source,
            completion_time_seconds: instance.completion_time_seconds(),
            dispatched_at: now,
            state: instance.state(),
        })
    }

    /// Runs the eligibility gate for one occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub fn check_eligibility(&self, key: &EligibilityKey) -> Result<GateDecision, EngineError> {
        Ok(self.gate.check(&self.store, key, self.clock.now())?)
    }

    /// Reports the cooldown status for a key without recording anything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub fn cooldown_status(&self, key: &EligibilityKey) -> Result<CooldownStatus, EngineError> {
        Ok(self.gate.status(&self.store, key, self.clock.now())?)
    }

    /// Records an analytics event, attributing revenue for counted completions.
    ///
    /// Attribution failures are captured in the receipt; the event is still stored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown lockers and
    /// [`EngineError::Store`] when the gate or the event write fails.
    pub fn record_analytics(
        &self,
        report: &AnalyticsReport,
        visitor: &VisitorContext,
    ) -> Result<AnalyticsReceipt, EngineError> {
        let locker = self.load_locker(&report.locker_id)?;
        let now = self.clock.now();
        let click_id = report.effective_click_id();
        let mut receipt = AnalyticsReceipt {
            event_id: RecordId::mint("evt"),
            counted: false,
            gate: None,
            gate_key: None,
            refusal: None,
            attribution: None,
            attribution_error: None,
        };
        let mut task_id = report.effective_task_id();
        match report.event_kind {
            EventKind::Visit | EventKind::Unlock => {
                let key = EligibilityKey::for_locker(
                    visitor.ip_address.clone(),
                    &locker.locker_id,
                    report.event_kind,
                );
                let decision = self.gate.check(&self.store, &key, now)?;
                receipt.counted = decision.should_count;
                receipt.gate = Some(decision);
                receipt.gate_key = Some(key);
            }
            EventKind::TaskComplete => {
                let check =
                self.check_completion(report, &locker, visitor, click_id.as_deref(), now)?;
                task_id = check.task_id.or(task_id);
                receipt.refusal = check.refusal;
                if receipt.refusal.is_none()
                    && let Some(task) = &check.task
                {
                    let completion = ClientCompletion {
                        locker: &locker,
                        task,
                        visitor,
                        click_id: click_id.as_deref(),
                    };
                    self.count_completion(&mut receipt, completion, now)?;
                }
            }
        }
        let event = AnalyticsEvent {
            id: receipt.event_id.clone(),
            locker_id: locker.locker_id.clone(),
            event_kind: report.event_kind,
            user_id: report.user_id.clone(),
            task_index: report.task_index,
            task_id,
            click_id,
            duration_seconds: report.duration_seconds,
            ip_address: visitor.ip_address.clone(),
            country: visitor.country_code.clone(),
            device: visitor.device,
            browser: visitor.browser,
            counted: receipt.counted,
            extra: report.extra.clone(),
            created_at: now,
        };
        self.store.record_analytics_event(&event)?;
        Ok(receipt)
    }

    /// Verifies a completion report before the gate.
    ///
    /// Targeting runs first: a task the visitor would not be offered is never
    /// counted.
    fn check_completion(
        &self,
        report: &AnalyticsReport,
        locker: &Locker,
        visitor: &VisitorContext,
        click_id: Option<&str>,
        now: Timestamp,
    ) -> Result<CompletionCheck, EngineError> {
        let refused = |refusal| CompletionCheck {
            task_id: None,
            task: None,
            refusal: Some(refusal),
        };
        let click = match click_id.map(ClickId::parse) {
            Some(Ok(click)) => Some(click),
            Some(Err(_)) => return Ok(refused(CompletionRefusal::MismatchedClick)),
            None => None,
        };
        let task_id =
            report.effective_task_id().or_else(|| click.as_ref().map(|c| c.task_id.clone()));
        let Some(task_id) = task_id else {
            return Ok(refused(CompletionRefusal::MissingTask));
        };
        let Some(task) = self.store.get_task(&task_id)? else {
            return Ok(CompletionCheck {
                task_id: Some(task_id),
                task: None,
                refusal: Some(CompletionRefusal::UnknownTask),
            });
        };
        let slot_override = self.store.get_override(&visitor.override_key())?;
        let refusal = evaluate_task(&task, visitor, locker, slot_override.as_ref())
            .err()
            .map(|excluded| CompletionRefusal::NotTargeted {
                excluded,
            })
            .or_else(|| Self::completion_refusal(report, locker, &task, click, now));
        Ok(CompletionCheck {
            task_id: Some(task_id),
            task: Some(task),
            refusal,
        })
    }

    /// Applies the click and dwell-time checks to a known task.
    fn completion_refusal(
        report: &AnalyticsReport,
        locker: &Locker,
        task: &Task,
        click: Option<ClickId>,
        now: Timestamp,
    ) -> Option<CompletionRefusal> {
        if let Some(click) = click {
            if click.locker_id != locker.locker_id || click.task_id != task.task_id {
                return Some(CompletionRefusal::MismatchedClick);
            }
            let mut instance = TaskInstance::resume(click, task);
            if let Err(CompletionError::TooEarly {
                remaining_millis,
            }) = instance.complete(now)
            {
                return Some(CompletionRefusal::TooEarly {
                    remaining_millis,
                });
            }
        }
        match report.duration_seconds {
            Some(duration) if duration < f64::from(task.effective_completion_time_seconds()) => {
                Some(CompletionRefusal::DurationTooShort)
            }
            _ => None,
        }
    }

    /// Gates a verified completion and attributes it when counted.
    fn count_completion(
        &self,
        receipt: &mut AnalyticsReceipt,
        completion: ClientCompletion<'_>,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let key = EligibilityKey::for_task(
            completion.visitor.ip_address.clone(),
            &completion.task.task_id,
        );
        let decision = self.gate.check(&self.store, &key, now)?;
        receipt.counted = decision.should_count;
        receipt.gate = Some(decision);
        receipt.gate_key = Some(key);
        if !decision.should_count {
            return Ok(());
        }
        match self.attribution.credit_client_completion(completion) {
            Ok(outcome) => receipt.attribution = Some(outcome),
            Err(err) => receipt.attribution_error = Some(err),
        }
        Ok(())
    }

    /// Processes a server-to-server postback.
    ///
    /// # Errors
    ///
    /// See [`AttributionService::process_postback`].
    pub fn process_postback(
        &self,
        params: BTreeMap<String, String>,
    ) -> Result<AttributionOutcome, EngineError> {
        self.attribution.process_postback(params)
    }

    /// Processes a tokenized webhook call.
    ///
    /// # Errors
    ///
    /// See [`AttributionService::process_webhook`].
    pub fn process_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<AttributionOutcome, EngineError> {
        self.attribution.process_webhook(request)
    }

    /// Validates and merges a bulk CPM upload for one device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing invalid rows; nothing is
    /// saved then.
    pub fn import_rates(
        &self,
        device: Device,
        rows: &[RateRow],
    ) -> Result<Vec<DeviceTargetingOverride>, EngineError> {
        let rates = validate_rows(rows).map_err(|err| EngineError::Validation(err.to_string()))?;
        let existing = self.store.list_overrides(Some(device))?;
        let merged = merge_rates(device, &existing, rates);
        self.store.save_overrides(&merged)?;
        Ok(merged)
    }

    /// Saves a batch of overrides atomically.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when an override carries a blank
    /// ad URL or a negative CPM.
    pub fn save_overrides(&self, overrides: &[DeviceTargetingOverride]) -> Result<(), EngineError> {
        for item in overrides {
            if item.ad_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
                return Err(EngineError::Validation(format!(
                    "override {}/{} has a blank ad url",
                    item.device.as_label(),
                    item.country_code
                )));
            }
            if item.cpm.as_ref().is_some_and(Money::is_negative) {
                return Err(EngineError::Validation(format!(
                    "override {}/{} has a negative cpm",
                    item.device.as_label(),
                    item.country_code
                )));
            }
        }
        Ok(self.store.save_overrides(overrides)?)
    }

    /// Summarizes a publisher's ledger.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub fn ledger_summary(&self, publisher_id: &PublisherId) -> Result<LedgerSummary, EngineError> {
        let events = self.store.list_revenue_events(publisher_id)?;
        let mut by_source: BTreeMap<String, Money> = BTreeMap::new();
        for event in &events {
            let total = by_source.entry(event.source.as_str().to_string()).or_default();
            *total = total.plus(&event.amount);
        }
        Ok(LedgerSummary {
            publisher_id: publisher_id.clone(),
            lifetime_revenue: Money::sum(events.iter().map(|event| &event.amount)),
            event_count: events.len(),
            balance: self.store.get_balance(publisher_id)?,
            by_source,
        })
    }

    /// Loads a locker or fails with not-found.
    fn load_locker(&self, locker_id: &LockerId) -> Result<Locker, EngineError> {
        self.store
            .get_locker(locker_id)?
            .ok_or_else(|| EngineError::NotFound(format!("locker {locker_id}")))
    }
}
