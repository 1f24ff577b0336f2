// crates/link-locker-core/src/runtime/attribution.rs
// ============================================================================
// Module: Link Locker Revenue Attribution
// Description: Client, postback, and webhook attribution paths.
// Purpose: Append at most one revenue row per conversion and credit balances.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Each path has its own idempotency key: `client:{click}` for client
//! completions, `(click_id, task_id)` for postbacks, and `(sub_id, task_id)`
//! for webhooks. The store enforces every key, so a lost race surfaces as
//! [`StoreError::Conflict`] and becomes [`AttributionOutcome::Duplicate`].
//!
//! The ledger append always happens before the balance credit. A failed
//! credit is reported in the outcome and never rolls the ledger row back.
//!
//! Security posture: postback parameters are untrusted. Signatures are
//! checked whenever the task carries a postback secret.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Clock;
use crate::core::Conversion;
use crate::core::CountryCode;
use crate::core::InboundPostback;
use crate::core::Locker;
use crate::core::LockerId;
use crate::core::Money;
use crate::core::PostbackEvent;
use crate::core::PostbackStatus;
use crate::core::RecordId;
use crate::core::RevenueEvent;
use crate::core::RevenueSource;
use crate::core::Task;
use crate::core::TaskId;
use crate::core::VisitorContext;
use crate::core::targeting::non_blank;
use crate::core::tier_for_country;
use crate::interfaces::CatalogStore;
use crate::interfaces::LedgerStore;
use crate::interfaces::StoreError;
use crate::runtime::balance::BalanceCreditor;
use crate::runtime::balance::CreditOutcome;
use crate::runtime::completion::ClickId;
use crate::runtime::engine::EngineError;
use crate::runtime::resolver::resolve_rate;
use crate::runtime::signature::verify_params;
use crate::runtime::store::SharedLockerStore;
use crate::runtime::token::WebhookToken;

// ============================================================================
// SECTION: Policy and Outcomes
// ============================================================================

/// How verified conversions interact with client-reported revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPolicy {
    /// Paths never look at each other.
    #[default]
    Independent,
    /// Verified revenue replaces client-reported revenue for the same click.
    VerifiedSupersedes,
}

/// Result of one attribution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionOutcome {
    /// A revenue row was appended.
    Credited {
        /// Appended ledger row.
        event: RevenueEvent,
        /// Balance update result.
        credit: CreditOutcome,
    },
    /// The notification was stored without revenue.
    Recorded {
        /// Reported status.
        status: PostbackStatus,
    },
    /// The conversion was already attributed.
    Duplicate,
    /// Verified revenue already covers this click.
    Superseded,
}

/// Client-reported completion that passed the gate.
#[derive(Debug, Clone, Copy)]
pub struct ClientCompletion<'a> {
    /// Locker the task was completed on.
    pub locker: &'a Locker,
    /// Completed task.
    pub task: &'a Task,
    /// Completing visitor.
    pub visitor: &'a VisitorContext,
    /// Click identifier minted at dispatch, when reported.
    pub click_id: Option<&'a str>,
}

/// Webhook call parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// Opaque path token.
    #[serde(default)]
    pub token: String,
    /// Click identifier echoed as `sub1`.
    #[serde(default, alias = "sub1")]
    pub sub_id: Option<String>,
    /// Reported payout.
    #[serde(default, alias = "payout_amount")]
    pub payout: Option<String>,
    /// Reported status; approved when absent.
    #[serde(default)]
    pub status: Option<String>,
    /// Converting visitor IP.
    #[serde(default)]
    pub conversion_ip: Option<String>,
}

// ============================================================================
// SECTION: Attribution Service
// ============================================================================

/// Revenue attribution and crediting service.
#[derive(Clone)]
pub struct AttributionService {
    /// Backing store.
    store: SharedLockerStore,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Cross-path reconciliation.
    policy: ReconciliationPolicy,
}

impl AttributionService {
    /// Creates an attribution service.
    #[must_use]
    pub fn new(
        store: SharedLockerStore,
        clock: Arc<dyn Clock>,
        policy: ReconciliationPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Returns the reconciliation policy.
    #[must_use]
    pub const fn policy(&self) -> ReconciliationPolicy {
        self.policy
    }

    /// Attributes a client-reported completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store fails.
    pub fn credit_client_completion(
        &self,
        completion: ClientCompletion<'_>,
    ) -> Result<AttributionOutcome, EngineError> {
        let visitor = completion.visitor;
        let slot_override = self.store.get_override(&visitor.override_key())?;
        let amount =
            resolve_rate(completion.task, visitor, slot_override.as_ref()).revenue_per_completion();
        let click_id = completion.click_id.and_then(|click| non_blank(Some(click)));
        if self.policy == ReconciliationPolicy::VerifiedSupersedes
            && let Some(click) = click_id
            && self.store.find_revenue_by_click(click)?.iter().any(|row| row.source.is_verified())
        {
            return Ok(AttributionOutcome::Superseded);
        }
        let event = RevenueEvent {
            id: RecordId::mint("rev"),
            publisher_id: completion.locker.user_id.clone(),
            locker_id: Some(completion.locker.locker_id.clone()),
            task_id: Some(completion.task.task_id.clone()),
            amount,
            country: Some(visitor.country_code.clone()),
            tier: Some(visitor.tier),
            source: RevenueSource::ClientReported,
            timestamp: self.clock.now(),
            click_id: click_id.map(str::to_string),
            dedup_key: click_id.map(|click| format!("client:{click}")),
            postback_id: None,
            conversion_id: None,
        };
        match self.store.append_revenue_event(&event) {
            Ok(()) => Ok(self.credit(event)),
            Err(StoreError::Conflict(_)) => Ok(AttributionOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    /// Processes a server-to-server postback.
    ///
    /// The postback is persisted before any check runs. The signature is
    /// verified before the duplicate check.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for unparseable or unattributable
    /// postbacks, [`EngineError::NotFound`] for unknown tasks, and
    /// [`EngineError::Unauthorized`] for missing or wrong signatures.
    pub fn process_postback(
        &self,
        params: BTreeMap<String, String>,
    ) -> Result<AttributionOutcome, EngineError> {
        let postback = InboundPostback::from_params(params)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        let task = self
            .store
            .get_task(&postback.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", postback.task_id)))?;
        let record = PostbackEvent {
            id: RecordId::mint("pb"),
            click_id: postback.click_id.clone(),
            task_id: postback.task_id.clone(),
            status: postback.status,
            payout: postback.payout.clone(),
            params: postback.raw.clone(),
            processed: false,
            received_at: self.clock.now(),
        };
        self.store.record_inbound_postback(&record)?;
        if let Some(secret) = task.configured_postback_secret() {
            let signature = postback
                .signature
                .as_deref()
                .ok_or_else(|| EngineError::Unauthorized("missing signature".to_string()))?;
            if !verify_params(secret, &postback.raw, signature) {
                return Err(EngineError::Unauthorized("signature mismatch".to_string()));
            }
        }
        if self.store.find_processed_postback(&postback.click_id, &postback.task_id)?.is_some() {
            return Ok(AttributionOutcome::Duplicate);
        }
        match postback.status {
            PostbackStatus::Pending => Ok(AttributionOutcome::Recorded {
                status: PostbackStatus::Pending,
            }),
            PostbackStatus::Rejected => match self.store.commit_postback(&record.id, None) {
                Ok(()) => Ok(AttributionOutcome::Recorded {
                    status: PostbackStatus::Rejected,
                }),
                Err(StoreError::Conflict(_)) => Ok(AttributionOutcome::Duplicate),
                Err(err) => Err(err.into()),
            },
            PostbackStatus::Approved => self.credit_postback(&task, &postback, &record),
        }
    }

    /// Appends and credits an approved postback.
    fn credit_postback(
        &self,
        task: &Task,
        postback: &InboundPostback,
        record: &PostbackEvent,
    ) -> Result<AttributionOutcome, EngineError> {
        let locker_id = postback
            .locker_id
            .clone()
            .or_else(|| click_locker(&postback.click_id));
        let locker = match &locker_id {
            Some(locker_id) => self.store.get_locker(locker_id)?,
            None => None,
        };
        let publisher_id = locker
            .as_ref()
            .map(|locker| locker.user_id.clone())
            .or_else(|| postback.user_id.clone())
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "unattributed postback for click {}",
                    postback.click_id
                ))
            })?;
        let payout = postback.payout.clone().unwrap_or_else(|| task.cpm_tier1.per_mille());
        let amount = self.reconcile(&postback.click_id, payout)?;
        let country = ["country", "country_code"]
            .iter()
            .find_map(|field| postback.extra.get(*field))
            .and_then(|value| CountryCode::parse(value).ok());
        let tier = country.as_ref().map(tier_for_country);
        let event = RevenueEvent {
            id: RecordId::mint("rev"),
            publisher_id,
            locker_id,
            task_id: Some(task.task_id.clone()),
            amount,
            country,
            tier,
            source: RevenueSource::PostbackVerified,
            timestamp: self.clock.now(),
            click_id: Some(postback.click_id.clone()),
            dedup_key: Some(postback.dedup_key()),
            postback_id: Some(record.id.clone()),
            conversion_id: None,
        };
        match self.store.commit_postback(&record.id, Some(&event)) {
            Ok(()) => Ok(self.credit(event)),
            Err(StoreError::Conflict(_)) => Ok(AttributionOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    /// Processes a tokenized webhook call.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for undecodable tokens,
    /// [`EngineError::Validation`] for a missing `sub1` or bad payout, and
    /// [`EngineError::NotFound`] for unknown tasks.
    pub fn process_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<AttributionOutcome, EngineError> {
        let token = WebhookToken::decode(&request.token)
            .map_err(|err| EngineError::Unauthorized(err.to_string()))?;
        let sub_id = non_blank(request.sub_id.as_deref())
            .ok_or_else(|| EngineError::Validation("sub1 is required".to_string()))?;
        let task = self
            .store
            .get_task(&token.task_id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", token.task_id)))?;
        let status = match non_blank(request.status.as_deref()) {
            None => PostbackStatus::Approved,
            Some(raw) => PostbackStatus::parse(raw)
                .ok_or_else(|| EngineError::Validation(format!("invalid status: {raw}")))?,
        };
        if status != PostbackStatus::Approved {
            return Ok(AttributionOutcome::Recorded {
                status,
            });
        }
        let payout = match non_blank(request.payout.as_deref()) {
            Some(raw) => Money::parse_non_negative(raw)
                .map_err(|err| EngineError::Validation(err.to_string()))?,
            None => task.cpm_tier1.per_mille(),
        };
        if self.store.find_conversion(sub_id, &task.task_id)?.is_some() {
            return Ok(AttributionOutcome::Duplicate);
        }
        let amount = self.reconcile(sub_id, payout.clone())?;
        let now = self.clock.now();
        let conversion = Conversion {
            id: RecordId::mint("conv"),
            task_id: task.task_id.clone(),
            publisher_id: token.publisher_id.clone(),
            sub_id: sub_id.to_string(),
            payout,
            status,
            conversion_ip: non_blank(request.conversion_ip.as_deref()).map(str::to_string),
            created_at: now,
        };
        let event = RevenueEvent {
            id: RecordId::mint("rev"),
            publisher_id: token.publisher_id,
            locker_id: click_locker(sub_id),
            task_id: Some(task.task_id.clone()),
            amount,
            country: None,
            tier: None,
            source: RevenueSource::Webhook,
            timestamp: now,
            click_id: Some(sub_id.to_string()),
            dedup_key: Some(webhook_dedup_key(sub_id, &task.task_id)),
            postback_id: None,
            conversion_id: Some(conversion.id.clone()),
        };
        match self.store.commit_conversion(&conversion, &event) {
            Ok(()) => Ok(self.credit(event)),
            Err(StoreError::Conflict(_)) => Ok(AttributionOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    /// Applies the reconciliation policy to a verified amount.
    fn reconcile(&self, click_id: &str, amount: Money) -> Result<Money, EngineError> {
        if self.policy == ReconciliationPolicy::Independent {
            return Ok(amount);
        }
        let existing = self.store.find_revenue_by_click(click_id)?;
        let already = Money::sum(existing.iter().map(|row| &row.amount));
        Ok(amount.minus_floor_zero(&already))
    }

    /// Credits the balance for an appended row.
    fn credit(&self, event: RevenueEvent) -> AttributionOutcome {
        let credit = BalanceCreditor::credit(&self.store, &event.publisher_id, &event.amount);
        AttributionOutcome::Credited {
            event,
            credit,
        }
    }
}

/// Returns the ledger dedup key for a webhook conversion.
fn webhook_dedup_key(sub_id: &str, task_id: &TaskId) -> String {
    format!("webhook:{sub_id}:{task_id}")
}

/// Returns the locker embedded in a click identifier, if decodable.
fn click_locker(click_id: &str) -> Option<LockerId> {
    ClickId::parse(click_id).ok().map(|click| click.locker_id)
}

