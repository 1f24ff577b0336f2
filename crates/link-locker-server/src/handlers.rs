// crates/link-locker-server/src/handlers.rs
// ============================================================================
// Module: Link Locker HTTP Handlers
// Description: Route handlers for offers, analytics, gating, and attribution.
// Purpose: Translate HTTP requests into engine calls and audit the outcomes.
// Dependencies: axum, link-locker-core, serde, url
// ============================================================================

//! ## Overview
//! Handlers extract request inputs, hand the synchronous engine work to
//! [`AppState::run_blocking`], and shape the response bodies partner
//! networks and browser clients expect. Webhooks answer plain-text `OK`.
//! Duplicates are answered as successes so callers do not retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use link_locker_core::AnalyticsReport;
use link_locker_core::AttributionOutcome;
use link_locker_core::CooldownStatus;
use link_locker_core::Device;
use link_locker_core::DeviceTargetingOverride;
use link_locker_core::Dispatch;
use link_locker_core::EligibilityKey;
use link_locker_core::EngineError;
use link_locker_core::EventKind;
use link_locker_core::GateReason;
use link_locker_core::LedgerSummary;
use link_locker_core::LockerId;
use link_locker_core::Money;
use link_locker_core::OfferList;
use link_locker_core::PublisherId;
use link_locker_core::RateRow;
use link_locker_core::RecordId;
use link_locker_core::TaskId;
use link_locker_core::WebhookRequest;
use link_locker_core::WebhookToken;
use link_locker_core::flatten_params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::audit::AuditEvent;
use crate::audit::AuditKind;
use crate::audit::outcome_label;
use crate::context::ClientInfo;
use crate::error::ApiError;
use crate::server::AppState;
use crate::server::FailureContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit label for requests the engine refused.
const REJECTED: &str = "rejected";
/// Webhook success body.
const WEBHOOK_OK: &str = "OK";

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct SuccessBody {
    /// Always true.
    pub success: bool,
}

impl SuccessBody {
    /// Builds the acknowledgement.
    const fn ok() -> Self {
        Self {
            success: true,
        }
    }
}

/// Eligibility check request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
    /// Task for `task_complete` checks.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Locker for `visit` and `unlock` checks.
    #[serde(default)]
    pub locker_id: Option<LockerId>,
    /// Gated event kind.
    #[serde(alias = "eventKind")]
    pub event_type: EventKind,
}

/// Eligibility check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    /// True when the occurrence counted.
    pub should_count: bool,
    /// Decision reason.
    pub reason: GateReason,
    /// Human-readable reason.
    pub message: &'static str,
    /// Occurrences in the current window.
    pub action_count: u64,
}

/// Cooldown status query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownQuery {
    /// Task for `task_complete` checks.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Locker for `visit` and `unlock` checks.
    #[serde(default)]
    pub locker_id: Option<LockerId>,
    /// Gated event kind; `task_complete` when absent.
    #[serde(default)]
    pub event_type: Option<EventKind>,
}

/// Postback response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostbackResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// True when the conversion was already attributed.
    pub duplicate: bool,
    /// True when a revenue row was appended.
    pub credited: bool,
    /// Credited amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    /// Appended ledger row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_event_id: Option<RecordId>,
}

impl PostbackResponse {
    /// Shapes a response from an attribution outcome.
    fn from_outcome(outcome: &AttributionOutcome) -> Self {
        let mut response = Self {
            success: true,
            duplicate: matches!(outcome, AttributionOutcome::Duplicate),
            credited: false,
            amount: None,
            revenue_event_id: None,
        };
        if let AttributionOutcome::Credited {
            event, ..
        } = outcome
        {
            response.credited = true;
            response.amount = Some(event.amount.clone());
            response.revenue_event_id = Some(event.id.clone());
        }
        response
    }
}

/// Bulk rate upload query.
#[derive(Debug, Deserialize)]
pub struct RatesQuery {
    /// Device the rates apply to.
    pub device: Device,
}

/// Bulk rate upload response.
#[derive(Debug, Serialize)]
pub struct RatesResponse {
    /// Always true.
    pub success: bool,
    /// Merged overrides for the device.
    pub overrides: Vec<DeviceTargetingOverride>,
}

/// Override save response.
#[derive(Debug, Serialize)]
pub struct OverridesResponse {
    /// Always true.
    pub success: bool,
    /// Number of saved overrides.
    pub saved: usize,
}

// ============================================================================
// SECTION: Offers
// ============================================================================

/// `GET /lockers/{lockerId}/tasks`
pub async fn list_offers(
    State(state): State<AppState>,
    client: ClientInfo,
    Path(locker_id): Path<String>,
) -> Result<Json<OfferList>, ApiError> {
    let locker_id = LockerId::new(locker_id);
    let offers = state
        .run_blocking(move |state| {
            let visitor = state.visitor(&client);
            Ok(state.engine().list_offers(&locker_id, &visitor)?)
        })
        .await?;
    Ok(Json(offers))
}

/// `POST /lockers/{lockerId}/tasks/{taskId}/dispatch`
pub async fn dispatch_task(
    State(state): State<AppState>,
    client: ClientInfo,
    Path((locker_id, task_id)): Path<(String, String)>,
) -> Result<Json<Dispatch>, ApiError> {
    let locker_id = LockerId::new(locker_id);
    let task_id = TaskId::new(task_id);
    let dispatch = state
        .run_blocking(move |state| {
            let visitor = state.visitor(&client);
            Ok(state.engine().dispatch(&locker_id, &task_id, &visitor)?)
        })
        .await?;
    Ok(Json(dispatch))
}

// ============================================================================
// SECTION: Analytics and Gating
// ============================================================================

/// `POST /analytics`
///
/// Answers `{success:true}` once the event is stored, even when attribution
/// failed; the failure is audited.
pub async fn record_analytics(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(report): Json<AnalyticsReport>,
) -> Result<Json<SuccessBody>, ApiError> {
    state
        .run_blocking(move |state| {
            let visitor = state.visitor(&client);
            let receipt = state.engine().record_analytics(&report, &visitor)?;
            if let (Some(key), Some(decision)) = (&receipt.gate_key, &receipt.gate) {
                state.audit().record(&AuditEvent::gate(key, decision));
            }
            if let Some(outcome) = &receipt.attribution {
                state.audit_credit(outcome);
            }
            if let Some(error) = &receipt.attribution_error {
                let ids = FailureContext {
                    locker_id: Some(report.locker_id.to_string()),
                    task_id: report.effective_task_id().map(|task_id| task_id.to_string()),
                    click_id: report.effective_click_id(),
                };
                state.audit_failure("client", ids, error);
            }
            Ok(())
        })
        .await?;
    Ok(Json(SuccessBody::ok()))
}

/// `POST /ip-tracking`
pub async fn check_eligibility(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(request): Json<EligibilityRequest>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    let key = eligibility_key(
        client.ip_address,
        request.task_id.as_ref(),
        request.locker_id.as_ref(),
        request.event_type,
    )?;
    let decision = state
        .run_blocking(move |state| {
            let decision = state.engine().check_eligibility(&key)?;
            state.audit().record(&AuditEvent::gate(&key, &decision));
            Ok(decision)
        })
        .await?;
    Ok(Json(EligibilityResponse {
        should_count: decision.should_count,
        reason: decision.reason,
        message: decision.reason.message(),
        action_count: decision.occurrence_count,
    }))
}

/// `GET /ip-tracking`
pub async fn cooldown_status(
    State(state): State<AppState>,
    client: ClientInfo,
    Query(query): Query<CooldownQuery>,
) -> Result<Json<CooldownStatus>, ApiError> {
    let key = eligibility_key(
        client.ip_address,
        query.task_id.as_ref(),
        query.locker_id.as_ref(),
        query.event_type.unwrap_or(EventKind::TaskComplete),
    )?;
    let status =
        state.run_blocking(move |state| Ok(state.engine().cooldown_status(&key)?)).await?;
    Ok(Json(status))
}

/// Builds the gate key for an event kind from the supplied identifiers.
fn eligibility_key(
    ip_address: String,
    task_id: Option<&TaskId>,
    locker_id: Option<&LockerId>,
    kind: EventKind,
) -> Result<EligibilityKey, ApiError> {
    let blank = |value: &str| value.trim().is_empty();
    match kind {
        EventKind::TaskComplete => task_id
            .filter(|task_id| !blank(task_id.as_str()))
            .map(|task_id| EligibilityKey::for_task(ip_address, task_id))
            .ok_or_else(|| validation("taskId is required for task_complete")),
        EventKind::Visit | EventKind::Unlock => locker_id
            .filter(|locker_id| !blank(locker_id.as_str()))
            .map(|locker_id| EligibilityKey::for_locker(ip_address, locker_id, kind))
            .ok_or_else(|| validation(&format!("lockerId is required for {kind}"))),
    }
}

/// Builds a validation error.
fn validation(message: &str) -> ApiError {
    ApiError::Engine(EngineError::Validation(message.to_string()))
}

// ============================================================================
// SECTION: Postbacks and Webhooks
// ============================================================================

/// `GET|POST /postback`
///
/// Query parameters and the body (JSON object or form) are merged; body
/// fields win on conflict.
pub async fn receive_postback(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PostbackResponse>, ApiError> {
    let params = postback_params(query.as_deref(), &headers, &body)?;
    let response = state
        .run_blocking(move |state| {
            let click_id = params.get("click_id").cloned();
            let task_id = params.get("task_id").cloned();
            let status = params.get("status").cloned();
            let locker_id = params.get("locker_id").cloned();
            let result = state.engine().process_postback(params);
            let outcome = result.as_ref().map_or(REJECTED, outcome_label);
            state.audit().record(&AuditEvent::new(AuditKind::PostbackReceived {
                click_id: click_id.clone(),
                task_id: task_id.clone(),
                status,
                outcome,
            }));
            match result {
                Ok(outcome) => {
                    state.audit_credit(&outcome);
                    Ok(PostbackResponse::from_outcome(&outcome))
                }
                Err(error) => {
                    let ids = FailureContext {
                        locker_id,
                        task_id,
                        click_id,
                    };
                    state.audit_failure("postback", ids, &error);
                    Err(error.into())
                }
            }
        })
        .await?;
    Ok(Json(response))
}

/// Merges query and body parameters of a postback.
fn postback_params(
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<BTreeMap<String, String>, ApiError> {
    let mut params: BTreeMap<String, String> = query
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(params);
    }
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("application/json"));
    if is_json {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| validation("postback body is not valid json"))?;
        let Value::Object(object) = value else {
            return Err(validation("postback body must be a json object"));
        };
        params.extend(flatten_params(&object));
    } else {
        params.extend(form_urlencoded::parse(body).into_owned());
    }
    Ok(params)
}

/// `GET|POST /tasks/webhooks/{token}`
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(mut request): Query<WebhookRequest>,
) -> Result<&'static str, ApiError> {
    request.token = token;
    state
        .run_blocking(move |state| {
            let decoded = WebhookToken::decode(&request.token).ok();
            let task_id = decoded.as_ref().map(|token| token.task_id.to_string());
            let result = state.engine().process_webhook(&request);
            state.audit().record(&AuditEvent::new(AuditKind::WebhookReceived {
                task_id: task_id.clone(),
                publisher_id: decoded.as_ref().map(|token| token.publisher_id.to_string()),
                sub_id: request.sub_id.clone(),
                outcome: result.as_ref().map_or(REJECTED, outcome_label),
            }));
            match result {
                Ok(outcome) => {
                    state.audit_credit(&outcome);
                    Ok(())
                }
                Err(error) => {
                    let ids = FailureContext {
                        locker_id: None,
                        task_id,
                        click_id: request.sub_id.clone(),
                    };
                    state.audit_failure("webhook", ids, &error);
                    Err(error.into())
                }
            }
        })
        .await?;
    Ok(WEBHOOK_OK)
}

// ============================================================================
// SECTION: Administration
// ============================================================================

/// `POST /rates/bulk?device=`
pub async fn import_rates(
    State(state): State<AppState>,
    Query(query): Query<RatesQuery>,
    Json(rows): Json<Vec<RateRow>>,
) -> Result<Json<RatesResponse>, ApiError> {
    let overrides = state
        .run_blocking(move |state| Ok(state.engine().import_rates(query.device, &rows)?))
        .await?;
    Ok(Json(RatesResponse {
        success: true,
        overrides,
    }))
}

/// `PUT /targeting/overrides`
pub async fn save_overrides(
    State(state): State<AppState>,
    Json(overrides): Json<Vec<DeviceTargetingOverride>>,
) -> Result<Json<OverridesResponse>, ApiError> {
    let saved = overrides.len();
    state.run_blocking(move |state| Ok(state.engine().save_overrides(&overrides)?)).await?;
    Ok(Json(OverridesResponse {
        success: true,
        saved,
    }))
}

/// `GET /publishers/{publisherId}/ledger`
pub async fn ledger_summary(
    State(state): State<AppState>,
    Path(publisher_id): Path<String>,
) -> Result<Json<LedgerSummary>, ApiError> {
    let publisher_id = PublisherId::new(publisher_id);
    let summary = state
        .run_blocking(move |state| Ok(state.engine().ledger_summary(&publisher_id)?))
        .await?;
    Ok(Json(summary))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
