// crates/link-locker-core/src/core/ledger.rs
// ============================================================================
// Module: Link Locker Ledger Records
// Description: Revenue events, inbound postbacks, conversions, analytics rows.
// Purpose: Model the durable, append-mostly records written by attribution.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`RevenueEvent`] rows are immutable once appended; the sum over a
//! publisher's rows is their lifetime revenue. Inbound postbacks are parsed
//! into known fields plus an explicit `extra` bag, and the verbatim parameter
//! map is kept alongside so a postback can be replayed or audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::eligibility::EventKind;
use crate::core::identifiers::LockerId;
use crate::core::identifiers::PublisherId;
use crate::core::identifiers::RecordId;
use crate::core::identifiers::TaskId;
use crate::core::money::Money;
use crate::core::targeting::Browser;
use crate::core::targeting::CountryCode;
use crate::core::targeting::Device;
use crate::core::targeting::Tier;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Revenue Events
// ============================================================================

/// Channel a revenue event was attributed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevenueSource {
    /// Completion reported by the visitor's browser.
    ClientReported,
    /// Server-to-server postback from the ad network.
    PostbackVerified,
    /// Tokenized per-publisher webhook.
    Webhook,
}

impl RevenueSource {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientReported => "client-reported",
            Self::PostbackVerified => "postback-verified",
            Self::Webhook => "webhook",
        }
    }

    /// Returns true for channels confirmed by the ad network.
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::PostbackVerified | Self::Webhook)
    }
}

impl fmt::Display for RevenueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger row for one credited conversion.
///
/// # Invariants
/// - `dedup_key`, when present, is unique across the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEvent {
    /// Ledger row identifier.
    pub id: RecordId,
    /// Credited publisher.
    pub publisher_id: PublisherId,
    /// Locker the conversion came through.
    pub locker_id: Option<LockerId>,
    /// Completed task.
    pub task_id: Option<TaskId>,
    /// Credited amount.
    pub amount: Money,
    /// Visitor country.
    pub country: Option<CountryCode>,
    /// Visitor tier.
    pub tier: Option<Tier>,
    /// Attribution channel.
    pub source: RevenueSource,
    /// Append time.
    pub timestamp: Timestamp,
    /// Click identifier minted at dispatch, when known.
    pub click_id: Option<String>,
    /// Channel-specific idempotency key.
    pub dedup_key: Option<String>,
    /// Originating postback.
    pub postback_id: Option<RecordId>,
    /// Originating webhook conversion.
    pub conversion_id: Option<RecordId>,
}

// ============================================================================
// SECTION: Postbacks
// ============================================================================

/// Conversion status reported by the ad network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostbackStatus {
    /// Conversion confirmed; credit the publisher.
    Approved,
    /// Conversion refused; record without credit.
    Rejected,
    /// Conversion not yet decided.
    Pending,
}

impl PostbackStatus {
    /// Parses a status label case-insensitively.
    ///
    /// Networks use several spellings; `1`/`0` are the numeric forms of
    /// approved/rejected.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" | "success" | "completed" | "1" => Some(Self::Approved),
            "rejected" | "reject" | "declined" | "reversed" | "0" => Some(Self::Rejected),
            "pending" | "hold" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for PostbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while parsing an inbound postback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostbackParseError {
    /// Required field is missing or empty.
    #[error("missing required field: {0}")]
    Missing(&'static str),
    /// Field value is malformed.
    #[error("invalid {field}: {value}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Parameter names with typed meaning.
const KNOWN_POSTBACK_FIELDS: &[&str] =
    &["click_id", "task_id", "status", "payout", "signature", "locker_id", "user_id"];

/// Inbound postback split into known fields and an `extra` bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPostback {
    /// Click identifier.
    pub click_id: String,
    /// Task identifier.
    pub task_id: TaskId,
    /// Conversion status.
    pub status: PostbackStatus,
    /// Reported payout.
    pub payout: Option<Money>,
    /// Hex HMAC-SHA256 signature.
    pub signature: Option<String>,
    /// Explicit locker reference.
    pub locker_id: Option<LockerId>,
    /// Explicit publisher reference.
    pub user_id: Option<PublisherId>,
    /// Parameters this engine does not interpret.
    pub extra: BTreeMap<String, String>,
    /// Every parameter exactly as received.
    pub raw: BTreeMap<String, String>,
}

impl InboundPostback {
    /// Parses a flat parameter map.
    ///
    /// # Errors
    ///
    /// Returns [`PostbackParseError`] when a required field is missing or a
    /// typed field is malformed.
    pub fn from_params(raw: BTreeMap<String, String>) -> Result<Self, PostbackParseError> {
        let field = |name: &str| raw.get(name).map(|value| value.trim()).filter(|v| !v.is_empty());
        let click_id = field("click_id").ok_or(PostbackParseError::Missing("click_id"))?;
        let task_id = field("task_id").ok_or(PostbackParseError::Missing("task_id"))?;
        let status_raw = field("status").ok_or(PostbackParseError::Missing("status"))?;
        let status = PostbackStatus::parse(status_raw).ok_or_else(|| PostbackParseError::Invalid {
            field: "status",
            value: status_raw.to_string(),
        })?;
        let payout = field("payout")
            .map(|value| {
                Money::parse_non_negative(value).map_err(|_| PostbackParseError::Invalid {
                    field: "payout",
                    value: value.to_string(),
                })
            })
            .transpose()?;
        let extra = raw
            .iter()
            .filter(|(key, _)| !KNOWN_POSTBACK_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self {
            click_id: click_id.to_string(),
            task_id: TaskId::new(task_id),
            status,
            payout,
            signature: field("signature").map(str::to_string),
            locker_id: field("locker_id").map(LockerId::new),
            user_id: field("user_id").map(PublisherId::new),
            extra,
            raw,
        })
    }

    /// Returns the idempotency key for this postback.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("postback:{}:{}", self.click_id, self.task_id)
    }
}

/// Flattens a JSON object into string parameters.
///
/// Strings are taken verbatim, numbers and booleans use their JSON text,
/// nested values are compact JSON, and nulls are dropped.
#[must_use]
pub fn flatten_params(object: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

/// Persisted inbound postback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostbackEvent {
    /// Record identifier.
    pub id: RecordId,
    /// Click identifier.
    pub click_id: String,
    /// Task identifier.
    pub task_id: TaskId,
    /// Reported status.
    pub status: PostbackStatus,
    /// Reported payout.
    pub payout: Option<Money>,
    /// Verbatim parameters, unknown fields included.
    pub params: BTreeMap<String, String>,
    /// True once the postback reached a final outcome.
    pub processed: bool,
    /// Receive time.
    pub received_at: Timestamp,
}

// ============================================================================
// SECTION: Webhook Conversions
// ============================================================================

/// Recorded webhook conversion.
///
/// # Invariants
/// - `(sub_id, task_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    /// Record identifier.
    pub id: RecordId,
    /// Converted task.
    pub task_id: TaskId,
    /// Credited publisher.
    pub publisher_id: PublisherId,
    /// Click identifier echoed back by the network.
    pub sub_id: String,
    /// Credited payout.
    pub payout: Money,
    /// Conversion status.
    pub status: PostbackStatus,
    /// Converting visitor IP reported by the network.
    pub conversion_ip: Option<String>,
    /// Record time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Analytics
// ============================================================================

/// Stored analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Record identifier.
    pub id: RecordId,
    /// Locker the event belongs to.
    pub locker_id: LockerId,
    /// Event kind.
    pub event_kind: EventKind,
    /// Publisher reported by the client.
    pub user_id: Option<PublisherId>,
    /// Position of the task in the offer list.
    pub task_index: Option<u32>,
    /// Completed task.
    pub task_id: Option<TaskId>,
    /// Click identifier for completions.
    pub click_id: Option<String>,
    /// Client-reported dwell time, in seconds.
    pub duration_seconds: Option<f64>,
    /// Visitor IP.
    pub ip_address: String,
    /// Visitor country.
    pub country: CountryCode,
    /// Visitor device.
    pub device: Device,
    /// Visitor browser.
    pub browser: Browser,
    /// True when the gate allowed the event to count.
    pub counted: bool,
    /// Client extras, stored verbatim.
    pub extra: Value,
    /// Record time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
