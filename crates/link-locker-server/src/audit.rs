// crates/link-locker-server/src/audit.rs
// ============================================================================
// Module: Link Locker Audit Logging
// Description: Structured audit events for request handling and crediting.
// Purpose: Emit JSON-line audit records without a global logger.
// Dependencies: link-locker-core, serde
// ============================================================================

//! ## Overview
//! Every audit record is one JSON object per line carrying `event`,
//! `timestamp_ms`, and event-specific fields. Sinks are pluggable so
//! deployments can route records to their own pipeline. Postback secrets and
//! signatures never appear in a record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use link_locker_core::AttributionOutcome;
use link_locker_core::CreditOutcome;
use link_locker_core::CreditStrategy;
use link_locker_core::EligibilityKey;
use link_locker_core::EventKind;
use link_locker_core::GateDecision;
use link_locker_core::GateReason;
use link_locker_core::Money;
use link_locker_core::PublisherId;
use link_locker_core::RecordId;
use link_locker_core::RevenueSource;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit record envelope.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event payload, tagged by `event`.
    #[serde(flatten)]
    pub kind: AuditKind,
}

/// Event-specific audit payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditKind {
    /// One handled HTTP request.
    HttpRequest {
        /// HTTP method.
        method: String,
        /// Matched route template.
        route: String,
        /// Response status code.
        status: u16,
        /// Resolved client IP.
        client_ip: String,
        /// Handler latency in milliseconds.
        latency_ms: u128,
    },
    /// Eligibility gate consultation.
    GateDecision {
        /// Visitor IP.
        ip_address: String,
        /// Locker or task id.
        target_entity_id: String,
        /// Gated event kind.
        event_kind: EventKind,
        /// Whether the occurrence counted.
        should_count: bool,
        /// Decision reason.
        reason: GateReason,
        /// Occurrences in the current window.
        occurrence_count: u64,
    },
    /// A revenue row was appended.
    RevenueCredited {
        /// Credited publisher.
        publisher_id: PublisherId,
        /// Credited amount.
        amount: Money,
        /// Attribution channel.
        source: RevenueSource,
        /// Ledger row id.
        revenue_event_id: RecordId,
        /// Balance strategy that ran, when the balance was updated.
        strategy: Option<CreditStrategy>,
    },
    /// The ledger row committed but the balance update failed.
    BalanceCreditFailed {
        /// Publisher whose balance is stale.
        publisher_id: PublisherId,
        /// Amount missing from the balance.
        amount: Money,
        /// Ledger row to reconcile from.
        revenue_event_id: RecordId,
        /// Store error.
        error: String,
    },
    /// Attribution failed and was caught at the handler boundary.
    AttributionFailed {
        /// Entry channel (`client`, `postback`, `webhook`).
        channel: &'static str,
        /// Locker, when known.
        locker_id: Option<String>,
        /// Task, when known.
        task_id: Option<String>,
        /// Click or sub id, when known.
        click_id: Option<String>,
        /// Error text.
        error: String,
    },
    /// A postback arrived.
    PostbackReceived {
        /// Reported click id.
        click_id: Option<String>,
        /// Reported task id.
        task_id: Option<String>,
        /// Reported status.
        status: Option<String>,
        /// Processing outcome label.
        outcome: &'static str,
    },
    /// A webhook call arrived.
    WebhookReceived {
        /// Task decoded from the token.
        task_id: Option<String>,
        /// Publisher decoded from the token.
        publisher_id: Option<String>,
        /// Reported sub id.
        sub_id: Option<String>,
        /// Processing outcome label.
        outcome: &'static str,
    },
    /// Geolocation failed and defaults were used.
    GeoFallback {
        /// Visitor IP.
        ip_address: String,
        /// Lookup error.
        error: String,
    },
}

impl AuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(kind: AuditKind) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            timestamp_ms,
            kind,
        }
    }

    /// Builds a gate decision event.
    #[must_use]
    pub fn gate(key: &EligibilityKey, decision: &GateDecision) -> Self {
        Self::new(AuditKind::GateDecision {
            ip_address: key.ip_address.clone(),
            target_entity_id: key.target_entity_id.clone(),
            event_kind: key.event_kind,
            should_count: decision.should_count,
            reason: decision.reason,
            occurrence_count: decision.occurrence_count,
        })
    }

    /// Builds the crediting events for an attribution outcome.
    ///
    /// Returns nothing unless a revenue row was appended.
    #[must_use]
    pub fn credit_events(outcome: &AttributionOutcome) -> Vec<Self> {
        let AttributionOutcome::Credited {
            event,
            credit,
        } = outcome
        else {
            return Vec::new();
        };
        let strategy = match credit {
            CreditOutcome::Credited {
                strategy, ..
            } => Some(*strategy),
            CreditOutcome::Failed {
                ..
            } => None,
        };
        let mut events = vec![Self::new(AuditKind::RevenueCredited {
            publisher_id: event.publisher_id.clone(),
            amount: event.amount.clone(),
            source: event.source,
            revenue_event_id: event.id.clone(),
            strategy,
        })];
        if let CreditOutcome::Failed {
            error,
        } = credit
        {
            events.push(Self::new(AuditKind::BalanceCreditFailed {
                publisher_id: event.publisher_id.clone(),
                amount: event.amount.clone(),
                revenue_event_id: event.id.clone(),
                error: error.to_string(),
            }));
        }
        events
    }
}

/// Returns the stable label for an attribution outcome.
#[must_use]
pub const fn outcome_label(outcome: &AttributionOutcome) -> &'static str {
    match outcome {
        AttributionOutcome::Credited {
            ..
        } => "credited",
        AttributionOutcome::Recorded {
            ..
        } => "recorded",
        AttributionOutcome::Duplicate => "duplicate",
        AttributionOutcome::Superseded => "superseded",
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for link locker events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// In-memory sink that keeps serialized records, for tests and replay tools.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Captured JSON records.
    records: Mutex<Vec<serde_json::Value>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns captured records.
    #[must_use]
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().map_or_else(|_| Vec::new(), |records| records.clone())
    }

    /// Returns captured records with the given `event` label.
    #[must_use]
    pub fn records_named(&self, event: &str) -> Vec<serde_json::Value> {
        self.records()
            .into_iter()
            .filter(|record| record.get("event").and_then(serde_json::Value::as_str) == Some(event))
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(value) = serde_json::to_value(event)
            && let Ok(mut records) = self.records.lock()
        {
            records.push(value);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use link_locker_core::RevenueEvent;
    use link_locker_core::StoreError;
    use link_locker_core::Timestamp;

    use super::*;

    fn revenue_event() -> RevenueEvent {
        RevenueEvent {
            id: RecordId::new("rev-1"),
            publisher_id: PublisherId::new("pub-1"),
            locker_id: None,
            task_id: None,
            amount: Money::parse("0.0045").unwrap(),
            country: None,
            tier: None,
            source: RevenueSource::ClientReported,
            timestamp: Timestamp::from_unix_millis(0),
            click_id: None,
            dedup_key: None,
            postback_id: None,
            conversion_id: None,
        }
    }

    #[test]
    fn records_are_flat_objects_tagged_by_event() {
        let event = AuditEvent::new(AuditKind::GeoFallback {
            ip_address: "192.0.2.1".to_string(),
            error: "timeout".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "geo_fallback");
        assert_eq!(value["ip_address"], "192.0.2.1");
        assert!(value["timestamp_ms"].as_u64().unwrap() > 0);
    }

    #[test]
    fn failed_balance_credit_emits_both_events() {
        let outcome = AttributionOutcome::Credited {
            event: revenue_event(),
            credit: CreditOutcome::Failed {
                error: StoreError::Store("down".to_string()),
            },
        };
        let sink = MemoryAuditSink::new();
        for event in AuditEvent::credit_events(&outcome) {
            sink.record(&event);
        }
        let credited = sink.records_named("revenue_credited");
        assert_eq!(credited.len(), 1);
        assert!(credited[0]["strategy"].is_null());
        assert_eq!(sink.records_named("balance_credit_failed").len(), 1);
    }

    #[test]
    fn non_credit_outcomes_emit_nothing() {
        assert!(AuditEvent::credit_events(&AttributionOutcome::Duplicate).is_empty());
        assert_eq!(outcome_label(&AttributionOutcome::Superseded), "superseded");
    }
}
