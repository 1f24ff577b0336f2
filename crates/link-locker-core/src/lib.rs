// crates/link-locker-core/src/lib.rs
// ============================================================================
// Module: Link Locker Core Library
// Description: Public API surface for the link locker engine.
// Purpose: Expose domain types, storage interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Link locker core decides which vendor tasks a visitor may complete,
//! resolves the outbound ad URL and CPM rate for each task, gates repeat
//! occurrences behind a cooldown window, and credits publishers exactly once
//! per eligible conversion across the client, postback, and webhook channels.
//! It is storage-agnostic and integrates through the traits in
//! [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AnalyticsStore;
pub use interfaces::BalanceStore;
pub use interfaces::CatalogStore;
pub use interfaces::EligibilityStore;
pub use interfaces::GeoError;
pub use interfaces::GeoResolver;
pub use interfaces::LedgerStore;
pub use interfaces::LockerStore;
pub use interfaces::StoreError;
pub use runtime::AnalyticsReceipt;
pub use runtime::AnalyticsReport;
pub use runtime::AttributionOutcome;
pub use runtime::AttributionService;
pub use runtime::BalanceCreditor;
pub use runtime::ClickId;
pub use runtime::CompletionRefusal;
pub use runtime::CreditOutcome;
pub use runtime::CreditStrategy;
pub use runtime::Dispatch;
pub use runtime::EligibilityGate;
pub use runtime::EngineConfig;
pub use runtime::EngineError;
pub use runtime::InMemoryLockerStore;
pub use runtime::LedgerSummary;
pub use runtime::LockerEngine;
pub use runtime::Offer;
pub use runtime::OfferList;
pub use runtime::RateRow;
pub use runtime::ReconciliationPolicy;
pub use runtime::SharedLockerStore;
pub use runtime::StaticGeoResolver;
pub use runtime::TaskInstance;
pub use runtime::TaskState;
pub use runtime::WebhookRequest;
pub use runtime::WebhookToken;
