// crates/link-locker-core/src/runtime/mod.rs
// ============================================================================
// Module: Link Locker Runtime
// Description: Targeting, resolution, gating, and attribution services.
// Purpose: Implement the engine components over the storage interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules are leaf-first: targeting and resolution are pure
//! functions, the completion state machine and gate sit on top of them, and
//! attribution plus the engine coordinate everything against a store.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod attribution;
pub mod balance;
pub mod completion;
pub mod engine;
pub mod gate;
pub mod geo;
pub mod rates;
pub mod resolver;
pub mod signature;
pub mod store;
pub mod targeting;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attribution::AttributionOutcome;
pub use attribution::AttributionService;
pub use attribution::ClientCompletion;
pub use attribution::ReconciliationPolicy;
pub use attribution::WebhookRequest;
pub use balance::BalanceCreditor;
pub use balance::CreditOutcome;
pub use balance::CreditStrategy;
pub use completion::ClickId;
pub use completion::ClickIdError;
pub use completion::CompletionError;
pub use completion::TaskInstance;
pub use completion::TaskState;
pub use engine::AnalyticsReceipt;
pub use engine::AnalyticsReport;
pub use engine::CompletionRefusal;
pub use engine::DEFAULT_CLICK_PARAM;
pub use engine::Dispatch;
pub use engine::EngineConfig;
pub use engine::EngineError;
pub use engine::LedgerSummary;
pub use engine::LockerEngine;
pub use engine::Offer;
pub use engine::OfferList;
pub use gate::DEFAULT_COOLDOWN_HOURS;
pub use gate::EligibilityGate;
pub use geo::StaticGeoResolver;
pub use geo::resolve_geo_or_default;
pub use rates::RateImportError;
pub use rates::RateRow;
pub use rates::RowError;
pub use rates::ValidRate;
pub use resolver::AdUrlResolution;
pub use resolver::AdUrlSource;
pub use resolver::RateResolution;
pub use resolver::RateSource;
pub use resolver::resolve_ad_url;
pub use resolver::resolve_rate;
pub use signature::SIGNATURE_PARAM;
pub use signature::sign_params;
pub use signature::verify_params;
pub use store::InMemoryLockerStore;
pub use store::SharedLockerStore;
pub use targeting::ExclusionReason;
pub use targeting::TargetingReport;
pub use targeting::TaskVerdict;
pub use targeting::evaluate_task;
pub use targeting::resolve_targeting;
pub use token::TokenError;
pub use token::WebhookToken;
