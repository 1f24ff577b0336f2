// crates/link-locker-core/src/core/mod.rs
// ============================================================================
// Module: Link Locker Core Types
// Description: Canonical catalog, visitor, eligibility, and ledger structures.
// Purpose: Provide stable, serializable types shared by every surface.
// Dependencies: serde, bigdecimal, time
// ============================================================================

//! ## Overview
//! Core types describe tasks, lockers, device targeting overrides, the
//! ephemeral visitor context, eligibility records, and the append-only
//! revenue ledger. These types are the canonical source of truth for the
//! HTTP surface and the storage backends.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalog;
pub mod eligibility;
pub mod identifiers;
pub mod ledger;
pub mod money;
pub mod targeting;
pub mod time;
pub mod visitor;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::AdUrlMode;
pub use catalog::Locker;
pub use catalog::MAX_COMPLETION_TIME_SECONDS;
pub use catalog::MIN_COMPLETION_TIME_SECONDS;
pub use catalog::Task;
pub use catalog::TaskStatus;
pub use catalog::TaskType;
pub use eligibility::CooldownReason;
pub use eligibility::CooldownStatus;
pub use eligibility::EligibilityKey;
pub use eligibility::EligibilityRecord;
pub use eligibility::EventKind;
pub use eligibility::GateDecision;
pub use eligibility::GateReason;
pub use identifiers::LockerId;
pub use identifiers::PublisherId;
pub use identifiers::RecordId;
pub use identifiers::TaskId;
pub use ledger::AnalyticsEvent;
pub use ledger::Conversion;
pub use ledger::InboundPostback;
pub use ledger::PostbackParseError;
pub use ledger::PostbackEvent;
pub use ledger::PostbackStatus;
pub use ledger::RevenueEvent;
pub use ledger::RevenueSource;
pub use ledger::flatten_params;
pub use money::Money;
pub use money::MoneyError;
pub use targeting::Browser;
pub use targeting::CountryCode;
pub use targeting::CountryCodeError;
pub use targeting::Device;
pub use targeting::DeviceTargetingOverride;
pub use targeting::Label;
pub use targeting::OverrideKey;
pub use targeting::Tier;
pub use time::Clock;
pub use time::FixedClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use visitor::GeoInfo;
pub use visitor::VisitorContext;
pub use visitor::classify_user_agent;
pub use visitor::tier_for_country;
