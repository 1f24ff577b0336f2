// crates/link-locker-core/src/interfaces/mod.rs
// ============================================================================
// Module: Link Locker Interfaces
// Description: Backend-agnostic storage and geolocation interfaces.
// Purpose: Define the contract surfaces used by the link locker runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine reaches its external collaborators: the
//! relational datastore and the geolocation lookup. Stores must enforce the
//! uniqueness constraints documented on each method and report a lost insert
//! race as [`StoreError::Conflict`]; the runtime maps that to a duplicate
//! outcome rather than a failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AnalyticsEvent;
use crate::core::Conversion;
use crate::core::Device;
use crate::core::DeviceTargetingOverride;
use crate::core::EligibilityKey;
use crate::core::EligibilityRecord;
use crate::core::GeoInfo;
use crate::core::Locker;
use crate::core::LockerId;
use crate::core::Money;
use crate::core::OverrideKey;
use crate::core::PostbackEvent;
use crate::core::PublisherId;
use crate::core::RecordId;
use crate::core::RevenueEvent;
use crate::core::Task;
use crate::core::TaskId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage errors shared by every store interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
    /// A uniqueness constraint rejected the write.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Stored data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("store record not found: {0}")]
    NotFound(String),
    /// The backend does not provide the requested primitive.
    #[error("store operation unsupported: {0}")]
    Unsupported(String),
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Task, locker, and targeting override storage.
pub trait CatalogStore {
    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Lists every task in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Inserts or replaces a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn put_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Loads a locker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_locker(&self, locker_id: &LockerId) -> Result<Option<Locker>, StoreError>;

    /// Inserts or replaces a locker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn put_locker(&self, locker: &Locker) -> Result<(), StoreError>;

    /// Loads the override for a `(device, country)` slot; `None` means no override.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_override(
        &self,
        key: &OverrideKey,
    ) -> Result<Option<DeviceTargetingOverride>, StoreError>;

    /// Lists overrides, optionally for one device.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_overrides(
        &self,
        device: Option<Device>,
    ) -> Result<Vec<DeviceTargetingOverride>, StoreError>;

    /// Upserts a batch of overrides atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails; no override is written then.
    fn save_overrides(&self, overrides: &[DeviceTargetingOverride]) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Eligibility
// ============================================================================

/// Eligibility record storage.
///
/// # Invariants
/// - At most one record exists per [`EligibilityKey`].
pub trait EligibilityStore {
    /// Loads the record for a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_eligibility(&self, key: &EligibilityKey)
    -> Result<Option<EligibilityRecord>, StoreError>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a record already exists for the key.
    fn insert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError>;

    /// Increments the count and stamps `last_occurrence_at`, returning the new count.
    ///
    /// Returns `None` when no record exists for the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn record_repeat(
        &self,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<Option<u64>, StoreError>;

    /// Restarts the window when `first_occurrence_at` still equals `expected_first`.
    ///
    /// Returns false when another writer reset the record first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn reset_eligibility(
        &self,
        key: &EligibilityKey,
        expected_first: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Postback, conversion, and revenue ledger storage.
///
/// # Invariants
/// - At most one processed postback per `(click_id, task_id)`.
/// - At most one conversion per `(sub_id, task_id)`.
/// - Revenue `dedup_key` values are unique; revenue rows are never updated.
pub trait LedgerStore {
    /// Persists an inbound postback verbatim before any processing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn record_inbound_postback(&self, postback: &PostbackEvent) -> Result<(), StoreError>;

    /// Finds the processed postback for `(click_id, task_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_processed_postback(
        &self,
        click_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<PostbackEvent>, StoreError>;

    /// Marks a stored postback processed and appends its revenue row in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when another postback for the same
    /// `(click_id, task_id)` is already processed or the revenue dedup key exists.
    fn commit_postback(
        &self,
        postback_id: &RecordId,
        revenue: Option<&RevenueEvent>,
    ) -> Result<(), StoreError>;

    /// Finds the conversion for `(sub_id, task_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_conversion(
        &self,
        sub_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<Conversion>, StoreError>;

    /// Records a conversion and its revenue row in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `(sub_id, task_id)` already exists.
    fn commit_conversion(
        &self,
        conversion: &Conversion,
        revenue: &RevenueEvent,
    ) -> Result<(), StoreError>;

    /// Appends a revenue row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the dedup key already exists.
    fn append_revenue_event(&self, event: &RevenueEvent) -> Result<(), StoreError>;

    /// Lists a publisher's revenue rows in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_revenue_events(&self, publisher_id: &PublisherId)
    -> Result<Vec<RevenueEvent>, StoreError>;

    /// Lists revenue rows carrying a click identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_revenue_by_click(&self, click_id: &str) -> Result<Vec<RevenueEvent>, StoreError>;
}

// ============================================================================
// SECTION: Balances
// ============================================================================

/// Publisher balance storage.
pub trait BalanceStore {
    /// Atomically adds `amount` and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unsupported`] when the backend has no atomic
    /// increment; callers then fall back to read-modify-write.
    fn increment_balance(
        &self,
        publisher_id: &PublisherId,
        amount: &Money,
    ) -> Result<Money, StoreError>;

    /// Reads the current balance (zero for unknown publishers).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_balance(&self, publisher_id: &PublisherId) -> Result<Money, StoreError>;

    /// Overwrites the balance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn set_balance(&self, publisher_id: &PublisherId, balance: &Money) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Analytics
// ============================================================================

/// Analytics event storage.
pub trait AnalyticsStore {
    /// Appends an analytics event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn record_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError>;

    /// Lists a locker's analytics events in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_analytics_events(&self, locker_id: &LockerId)
    -> Result<Vec<AnalyticsEvent>, StoreError>;
}

/// Every storage interface the engine needs, behind one object.
pub trait LockerStore:
    CatalogStore + EligibilityStore + LedgerStore + BalanceStore + AnalyticsStore + Send + Sync
{
}

impl<T> LockerStore for T where
    T: CatalogStore + EligibilityStore + LedgerStore + BalanceStore + AnalyticsStore + Send + Sync
{
}

// ============================================================================
// SECTION: Geolocation
// ============================================================================

/// Geolocation lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    /// Lookup service could not be reached or timed out.
    #[error("geolocation unavailable: {0}")]
    Unavailable(String),
    /// Lookup answered with an unusable payload.
    #[error("geolocation response invalid: {0}")]
    Invalid(String),
}

/// Opaque IP-to-country lookup.
pub trait GeoResolver: Send + Sync {
    /// Resolves a visitor IP.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] when the lookup fails.
    fn lookup(&self, ip_address: &str) -> Result<GeoInfo, GeoError>;
}
