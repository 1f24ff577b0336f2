// crates/link-locker-core/src/runtime/store.rs
// ============================================================================
// Module: Link Locker In-Memory Store
// Description: In-memory storage backend and shared store wrapper.
// Purpose: Provide a deterministic store for tests and the `memory` backend.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryLockerStore`] keeps every table behind one mutex, so each trait
//! method is a transaction. It enforces the same uniqueness constraints as
//! the durable backend and reports violations as [`StoreError::Conflict`].
//! Data is lost when the process exits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AnalyticsEvent;
use crate::core::Conversion;
use crate::core::Device;
use crate::core::DeviceTargetingOverride;
use crate::core::EligibilityKey;
use crate::core::EligibilityRecord;
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
use crate::interfaces::AnalyticsStore;
use crate::interfaces::BalanceStore;
use crate::interfaces::CatalogStore;
use crate::interfaces::EligibilityStore;
use crate::interfaces::LedgerStore;
use crate::interfaces::LockerStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Every table of the in-memory backend.
#[derive(Debug, Default)]
struct MemoryTables {
    /// Tasks by id.
    tasks: BTreeMap<TaskId, Task>,
    /// Lockers by id.
    lockers: BTreeMap<LockerId, Locker>,
    /// Overrides by slot.
    overrides: BTreeMap<OverrideKey, DeviceTargetingOverride>,
    /// Eligibility records by key.
    eligibility: BTreeMap<EligibilityKey, EligibilityRecord>,
    /// Inbound postbacks in receive order.
    postbacks: Vec<PostbackEvent>,
    /// Webhook conversions in record order.
    conversions: Vec<Conversion>,
    /// Revenue ledger in append order.
    revenue: Vec<RevenueEvent>,
    /// Publisher balances.
    balances: BTreeMap<PublisherId, Money>,
    /// Analytics events in append order.
    analytics: Vec<AnalyticsEvent>,
}

impl MemoryTables {
    /// Rejects a revenue row whose dedup key already exists.
    fn check_revenue(&self, event: &RevenueEvent) -> Result<(), StoreError> {
        if let Some(dedup_key) = &event.dedup_key
            && self.revenue.iter().any(|row| row.dedup_key.as_ref() == Some(dedup_key))
        {
            return Err(StoreError::Conflict(format!("revenue dedup key {dedup_key}")));
        }
        if self.revenue.iter().any(|row| row.id == event.id) {
            return Err(StoreError::Conflict(format!("revenue event {}", event.id)));
        }
        Ok(())
    }
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Clone)]
pub struct InMemoryLockerStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<MemoryTables>>,
    /// Whether `increment_balance` is offered.
    atomic_increment: bool,
    /// Whether balance writes fail with an I/O error.
    failing_balance_writes: bool,
}

impl Default for InMemoryLockerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLockerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(MemoryTables::default())),
            atomic_increment: true,
            failing_balance_writes: false,
        }
    }

    /// Disables the atomic balance increment so callers take the fallback path.
    #[must_use]
    pub const fn without_atomic_increment(mut self) -> Self {
        self.atomic_increment = false;
        self
    }

    /// Makes every balance write fail with [`StoreError::Io`].
    #[must_use]
    pub const fn with_failing_balance_writes(mut self) -> Self {
        self.failing_balance_writes = true;
        self
    }

    /// Rejects a balance write when failures are switched on.
    fn check_balance_write(&self) -> Result<(), StoreError> {
        if self.failing_balance_writes {
            return Err(StoreError::Io("balance table unavailable".to_string()));
        }
        Ok(())
    }

    /// Locks the tables.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Store("link locker store mutex poisoned".to_string()))
    }
}

impl CatalogStore for InMemoryLockerStore {
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.lock()?.tasks.get(task_id).cloned())
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }

    fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        self.lock()?.tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    fn get_locker(&self, locker_id: &LockerId) -> Result<Option<Locker>, StoreError> {
        Ok(self.lock()?.lockers.get(locker_id).cloned())
    }

    fn put_locker(&self, locker: &Locker) -> Result<(), StoreError> {
        self.lock()?.lockers.insert(locker.locker_id.clone(), locker.clone());
        Ok(())
    }

    fn get_override(
        &self,
        key: &OverrideKey,
    ) -> Result<Option<DeviceTargetingOverride>, StoreError> {
        Ok(self.lock()?.overrides.get(key).cloned())
    }

    fn list_overrides(
        &self,
        device: Option<Device>,
    ) -> Result<Vec<DeviceTargetingOverride>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .overrides
            .values()
            .filter(|item| device.is_none_or(|device| item.device == device))
            .cloned()
            .collect())
    }

    fn save_overrides(&self, overrides: &[DeviceTargetingOverride]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        for item in overrides {
            guard.overrides.insert(item.key(), item.clone());
        }
        drop(guard);
        Ok(())
    }
}

impl EligibilityStore for InMemoryLockerStore {
    fn load_eligibility(
        &self,
        key: &EligibilityKey,
    ) -> Result<Option<EligibilityRecord>, StoreError> {
        Ok(self.lock()?.eligibility.get(key).cloned())
    }

    fn insert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.eligibility.contains_key(&record.key) {
            return Err(StoreError::Conflict(format!(
                "eligibility record {}/{}",
                record.key.target_entity_id, record.key.event_kind
            )));
        }
        guard.eligibility.insert(record.key.clone(), record.clone());
        drop(guard);
        Ok(())
    }

    fn record_repeat(
        &self,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<Option<u64>, StoreError> {
        let mut guard = self.lock()?;
        Ok(guard.eligibility.get_mut(key).map(|record| {
            record.occurrence_count = record.occurrence_count.saturating_add(1);
            record.last_occurrence_at = now;
            record.occurrence_count
        }))
    }

    fn reset_eligibility(
        &self,
        key: &EligibilityKey,
        expected_first: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        match guard.eligibility.get_mut(key) {
            Some(record) if record.first_occurrence_at == expected_first => {
                *record = EligibilityRecord::first(key.clone(), now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl LedgerStore for InMemoryLockerStore {
    fn record_inbound_postback(&self, postback: &PostbackEvent) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.postbacks.iter().any(|row| row.id == postback.id) {
            return Err(StoreError::Conflict(format!("postback {}", postback.id)));
        }
        guard.postbacks.push(postback.clone());
        drop(guard);
        Ok(())
    }

    fn find_processed_postback(
        &self,
        click_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<PostbackEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .postbacks
            .iter()
            .find(|row| row.processed && row.click_id == click_id && row.task_id == *task_id)
            .cloned())
    }

    fn commit_postback(
        &self,
        postback_id: &RecordId,
        revenue: Option<&RevenueEvent>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let index = guard
            .postbacks
            .iter()
            .position(|row| row.id == *postback_id)
            .ok_or_else(|| StoreError::NotFound(format!("postback {postback_id}")))?;
        let (click_id, task_id) = {
            let row = &guard.postbacks[index];
            (row.click_id.clone(), row.task_id.clone())
        };
        if guard
            .postbacks
            .iter()
            .any(|row| row.processed && row.click_id == click_id && row.task_id == task_id)
        {
            return Err(StoreError::Conflict(format!("postback {click_id}/{task_id} processed")));
        }
        if let Some(event) = revenue {
            guard.check_revenue(event)?;
            guard.revenue.push(event.clone());
        }
        guard.postbacks[index].processed = true;
        drop(guard);
        Ok(())
    }

    fn find_conversion(
        &self,
        sub_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<Conversion>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .conversions
            .iter()
            .find(|row| row.sub_id == sub_id && row.task_id == *task_id)
            .cloned())
    }

    fn commit_conversion(
        &self,
        conversion: &Conversion,
        revenue: &RevenueEvent,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard
            .conversions
            .iter()
            .any(|row| row.sub_id == conversion.sub_id && row.task_id == conversion.task_id)
        {
            return Err(StoreError::Conflict(format!(
                "conversion {}/{}",
                conversion.sub_id, conversion.task_id
            )));
        }
        guard.check_revenue(revenue)?;
        guard.conversions.push(conversion.clone());
        guard.revenue.push(revenue.clone());
        drop(guard);
        Ok(())
    }

    fn append_revenue_event(&self, event: &RevenueEvent) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.check_revenue(event)?;
        guard.revenue.push(event.clone());
        drop(guard);
        Ok(())
    }

    fn list_revenue_events(
        &self,
        publisher_id: &PublisherId,
    ) -> Result<Vec<RevenueEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.revenue.iter().filter(|row| row.publisher_id == *publisher_id).cloned().collect())
    }

    fn find_revenue_by_click(&self, click_id: &str) -> Result<Vec<RevenueEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .revenue
            .iter()
            .filter(|row| row.click_id.as_deref() == Some(click_id))
            .cloned()
            .collect())
    }
}

impl BalanceStore for InMemoryLockerStore {
    fn increment_balance(
        &self,
        publisher_id: &PublisherId,
        amount: &Money,
    ) -> Result<Money, StoreError> {
        self.check_balance_write()?;
        if !self.atomic_increment {
            return Err(StoreError::Unsupported("atomic balance increment".to_string()));
        }
        let mut guard = self.lock()?;
        let balance = guard.balances.entry(publisher_id.clone()).or_default();
        *balance = balance.plus(amount);
        Ok(balance.clone())
    }

    fn get_balance(&self, publisher_id: &PublisherId) -> Result<Money, StoreError> {
        Ok(self.lock()?.balances.get(publisher_id).cloned().unwrap_or_default())
    }

    fn set_balance(&self, publisher_id: &PublisherId, balance: &Money) -> Result<(), StoreError> {
        self.check_balance_write()?;
        self.lock()?.balances.insert(publisher_id.clone(), balance.clone());
        Ok(())
    }
}

impl AnalyticsStore for InMemoryLockerStore {
    fn record_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        self.lock()?.analytics.push(event.clone());
        Ok(())
    }

    fn list_analytics_events(
        &self,
        locker_id: &LockerId,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.analytics.iter().filter(|row| row.locker_id == *locker_id).cloned().collect())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared link locker store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedLockerStore {
    /// Inner store implementation.
    inner: Arc<dyn LockerStore>,
}

impl SharedLockerStore {
    /// Wraps a store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl LockerStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn LockerStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl CatalogStore for SharedLockerStore {
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get_task(task_id)
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.inner.list_tasks()
    }

    fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.put_task(task)
    }

    fn get_locker(&self, locker_id: &LockerId) -> Result<Option<Locker>, StoreError> {
        self.inner.get_locker(locker_id)
    }

    fn put_locker(&self, locker: &Locker) -> Result<(), StoreError> {
        self.inner.put_locker(locker)
    }

    fn get_override(
        &self,
        key: &OverrideKey,
    ) -> Result<Option<DeviceTargetingOverride>, StoreError> {
        self.inner.get_override(key)
    }

    fn list_overrides(
        &self,
        device: Option<Device>,
    ) -> Result<Vec<DeviceTargetingOverride>, StoreError> {
        self.inner.list_overrides(device)
    }

    fn save_overrides(&self, overrides: &[DeviceTargetingOverride]) -> Result<(), StoreError> {
        self.inner.save_overrides(overrides)
    }
}

impl EligibilityStore for SharedLockerStore {
    fn load_eligibility(
        &self,
        key: &EligibilityKey,
    ) -> Result<Option<EligibilityRecord>, StoreError> {
        self.inner.load_eligibility(key)
    }

    fn insert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError> {
        self.inner.insert_eligibility(record)
    }

    fn record_repeat(
        &self,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<Option<u64>, StoreError> {
        self.inner.record_repeat(key, now)
    }

    fn reset_eligibility(
        &self,
        key: &EligibilityKey,
        expected_first: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        self.inner.reset_eligibility(key, expected_first, now)
    }
}

impl LedgerStore for SharedLockerStore {
    fn record_inbound_postback(&self, postback: &PostbackEvent) -> Result<(), StoreError> {
        self.inner.record_inbound_postback(postback)
    }

    fn find_processed_postback(
        &self,
        click_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<PostbackEvent>, StoreError> {
        self.inner.find_processed_postback(click_id, task_id)
    }

    fn commit_postback(
        &self,
        postback_id: &RecordId,
        revenue: Option<&RevenueEvent>,
    ) -> Result<(), StoreError> {
        self.inner.commit_postback(postback_id, revenue)
    }

    fn find_conversion(
        &self,
        sub_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<Conversion>, StoreError> {
        self.inner.find_conversion(sub_id, task_id)
    }

    fn commit_conversion(
        &self,
        conversion: &Conversion,
        revenue: &RevenueEvent,
    ) -> Result<(), StoreError> {
        self.inner.commit_conversion(conversion, revenue)
    }

    fn append_revenue_event(&self, event: &RevenueEvent) -> Result<(), StoreError> {
        self.inner.append_revenue_event(event)
    }

    fn list_revenue_events(
        &self,
        publisher_id: &PublisherId,
    ) -> Result<Vec<RevenueEvent>, StoreError> {
        self.inner.list_revenue_events(publisher_id)
    }

    fn find_revenue_by_click(&self, click_id: &str) -> Result<Vec<RevenueEvent>, StoreError> {
        self.inner.find_revenue_by_click(click_id)
    }
}

impl BalanceStore for SharedLockerStore {
    fn increment_balance(
        &self,
        publisher_id: &PublisherId,
        amount: &Money,
    ) -> Result<Money, StoreError> {
        self.inner.increment_balance(publisher_id, amount)
    }

    fn get_balance(&self, publisher_id: &PublisherId) -> Result<Money, StoreError> {
        self.inner.get_balance(publisher_id)
    }

    fn set_balance(&self, publisher_id: &PublisherId, balance: &Money) -> Result<(), StoreError> {
        self.inner.set_balance(publisher_id, balance)
    }
}

impl AnalyticsStore for SharedLockerStore {
    fn record_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        self.inner.record_analytics_event(event)
    }

    fn list_analytics_events(
        &self,
        locker_id: &LockerId,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        self.inner.list_analytics_events(locker_id)
    }
}
