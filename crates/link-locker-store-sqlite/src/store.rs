// crates/link-locker-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Link Locker Store
// Description: Durable LockerStore backed by SQLite WAL.
// Purpose: Persist catalog, eligibility, ledger, balance, and analytics data.
// Dependencies: link-locker-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements every link locker storage trait on one `SQLite`
//! database. Records are stored as JSON payloads next to the key columns the
//! store filters and constrains on. Uniqueness invariants are schema
//! constraints:
//! - one eligibility row per `(ip_address, target_entity_id, event_kind)`
//! - one processed postback per `(click_id, task_id)` (partial unique index)
//! - one conversion per `(sub_id, task_id)`
//! - unique revenue `dedup_key`
//!
//! Multi-statement writes run inside `BEGIN IMMEDIATE` transactions, and
//! constraint violations surface as [`StoreError::Conflict`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use link_locker_core::AnalyticsEvent;
use link_locker_core::AnalyticsStore;
use link_locker_core::BalanceStore;
use link_locker_core::CatalogStore;
use link_locker_core::Conversion;
use link_locker_core::Device;
use link_locker_core::DeviceTargetingOverride;
use link_locker_core::EligibilityKey;
use link_locker_core::EligibilityRecord;
use link_locker_core::EligibilityStore;
use link_locker_core::Label;
use link_locker_core::LedgerStore;
use link_locker_core::Locker;
use link_locker_core::LockerId;
use link_locker_core::Money;
use link_locker_core::OverrideKey;
use link_locker_core::PostbackEvent;
use link_locker_core::PublisherId;
use link_locker_core::RecordId;
use link_locker_core::RevenueEvent;
use link_locker_core::StoreError;
use link_locker_core::Task;
use link_locker_core::TaskId;
use link_locker_core::Timestamp;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms) for `SQLite` connections.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` link locker store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding stored payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// A uniqueness constraint rejected the write.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Referenced row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Maps a `rusqlite` error, surfacing constraint violations as conflicts.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Conflict(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed link locker store with WAL support.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Balance increments run in immediate transactions, so they are atomic
///   across processes sharing the database file.
#[derive(Clone)]
pub struct SqliteLockerStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLockerStore {
    /// Opens an `SQLite`-backed link locker store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |_| Ok(())).map_err(db_error)
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }

    /// Runs `apply` inside an immediate transaction, committing on success.
    fn write_tx<T>(
        &self,
        apply: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let value = apply(&tx)?;
        tx.commit().map_err(db_error)?;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

impl CatalogStore for SqliteLockerStore {
    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        let guard = self.lock()?;
        Ok(query_one(
            &guard,
            "SELECT task_json FROM tasks WHERE task_id = ?1",
            params![task_id.as_str()],
        )?)
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let guard = self.lock()?;
        Ok(query_all(&guard, "SELECT task_json FROM tasks ORDER BY task_id", params![])?)
    }

    fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let payload = to_json(task)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO tasks (task_id, task_json) VALUES (?1, ?2)
                 ON CONFLICT(task_id) DO UPDATE SET task_json = excluded.task_json",
                params![task.task_id.as_str(), payload],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn get_locker(&self, locker_id: &LockerId) -> Result<Option<Locker>, StoreError> {
        let guard = self.lock()?;
        Ok(query_one(
            &guard,
            "SELECT locker_json FROM lockers WHERE locker_id = ?1",
            params![locker_id.as_str()],
        )?)
    }

    fn put_locker(&self, locker: &Locker) -> Result<(), StoreError> {
        let payload = to_json(locker)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO lockers (locker_id, locker_json) VALUES (?1, ?2)
                 ON CONFLICT(locker_id) DO UPDATE SET locker_json = excluded.locker_json",
                params![locker.locker_id.as_str(), payload],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn get_override(
        &self,
        key: &OverrideKey,
    ) -> Result<Option<DeviceTargetingOverride>, StoreError> {
        let guard = self.lock()?;
        Ok(query_one(
            &guard,
            "SELECT override_json FROM device_overrides WHERE device = ?1 AND country_code = ?2",
            params![key.device.as_label(), key.country_code.as_str()],
        )?)
    }

    fn list_overrides(
        &self,
        device: Option<Device>,
    ) -> Result<Vec<DeviceTargetingOverride>, StoreError> {
        let guard = self.lock()?;
        let rows = match device {
            Some(device) => query_all(
                &guard,
                "SELECT override_json FROM device_overrides WHERE device = ?1
                 ORDER BY device, country_code",
                params![device.as_label()],
            )?,
            None => query_all(
                &guard,
                "SELECT override_json FROM device_overrides ORDER BY device, country_code",
                params![],
            )?,
        };
        Ok(rows)
    }

    fn save_overrides(&self, overrides: &[DeviceTargetingOverride]) -> Result<(), StoreError> {
        let payloads = overrides
            .iter()
            .map(|item| to_json(item).map(|payload| (item, payload)))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_tx(|tx| {
            for (item, payload) in &payloads {
                tx.execute(
                    "INSERT INTO device_overrides (device, country_code, override_json)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(device, country_code)
                     DO UPDATE SET override_json = excluded.override_json",
                    params![item.device.as_label(), item.country_code.as_str(), payload],
                )
                .map_err(db_error)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Eligibility
// ============================================================================

impl EligibilityStore for SqliteLockerStore {
    fn load_eligibility(
        &self,
        key: &EligibilityKey,
    ) -> Result<Option<EligibilityRecord>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT first_occurrence_at, last_occurrence_at, occurrence_count
                 FROM eligibility
                 WHERE ip_address = ?1 AND target_entity_id = ?2 AND event_kind = ?3",
                params![key.ip_address, key.target_entity_id, key.event_kind.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()
            .map_err(db_error)?;
        let Some((first, last, count)) = row else {
            return Ok(None);
        };
        Ok(Some(EligibilityRecord {
            key: key.clone(),
            first_occurrence_at: Timestamp::from_unix_millis(first),
            last_occurrence_at: Timestamp::from_unix_millis(last),
            occurrence_count: count_from_sql(count)?,
        }))
    }

    fn insert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError> {
        let count = count_to_sql(record.occurrence_count)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO eligibility (ip_address, target_entity_id, event_kind, \
                 first_occurrence_at, last_occurrence_at, occurrence_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.key.ip_address,
                    record.key.target_entity_id,
                    record.key.event_kind.as_str(),
                    record.first_occurrence_at.as_unix_millis(),
                    record.last_occurrence_at.as_unix_millis(),
                    count,
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn record_repeat(
        &self,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<Option<u64>, StoreError> {
        let guard = self.lock()?;
        let count: Option<i64> = guard
            .query_row(
                "UPDATE eligibility
                 SET occurrence_count = occurrence_count + 1, last_occurrence_at = ?4
                 WHERE ip_address = ?1 AND target_entity_id = ?2 AND event_kind = ?3
                 RETURNING occurrence_count",
                params![
                    key.ip_address,
                    key.target_entity_id,
                    key.event_kind.as_str(),
                    now.as_unix_millis()
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(count.map(count_from_sql).transpose()?)
    }

    fn reset_eligibility(
        &self,
        key: &EligibilityKey,
        expected_first: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE eligibility
                 SET first_occurrence_at = ?5, last_occurrence_at = ?5, occurrence_count = 1
                 WHERE ip_address = ?1 AND target_entity_id = ?2 AND event_kind = ?3
                   AND first_occurrence_at = ?4",
                params![
                    key.ip_address,
                    key.target_entity_id,
                    key.event_kind.as_str(),
                    expected_first.as_unix_millis(),
                    now.as_unix_millis()
                ],
            )
            .map_err(db_error)?;
        Ok(changed == 1)
    }
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

impl LedgerStore for SqliteLockerStore {
    fn record_inbound_postback(&self, postback: &PostbackEvent) -> Result<(), StoreError> {
        let payload = to_json(postback)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO postbacks (id, click_id, task_id, processed, received_at, \
                 postback_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    postback.id.as_str(),
                    postback.click_id,
                    postback.task_id.as_str(),
                    postback.processed,
                    postback.received_at.as_unix_millis(),
                    payload
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn find_processed_postback(
        &self,
        click_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<PostbackEvent>, StoreError> {
        let guard = self.lock()?;
        let payload: Option<Vec<u8>> = guard
            .query_row(
                "SELECT postback_json FROM postbacks
                 WHERE click_id = ?1 AND task_id = ?2 AND processed = 1",
                params![click_id, task_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let mut postback: PostbackEvent = from_json(&payload)?;
        postback.processed = true;
        Ok(Some(postback))
    }

    fn commit_postback(
        &self,
        postback_id: &RecordId,
        revenue: Option<&RevenueEvent>,
    ) -> Result<(), StoreError> {
        let revenue = revenue.map(|event| to_json(event).map(|payload| (event, payload)));
        let revenue = revenue.transpose()?;
        self.write_tx(|tx| {
            let changed = tx
                .execute(
                    "UPDATE postbacks SET processed = 1 WHERE id = ?1",
                    params![postback_id.as_str()],
                )
                .map_err(db_error)?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("postback {postback_id}")));
            }
            if let Some((event, payload)) = &revenue {
                insert_revenue(tx, event, payload)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn find_conversion(
        &self,
        sub_id: &str,
        task_id: &TaskId,
    ) -> Result<Option<Conversion>, StoreError> {
        let guard = self.lock()?;
        Ok(query_one(
            &guard,
            "SELECT conversion_json FROM conversions WHERE sub_id = ?1 AND task_id = ?2",
            params![sub_id, task_id.as_str()],
        )?)
    }

    fn commit_conversion(
        &self,
        conversion: &Conversion,
        revenue: &RevenueEvent,
    ) -> Result<(), StoreError> {
        let conversion_payload = to_json(conversion)?;
        let revenue_payload = to_json(revenue)?;
        self.write_tx(|tx| {
            tx.execute(
                "INSERT INTO conversions (id, sub_id, task_id, conversion_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversion.id.as_str(),
                    conversion.sub_id,
                    conversion.task_id.as_str(),
                    conversion_payload
                ],
            )
            .map_err(db_error)?;
            insert_revenue(tx, revenue, &revenue_payload)
        })?;
        Ok(())
    }

    fn append_revenue_event(&self, event: &RevenueEvent) -> Result<(), StoreError> {
        let payload = to_json(event)?;
        self.write_tx(|tx| insert_revenue(tx, event, &payload))?;
        Ok(())
    }

    fn list_revenue_events(
        &self,
        publisher_id: &PublisherId,
    ) -> Result<Vec<RevenueEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(query_all(
            &guard,
            "SELECT event_json FROM revenue_events WHERE publisher_id = ?1 ORDER BY seq",
            params![publisher_id.as_str()],
        )?)
    }

    fn find_revenue_by_click(&self, click_id: &str) -> Result<Vec<RevenueEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(query_all(
            &guard,
            "SELECT event_json FROM revenue_events WHERE click_id = ?1 ORDER BY seq",
            params![click_id],
        )?)
    }
}

/// Inserts one revenue row; a duplicate dedup key is a conflict.
fn insert_revenue(
    tx: &Transaction<'_>,
    event: &RevenueEvent,
    payload: &[u8],
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO revenue_events (id, publisher_id, click_id, dedup_key, event_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id.as_str(),
            event.publisher_id.as_str(),
            event.click_id,
            event.dedup_key,
            payload
        ],
    )
    .map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Balances
// ============================================================================

impl BalanceStore for SqliteLockerStore {
    fn increment_balance(
        &self,
        publisher_id: &PublisherId,
        amount: &Money,
    ) -> Result<Money, StoreError> {
        let balance = self.write_tx(|tx| {
            let current = read_balance(tx, publisher_id)?;
            let next = current.plus(amount);
            write_balance(tx, publisher_id, &next)?;
            Ok(next)
        })?;
        Ok(balance)
    }

    fn get_balance(&self, publisher_id: &PublisherId) -> Result<Money, StoreError> {
        let guard = self.lock()?;
        Ok(read_balance(&guard, publisher_id)?)
    }

    fn set_balance(&self, publisher_id: &PublisherId, balance: &Money) -> Result<(), StoreError> {
        let guard = self.lock()?;
        Ok(write_balance(&guard, publisher_id, balance)?)
    }
}

/// Reads a balance, defaulting to zero.
fn read_balance(
    connection: &Connection,
    publisher_id: &PublisherId,
) -> Result<Money, SqliteStoreError> {
    let text: Option<String> = connection
        .query_row(
            "SELECT balance FROM balances WHERE publisher_id = ?1",
            params![publisher_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    text.map_or_else(
        || Ok(Money::zero()),
        |text| {
            Money::parse_canonical(&text).map_err(|err| {
                SqliteStoreError::Invalid(format!("balance for {publisher_id}: {err}"))
            })
        },
    )
}

/// Upserts a balance as exact decimal text.
fn write_balance(
    connection: &Connection,
    publisher_id: &PublisherId,
    balance: &Money,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "INSERT INTO balances (publisher_id, balance) VALUES (?1, ?2)
             ON CONFLICT(publisher_id) DO UPDATE SET balance = excluded.balance",
            params![publisher_id.as_str(), balance.to_string()],
        )
        .map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Analytics
// ============================================================================

impl AnalyticsStore for SqliteLockerStore {
    fn record_analytics_event(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        let payload = to_json(event)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO analytics_events (id, locker_id, event_kind, counted, created_at, \
                 event_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id.as_str(),
                    event.locker_id.as_str(),
                    event.event_kind.as_str(),
                    event.counted,
                    event.created_at.as_unix_millis(),
                    payload
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn list_analytics_events(
        &self,
        locker_id: &LockerId,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let guard = self.lock()?;
        Ok(query_all(
            &guard,
            "SELECT event_json FROM analytics_events WHERE locker_id = ?1 ORDER BY seq",
            params![locker_id.as_str()],
        )?)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a record payload.
fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, SqliteStoreError> {
    serde_json::to_vec(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a record payload.
fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SqliteStoreError> {
    serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Loads at most one JSON payload.
fn query_one<T: DeserializeOwned>(
    connection: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<T>, SqliteStoreError> {
    let payload: Option<Vec<u8>> =
        connection.query_row(sql, params, |row| row.get(0)).optional().map_err(db_error)?;
    payload.map(|bytes| from_json(&bytes)).transpose()
}

/// Loads every JSON payload a query returns.
fn query_all<T: DeserializeOwned>(
    connection: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<T>, SqliteStoreError> {
    let mut stmt = connection.prepare_cached(sql).map_err(db_error)?;
    let rows = stmt.query_map(params, |row| row.get::<_, Vec<u8>>(0)).map_err(db_error)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(from_json(&row.map_err(db_error)?)?);
    }
    Ok(records)
}

/// Converts an occurrence count for storage.
fn count_to_sql(count: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(count).map_err(|_| SqliteStoreError::Invalid("occurrence count overflow".into()))
}

/// Converts a stored occurrence count.
fn count_from_sql(count: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(count).map_err(|_| SqliteStoreError::Invalid("negative occurrence count".into()))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS tasks (
                    task_id TEXT PRIMARY KEY,
                    task_json BLOB NOT NULL
                );
                CREATE TABLE IF NOT EXISTS lockers (
                    locker_id TEXT PRIMARY KEY,
                    locker_json BLOB NOT NULL
                );
                CREATE TABLE IF NOT EXISTS device_overrides (
                    device TEXT NOT NULL,
                    country_code TEXT NOT NULL,
                    override_json BLOB NOT NULL,
                    PRIMARY KEY (device, country_code)
                );
                CREATE TABLE IF NOT EXISTS eligibility (
                    ip_address TEXT NOT NULL,
                    target_entity_id TEXT NOT NULL,
                    event_kind TEXT NOT NULL,
                    first_occurrence_at INTEGER NOT NULL,
                    last_occurrence_at INTEGER NOT NULL,
                    occurrence_count INTEGER NOT NULL,
                    PRIMARY KEY (ip_address, target_entity_id, event_kind)
                );
                CREATE TABLE IF NOT EXISTS postbacks (
                    id TEXT PRIMARY KEY,
                    click_id TEXT NOT NULL,
                    task_id TEXT NOT NULL,
                    processed INTEGER NOT NULL,
                    received_at INTEGER NOT NULL,
                    postback_json BLOB NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS ux_postbacks_processed
                    ON postbacks (click_id, task_id) WHERE processed = 1;
                CREATE TABLE IF NOT EXISTS conversions (
                    id TEXT PRIMARY KEY,
                    sub_id TEXT NOT NULL,
                    task_id TEXT NOT NULL,
                    conversion_json BLOB NOT NULL,
                    UNIQUE (sub_id, task_id)
                );
                CREATE TABLE IF NOT EXISTS revenue_events (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    publisher_id TEXT NOT NULL,
                    click_id TEXT,
                    dedup_key TEXT UNIQUE,
                    event_json BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_revenue_events_publisher
                    ON revenue_events (publisher_id, seq);
                CREATE INDEX IF NOT EXISTS idx_revenue_events_click
                    ON revenue_events (click_id);
                CREATE TABLE IF NOT EXISTS balances (
                    publisher_id TEXT PRIMARY KEY,
                    balance TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS analytics_events (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    locker_id TEXT NOT NULL,
                    event_kind TEXT NOT NULL,
                    counted INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    event_json BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_analytics_events_locker
                    ON analytics_events (locker_id, seq);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
