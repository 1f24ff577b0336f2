// crates/link-locker-store-sqlite/src/lib.rs
// ============================================================================
// Module: Link Locker SQLite Store Library
// Description: Durable storage backend for the link locker engine.
// Purpose: Expose the SQLite store and its configuration.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! A single-file `SQLite` implementation of every link locker storage trait.
//! Uniqueness invariants live in the schema, so concurrent writers and
//! restarted processes cannot double-credit a conversion.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteLockerStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
