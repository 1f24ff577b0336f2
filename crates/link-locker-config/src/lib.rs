// crates/link-locker-config/src/lib.rs
// ============================================================================
// Module: Link Locker Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for link-locker.toml semantics.
// Dependencies: link-locker-core, link-locker-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `link-locker-config` defines the configuration model for the link locker
//! server and CLI. Loading is strict and fail-closed: oversized, non-UTF-8,
//! or internally inconsistent files are rejected before anything starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
