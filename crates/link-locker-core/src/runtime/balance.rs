// crates/link-locker-core/src/runtime/balance.rs
// ============================================================================
// Module: Link Locker Balance Crediting
// Description: Two-step balance crediting strategy.
// Purpose: Credit publishers after the ledger append without masking failures.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Crediting tries the store's atomic increment first. Only when the backend
//! reports [`StoreError::Unsupported`] does it fall back to read, add, write.
//! The fallback is not atomic: two concurrent credits for one publisher can
//! lose an update. The revenue ledger is the source of truth, so a lost or
//! failed credit is repaired by reconciling the balance from the ledger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::Money;
use crate::core::PublisherId;
use crate::interfaces::BalanceStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Strategy that applied a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStrategy {
    /// Store-side atomic increment.
    Atomic,
    /// Non-atomic read, add, write fallback.
    ReadModifyWrite,
}

/// Result of a credit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance updated.
    Credited {
        /// Strategy that ran.
        strategy: CreditStrategy,
        /// Balance after the credit.
        balance: Money,
    },
    /// Balance left unchanged; the ledger row still stands.
    Failed {
        /// Last store error.
        error: StoreError,
    },
}

// ============================================================================
// SECTION: Creditor
// ============================================================================

/// Balance crediting strategy object.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceCreditor;

impl BalanceCreditor {
    /// Adds `amount` to the publisher's balance.
    #[must_use]
    pub fn credit<S>(store: &S, publisher_id: &PublisherId, amount: &Money) -> CreditOutcome
    where
        S: BalanceStore + ?Sized,
    {
        match store.increment_balance(publisher_id, amount) {
            Ok(balance) => CreditOutcome::Credited {
                strategy: CreditStrategy::Atomic,
                balance,
            },
            Err(StoreError::Unsupported(_)) => Self::read_modify_write(store, publisher_id, amount),
            Err(error) => CreditOutcome::Failed { error },
        }
    }

    /// Applies the non-atomic fallback.
    fn read_modify_write<S>(
        store: &S,
        publisher_id: &PublisherId,
        amount: &Money,
    ) -> CreditOutcome
    where
        S: BalanceStore + ?Sized,
    {
        let current = match store.get_balance(publisher_id) {
            Ok(current) => current,
            Err(error) => return CreditOutcome::Failed { error },
        };
        let balance = current.plus(amount);
        match store.set_balance(publisher_id, &balance) {
            Ok(()) => CreditOutcome::Credited {
                strategy: CreditStrategy::ReadModifyWrite,
                balance,
            },
            Err(error) => CreditOutcome::Failed { error },
        }
    }
}
