//! Domain records for the lock-event pipeline.

use serde::{Deserialize, Serialize};

/// A decoded `lock` event from the staking contract.
///
/// Missing numeric payload fields default to zero and missing strings to
/// empty; `tx_hash` is derived from the event id, and `ledger` from the
/// event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    pub user: String,
    /// Locked principal in stroops.
    pub amount: u128,
    pub duration_minutes: u64,
    pub reward_multiplier: u64,
    pub tx_hash: String,
    pub timestamp: u64,
    pub lock_index: u32,
    pub unlock_timestamp: u64,
    pub ledger: u32,
}

impl LockEvent {
    /// Identity triple used for deduplication.
    pub fn dedup_key(&self) -> (&str, u32, u32) {
        (&self.user, self.lock_index, self.ledger)
    }
}

/// Persisted lifecycle record; one row per unique (user, lock index,
/// ledger) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub id: i64,
    pub user_address: String,
    pub amount: u128,
    pub lock_index: u32,
    pub duration_minutes: u64,
    pub reward_multiplier: u64,
    pub event_timestamp: u64,
    pub unlock_timestamp: u64,
    pub ledger: u32,
    pub transaction_hash: String,
    /// Derived BLUB amount, fixed at record creation.
    pub mint_amount: u128,
    pub mint_tx: Option<String>,
    pub mint_confirmed_at: Option<String>,
    pub stake_tx: Option<String>,
    pub stake_confirmed_at: Option<String>,
    pub processed: bool,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProcessedEvent {
    /// The mint phase has not produced a confirmed transaction yet.
    pub fn needs_mint(&self) -> bool {
        self.mint_tx.is_none()
    }

    /// Mint is done but the stake phase has not completed.
    pub fn needs_stake(&self) -> bool {
        self.mint_tx.is_some() && self.stake_tx.is_none()
    }
}

/// Event store totals for the stats command and cycle summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub processed: u64,
    /// Unprocessed records with no recorded error.
    pub pending: u64,
    /// Unprocessed records that exhausted their retries.
    pub failed: u64,
}
