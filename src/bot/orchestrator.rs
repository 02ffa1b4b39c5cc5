//! Two-phase mint-then-stake orchestration.
//!
//! Every decoded lock event is deduplicated against the store, persisted
//! with its derived mint amount, then driven through the mint and stake
//! phases in order. Each phase retries independently; the stake phase never
//! starts until a mint transaction hash is on the record. Exhausted retries
//! leave the record unprocessed with a terminal error message, and hashes
//! from completed phases are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::mint::MintOperation;
use super::retry;
use super::stake::StakeOperation;
use super::store::{EventStore, StoreError};
use super::types::{LockEvent, ProcessedEvent};
use crate::units;

/// Basis points in a whole.
const BPS_SCALE: u128 = 10_000;

/// Terminal verdict for one event, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Identity triple already recorded; nothing done.
    Skipped,
    /// Both phases confirmed.
    Completed { record_id: i64 },
    /// Mint retries exhausted; the stake phase never ran.
    MintFailed { record_id: i64 },
    /// Mint confirmed but stake retries exhausted.
    StakeFailed { record_id: i64 },
    /// A store failure prevented processing.
    StoreFailed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Mint ratio in basis points of the locked principal; 11_000 is 110%.
    pub mint_percent_bps: u32,
    /// Attempts per phase.
    pub max_retries: u32,
    /// Pause between attempts within a phase.
    pub retry_delay: Duration,
    /// Pause between a confirmed mint and the stake submission.
    pub settle_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mint_percent_bps: 11_000,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// BLUB amount to mint for a locked principal, rounded down.
pub fn derived_mint_amount(principal: u128, mint_percent_bps: u32) -> u128 {
    principal.saturating_mul(mint_percent_bps as u128) / BPS_SCALE
}

pub struct Orchestrator {
    store: Arc<EventStore>,
    minter: Arc<dyn MintOperation>,
    staker: Arc<dyn StakeOperation>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<EventStore>,
        minter: Arc<dyn MintOperation>,
        staker: Arc<dyn StakeOperation>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            minter,
            staker,
            config,
        }
    }

    /// Process one decoded event to a terminal outcome. Never panics and
    /// never returns early with a phase half-recorded.
    pub async fn process_event(&self, event: &LockEvent) -> ProcessOutcome {
        match self.store.exists(&event.user, event.lock_index, event.ledger) {
            Ok(true) => {
                info!(
                    user = %event.user,
                    lock_index = event.lock_index,
                    ledger = event.ledger,
                    "event already recorded, skipping"
                );
                return ProcessOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "dedup check failed");
                return ProcessOutcome::StoreFailed;
            }
        }

        let mint_amount = derived_mint_amount(event.amount, self.config.mint_percent_bps);
        let record_id = match self.store.save(event, mint_amount) {
            Ok(id) => id,
            Err(StoreError::Duplicate(..)) => {
                warn!(
                    user = %event.user,
                    lock_index = event.lock_index,
                    "event raced into the store, skipping"
                );
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                error!(error = %e, "failed to persist event");
                return ProcessOutcome::StoreFailed;
            }
        };
        info!(
            record_id,
            user = %event.user,
            lock_index = event.lock_index,
            amount = %units::format_amount(event.amount),
            mint_amount = %units::format_amount(mint_amount),
            "processing lock event"
        );

        self.run_phases(record_id, &event.user, event.lock_index, mint_amount, false)
            .await
    }

    /// Re-drive unprocessed, error-free records left over from an earlier
    /// run. Records with a confirmed mint resume directly at the stake
    /// phase. Returns how many records were driven.
    pub async fn resume_pending(&self) -> usize {
        let records = match self.store.unprocessed() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to load unprocessed records");
                return 0;
            }
        };
        let pending: Vec<ProcessedEvent> = records
            .into_iter()
            .filter(|r| r.error_message.is_none())
            .collect();
        if pending.is_empty() {
            return 0;
        }

        info!(count = pending.len(), "resuming incomplete records");
        let mut driven = 0;
        for record in pending {
            if record.needs_mint() {
                info!(record_id = record.id, lock_index = record.lock_index, "resuming at mint phase");
                self.run_phases(
                    record.id,
                    &record.user_address,
                    record.lock_index,
                    record.mint_amount,
                    false,
                )
                .await;
            } else if record.needs_stake() {
                info!(record_id = record.id, lock_index = record.lock_index, "resuming at stake phase");
                self.run_phases(
                    record.id,
                    &record.user_address,
                    record.lock_index,
                    record.mint_amount,
                    true,
                )
                .await;
            } else {
                continue;
            }
            driven += 1;
        }
        driven
    }

    async fn run_phases(
        &self,
        record_id: i64,
        user: &str,
        lock_index: u32,
        mint_amount: u128,
        mint_done: bool,
    ) -> ProcessOutcome {
        if !mint_done {
            let mint_tx = retry::attempt(
                "mint",
                self.config.max_retries,
                self.config.retry_delay,
                || async move { self.minter.mint_for_lock(mint_amount, lock_index, user).await },
            )
            .await;
            let mint_tx = match mint_tx {
                Some(hash) => hash,
                None => {
                    error!(record_id, lock_index, "mint retries exhausted");
                    self.fail(record_id, "BLUB minting failed");
                    return ProcessOutcome::MintFailed { record_id };
                }
            };
            if let Err(e) = self.store.record_mint(record_id, &mint_tx) {
                error!(record_id, error = %e, "failed to persist mint result");
                return ProcessOutcome::StoreFailed;
            }
            info!(record_id, tx = %mint_tx, "mint phase complete");

            // Let the ledger settle before the dependent invocation.
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let stake_tx = retry::attempt(
            "stake",
            self.config.max_retries,
            self.config.retry_delay,
            || async move { self.staker.stake_minted(user, lock_index, mint_amount).await },
        )
        .await;
        match stake_tx {
            Some(hash) => {
                if let Err(e) = self.store.record_stake(record_id, &hash) {
                    error!(record_id, error = %e, "failed to persist stake result");
                    return ProcessOutcome::StoreFailed;
                }
                info!(record_id, tx = %hash, "stake phase complete, event processed");
                ProcessOutcome::Completed { record_id }
            }
            None => {
                error!(record_id, lock_index, "stake retries exhausted");
                self.fail(record_id, "stake invocation failed");
                ProcessOutcome::StakeFailed { record_id }
            }
        }
    }

    fn fail(&self, record_id: i64, message: &str) {
        if let Err(e) = self.store.record_error(record_id, message) {
            error!(record_id, error = %e, "failed to record error message");
        }
    }
}
