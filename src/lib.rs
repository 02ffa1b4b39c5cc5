//! BLUB Bot - Soroban Lock Event Processor
//!
//! Watches a Soroban staking contract for `lock` events and drives the
//! two-phase follow-up workflow for each one: mint BLUB to the staking
//! contract, then invoke the stake entrypoint on behalf of the locker.
//!
//! ## Pipeline
//!
//! 1. **Poller** - Scans ledgers for contract events via Soroban RPC
//! 2. **Extractor** - Decodes XDR event payloads into typed lock events
//! 3. **Orchestrator** - Runs the mint and stake phases with retries
//! 4. **Store** - SQLite record of every event and its phase progress
//!
//! ## Guarantees
//!
//! Every lock event is processed at most once per (user, lock index,
//! ledger); redelivered events are skipped, and partially processed
//! records are resumed from the phase they stopped at after a restart.

pub mod bot;
pub mod config;
pub mod horizon;
pub mod logging;
pub mod soroban;

// Re-exports: bot pipeline
pub use bot::{
    extract_lock_event, BotService, EventPoller, Orchestrator, OrchestratorConfig, PollOutcome,
    ProcessOutcome,
};

// Re-exports: persistence
pub use bot::{EventStore, LockEvent, ProcessedEvent, StoreError, StoreStats};

// Re-exports: contract operations
pub use bot::{derived_mint_amount, BlubMinter, MintOperation, StakeInvoker, StakeOperation};

// Re-exports: Soroban layer
pub use soroban::{
    Keypair, LedgerQuery, Operation, RemoteCallError, ScVal, SorobanRpcClient, Transaction,
    TxDispatcher,
};

// Re-exports: Horizon client
pub use horizon::{ClaimableBalance, HorizonClient, HorizonError};

// Re-exports: configuration
pub use config::{Config, ConfigError, Network};

/// Stroop conversion helpers
pub mod units {
    pub const STROOPS_PER_TOKEN: u128 = 10_000_000;

    /// Convert whole tokens to stroops with proper rounding
    pub fn tokens_to_stroops(tokens: f64) -> u128 {
        (tokens * STROOPS_PER_TOKEN as f64).round() as u128
    }

    pub fn stroops_to_tokens(stroops: u128) -> f64 {
        stroops as f64 / STROOPS_PER_TOKEN as f64
    }

    pub fn format_amount(stroops: u128) -> String {
        let whole = stroops / STROOPS_PER_TOKEN;
        let frac = (stroops % STROOPS_PER_TOKEN) / 100_000;
        format!("{} stroops ({}.{:02} BLUB)", stroops, whole, frac)
    }
}
