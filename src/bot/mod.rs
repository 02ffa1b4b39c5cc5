//! The lock-event pipeline.
//!
//! ```text
//!   Soroban RPC -> EventPoller -> extract_lock_event -> Orchestrator
//!                                                         |-- EventStore
//!                                                         |-- BlubMinter  (mint phase)
//!                                                         `-- StakeInvoker (stake phase)
//! ```
//!
//! [`BotService`] owns the loop; one cycle polls unseen ledgers, decodes
//! qualifying events, and drives each one to a terminal outcome before the
//! next cycle starts.

pub mod events;
pub mod mint;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod service;
pub mod stake;
pub mod store;
pub mod types;

pub use events::extract_lock_event;
pub use mint::{BlubMinter, MintOperation};
pub use orchestrator::{derived_mint_amount, Orchestrator, OrchestratorConfig, ProcessOutcome};
pub use poller::{EventPoller, PollOutcome};
pub use service::BotService;
pub use stake::{StakeInvoker, StakeOperation};
pub use store::{EventStore, StoreError};
pub use types::{LockEvent, ProcessedEvent, StoreStats};
