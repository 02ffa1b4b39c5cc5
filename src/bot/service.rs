//! Service loop wiring the poller and orchestrator together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::orchestrator::Orchestrator;
use super::poller::{EventPoller, PollOutcome};
use super::store::EventStore;

pub struct BotService {
    poller: EventPoller,
    orchestrator: Orchestrator,
    store: Arc<EventStore>,
    poll_interval: Duration,
    retry_delay: Duration,
    running: Arc<AtomicBool>,
}

impl BotService {
    pub fn new(
        poller: EventPoller,
        orchestrator: Orchestrator,
        store: Arc<EventStore>,
        poll_interval: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            poller,
            orchestrator,
            store,
            poll_interval,
            retry_delay,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag handle for the shutdown signal; clearing it stops the loop at
    /// the next cycle boundary without interrupting in-flight work.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Recover pending records, then poll until the shutdown flag clears.
    pub async fn run(&mut self) {
        self.running.store(true, Ordering::SeqCst);

        let resumed = self.orchestrator.resume_pending().await;
        if resumed > 0 {
            info!(resumed, "startup recovery complete");
        }

        info!(cursor = self.poller.cursor(), "entering poll loop");
        while self.running.load(Ordering::SeqCst) {
            let delay = self.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(delay).await;
        }
        info!("poll loop stopped");
    }

    /// One poll-and-process cycle. Returns how long to wait before the next
    /// one: the regular interval normally, the shorter retry delay after a
    /// failed fetch.
    pub async fn tick(&mut self) -> Duration {
        match self.poller.poll_once().await {
            PollOutcome::Failed => self.retry_delay,
            PollOutcome::Quiet => self.poll_interval,
            PollOutcome::Events(events) => {
                for event in &events {
                    let outcome = self.orchestrator.process_event(event).await;
                    debug!(?outcome, lock_index = event.lock_index, "event handled");
                }
                match self.store.stats() {
                    Ok(stats) => info!(
                        total = stats.total,
                        processed = stats.processed,
                        pending = stats.pending,
                        failed = stats.failed,
                        "store totals"
                    ),
                    Err(e) => warn!(error = %e, "failed to read store totals"),
                }
                self.poll_interval
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::mint::MintOperation;
    use crate::bot::orchestrator::OrchestratorConfig;
    use crate::bot::stake::StakeOperation;
    use crate::soroban::rpc::{MockLedgerQuery, RawEvent};
    use crate::soroban::scval::ScVal;
    use crate::soroban::strkey;
    use crate::soroban::tx::RemoteCallError;
    use async_trait::async_trait;
    use serde_json::Value as Json;

    struct FixedHash(&'static str);

    #[async_trait]
    impl MintOperation for FixedHash {
        async fn mint_for_lock(
            &self,
            _amount: u128,
            _lock_index: u32,
            _user: &str,
        ) -> Result<String, RemoteCallError> {
            Ok(self.0.to_string())
        }
    }

    #[async_trait]
    impl StakeOperation for FixedHash {
        async fn stake_minted(
            &self,
            _user: &str,
            _lock_index: u32,
            _amount: u128,
        ) -> Result<String, RemoteCallError> {
            Ok(self.0.to_string())
        }
    }

    fn user() -> String {
        strkey::encode_account(&[6u8; 32])
    }

    fn lock_raw_event(ledger: u32) -> RawEvent {
        let topic = ScVal::Symbol("lock".to_string()).to_xdr_base64().unwrap();
        let value = ScVal::Map(vec![
            (
                ScVal::Symbol("user".to_string()),
                ScVal::Address(user()),
            ),
            (ScVal::Symbol("amount".to_string()), ScVal::I128(100_0000000)),
            (ScVal::Symbol("lock_index".to_string()), ScVal::U32(3)),
        ])
        .to_xdr_base64()
        .unwrap();
        RawEvent {
            id: format!("{ledger}000-0000000001"),
            ledger,
            topic: vec![Json::String(topic)],
            value: Json::String(value),
        }
    }

    async fn service_with(rpc: MockLedgerQuery, store: Arc<EventStore>) -> BotService {
        let poller = EventPoller::new(Arc::new(rpc), "CCONTRACT", 100, 50)
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(FixedHash("H1")),
            Arc::new(FixedHash("H2")),
            OrchestratorConfig {
                retry_delay: Duration::ZERO,
                settle_delay: Duration::ZERO,
                ..OrchestratorConfig::default()
            },
        );
        BotService::new(
            poller,
            orchestrator,
            store,
            Duration::from_secs(5),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn tick_processes_events_end_to_end() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(60));
        rpc.expect_contract_events()
            .returning(|_, _, _| Ok(vec![lock_raw_event(55)]));
        let store = Arc::new(EventStore::in_memory().unwrap());
        let mut service = service_with(rpc, store.clone()).await;

        let delay = service.tick().await;
        assert_eq!(delay, Duration::from_secs(5));

        let records = store.unprocessed().unwrap();
        assert!(records.is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.processed, 1);

        let record = store.get(1).unwrap().unwrap();
        assert_eq!(record.user_address, user());
        assert_eq!(record.mint_amount, 110_0000000);
        assert_eq!(record.mint_tx.as_deref(), Some("H1"));
        assert_eq!(record.stake_tx.as_deref(), Some("H2"));
    }

    #[tokio::test]
    async fn tick_backs_off_after_fetch_failure() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger()
            .returning(|| Err(crate::soroban::rpc::RpcError::Malformed("down".to_string())));
        let store = Arc::new(EventStore::in_memory().unwrap());
        let mut service = service_with(rpc, store).await;

        let delay = service.tick().await;
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn redelivered_batch_is_idempotent() {
        let mut rpc = MockLedgerQuery::new();
        let heights = std::sync::Mutex::new(vec![60u32, 70].into_iter());
        rpc.expect_latest_ledger()
            .returning(move || Ok(heights.lock().unwrap().next().unwrap_or(70)));
        rpc.expect_contract_events()
            .returning(|_, _, _| Ok(vec![lock_raw_event(55)]));
        let store = Arc::new(EventStore::in_memory().unwrap());
        let mut service = service_with(rpc, store.clone()).await;

        service.tick().await;
        // The same event arrives again in a later range.
        service.tick().await;

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.processed, 1);
    }
}
