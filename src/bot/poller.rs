//! Ledger cursor poller.
//!
//! Owns the high-water cursor over scanned ledgers. Each cycle compares the
//! chain height against the cursor, fetches contract events for the unseen
//! range, and hands decoded lock events to the caller. The cursor advances
//! to the observed height whenever the fetch succeeds, whether or not any
//! events qualified; a failed cycle leaves it untouched so the same range is
//! rescanned next time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::soroban::rpc::{LedgerQuery, RpcError};

use super::events::extract_lock_event;
use super::types::LockEvent;

/// Result of one poll cycle.
#[derive(Debug)]
pub enum PollOutcome {
    /// No unseen ledgers, or no qualifying events in the scanned range.
    Quiet,
    /// Decoded lock events, in delivery order.
    Events(Vec<LockEvent>),
    /// Height or event fetch failed; the cursor did not move.
    Failed,
}

pub struct EventPoller {
    rpc: Arc<dyn LedgerQuery>,
    contract_id: String,
    batch_size: u32,
    cursor: u32,
}

impl EventPoller {
    /// A `start_ledger` of zero anchors the cursor at the current chain
    /// height, so only events after startup are seen.
    pub async fn new(
        rpc: Arc<dyn LedgerQuery>,
        contract_id: impl Into<String>,
        batch_size: u32,
        start_ledger: u32,
    ) -> Result<Self, RpcError> {
        let cursor = if start_ledger == 0 {
            let latest = rpc.latest_ledger().await?;
            info!(ledger = latest, "starting at current ledger");
            latest
        } else {
            info!(ledger = start_ledger, "starting at configured ledger");
            start_ledger
        };
        Ok(Self {
            rpc,
            contract_id: contract_id.into(),
            batch_size,
            cursor,
        })
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// One scan cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let current = match self.rpc.latest_ledger().await {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "failed to fetch latest ledger");
                return PollOutcome::Failed;
            }
        };
        if current <= self.cursor {
            return PollOutcome::Quiet;
        }

        let from = self.cursor + 1;
        debug!(from, to = current, "scanning ledger range");
        let raw = match self
            .rpc
            .contract_events(from, &self.contract_id, self.batch_size)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, from, to = current, "failed to fetch contract events");
                return PollOutcome::Failed;
            }
        };

        let events: Vec<LockEvent> = raw.iter().filter_map(extract_lock_event).collect();
        self.cursor = current;
        if events.is_empty() {
            PollOutcome::Quiet
        } else {
            info!(count = events.len(), from, to = current, "decoded lock events");
            PollOutcome::Events(events)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soroban::rpc::{MockLedgerQuery, RawEvent};
    use crate::soroban::scval::ScVal;
    use serde_json::Value as Json;

    fn lock_raw_event(ledger: u32) -> RawEvent {
        let topic = ScVal::Symbol("lock".to_string()).to_xdr_base64().unwrap();
        let value = ScVal::Map(vec![
            (
                ScVal::Symbol("user".to_string()),
                ScVal::Address(crate::soroban::strkey::encode_account(&[5u8; 32])),
            ),
            (ScVal::Symbol("amount".to_string()), ScVal::I128(77)),
            (ScVal::Symbol("lock_index".to_string()), ScVal::U32(1)),
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

    async fn poller_at(rpc: MockLedgerQuery, cursor: u32) -> EventPoller {
        EventPoller::new(Arc::new(rpc), "CCONTRACT", 100, cursor)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_ledger_zero_anchors_at_tip() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(4321));
        let poller = EventPoller::new(Arc::new(rpc), "CCONTRACT", 100, 0)
            .await
            .unwrap();
        assert_eq!(poller.cursor(), 4321);
    }

    #[tokio::test]
    async fn no_new_ledgers_is_quiet() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(100));
        rpc.expect_contract_events().times(0);
        let mut poller = poller_at(rpc, 100).await;

        assert!(matches!(poller.poll_once().await, PollOutcome::Quiet));
        assert_eq!(poller.cursor(), 100);
    }

    #[tokio::test]
    async fn height_failure_keeps_cursor() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger()
            .returning(|| Err(RpcError::Malformed("down".to_string())));
        let mut poller = poller_at(rpc, 100).await;

        assert!(matches!(poller.poll_once().await, PollOutcome::Failed));
        assert_eq!(poller.cursor(), 100);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_cursor_for_rescan() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(105));
        rpc.expect_contract_events()
            .withf(|start, _, _| *start == 101)
            .returning(|_, _, _| Err(RpcError::Malformed("down".to_string())));
        let mut poller = poller_at(rpc, 100).await;

        assert!(matches!(poller.poll_once().await, PollOutcome::Failed));
        assert_eq!(poller.cursor(), 100);
    }

    #[tokio::test]
    async fn empty_range_still_advances_cursor() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(105));
        rpc.expect_contract_events().returning(|_, _, _| Ok(vec![]));
        let mut poller = poller_at(rpc, 100).await;

        assert!(matches!(poller.poll_once().await, PollOutcome::Quiet));
        assert_eq!(poller.cursor(), 105);
    }

    #[tokio::test]
    async fn events_advance_cursor_in_same_cycle() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(105));
        rpc.expect_contract_events()
            .withf(|start, contract, limit| *start == 101 && contract == "CCONTRACT" && *limit == 100)
            .returning(|_, _, _| Ok(vec![lock_raw_event(103)]));
        let mut poller = poller_at(rpc, 100).await;

        match poller.poll_once().await {
            PollOutcome::Events(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].ledger, 103);
                assert_eq!(events[0].amount, 77);
            }
            other => panic!("expected events, got {other:?}"),
        }
        assert_eq!(poller.cursor(), 105);
    }

    #[tokio::test]
    async fn non_lock_events_leave_cycle_quiet() {
        let mut rpc = MockLedgerQuery::new();
        rpc.expect_latest_ledger().returning(|| Ok(105));
        rpc.expect_contract_events().returning(|_, _, _| {
            let mut event = lock_raw_event(103);
            event.topic = vec![Json::String(
                ScVal::Symbol("withdraw".to_string()).to_xdr_base64().unwrap(),
            )];
            Ok(vec![event])
        });
        let mut poller = poller_at(rpc, 100).await;

        assert!(matches!(poller.poll_once().await, PollOutcome::Quiet));
        assert_eq!(poller.cursor(), 105);
    }
}
