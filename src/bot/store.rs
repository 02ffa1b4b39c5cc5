//! SQLite-backed event store.
//!
//! Durable record of every decoded lock event and its mint/stake lifecycle.
//! The (user, lock index, ledger) triple is unique, which is what makes
//! event redelivery harmless. Amounts are stored as decimal text because
//! they exceed the i64 range SQLite integers offer.

use std::path::Path;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use thiserror::Error;
use tracing::info;

use super::types::{LockEvent, ProcessedEvent, StoreStats};

/// Longest error string persisted per record.
const MAX_ERROR_LEN: usize = 500;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("record not found: {0}")]
    NotFound(i64),

    #[error("duplicate event: user={0} lock_index={1} ledger={2}")]
    Duplicate(String, u32, u32),
}

pub struct EventStore {
    pool: Pool<SqliteConnectionManager>,
}

impl EventStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;
        let store = Self { pool };
        store.run_migrations()?;
        info!(path = %path.display(), "event store ready");
        Ok(store)
    }

    /// In-memory store for tests. Pool size one, since every connection to
    /// `:memory:` is a separate database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS processed_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                lock_index INTEGER NOT NULL,
                duration_minutes INTEGER NOT NULL DEFAULT 0,
                reward_multiplier INTEGER NOT NULL DEFAULT 0,
                event_timestamp INTEGER NOT NULL DEFAULT 0,
                unlock_timestamp INTEGER NOT NULL DEFAULT 0,
                ledger INTEGER NOT NULL,
                transaction_hash TEXT NOT NULL DEFAULT '',
                mint_amount TEXT NOT NULL,
                mint_tx TEXT,
                mint_confirmed_at TEXT,
                stake_tx TEXT,
                stake_confirmed_at TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_address, lock_index, ledger)
            );

            CREATE INDEX IF NOT EXISTS idx_processed_events_processed
                ON processed_events(processed);
            CREATE INDEX IF NOT EXISTS idx_processed_events_ledger
                ON processed_events(ledger);
            "#,
        )?;
        Ok(())
    }

    /// Whether the event's identity triple is already recorded.
    pub fn exists(&self, user: &str, lock_index: u32, ledger: u32) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM processed_events
                 WHERE user_address = ?1 AND lock_index = ?2 AND ledger = ?3",
                params![user, lock_index as i64, ledger as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a fresh record with its derived mint amount. Returns the row
    /// id, or [`StoreError::Duplicate`] when the triple is already present.
    pub fn save(&self, event: &LockEvent, mint_amount: u128) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO processed_events (
                user_address, amount, lock_index, duration_minutes,
                reward_multiplier, event_timestamp, unlock_timestamp, ledger,
                transaction_hash, mint_amount, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                event.user,
                event.amount.to_string(),
                event.lock_index as i64,
                event.duration_minutes as i64,
                event.reward_multiplier as i64,
                event.timestamp as i64,
                event.unlock_timestamp as i64,
                event.ledger as i64,
                event.tx_hash,
                mint_amount.to_string(),
                now,
                now
            ],
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.extended_code == 1555 || inner.extended_code == 2067 =>
            {
                StoreError::Duplicate(event.user.clone(), event.lock_index, event.ledger)
            }
            _ => StoreError::Database(e),
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a confirmed mint transaction.
    pub fn record_mint(&self, id: i64, tx_hash: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE processed_events
             SET mint_tx = ?1, mint_confirmed_at = ?2, updated_at = ?3
             WHERE id = ?4",
            params![tx_hash, Utc::now().to_rfc3339(), Utc::now().timestamp(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Record a confirmed stake transaction and mark the event processed.
    pub fn record_stake(&self, id: i64, tx_hash: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE processed_events
             SET stake_tx = ?1, stake_confirmed_at = ?2, processed = 1, updated_at = ?3
             WHERE id = ?4",
            params![tx_hash, Utc::now().to_rfc3339(), Utc::now().timestamp(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Record a terminal failure message. Any transaction hashes already on
    /// the record stay in place.
    pub fn record_error(&self, id: i64, message: &str) -> Result<(), StoreError> {
        let message: String = message.chars().take(MAX_ERROR_LEN).collect();
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE processed_events
             SET error_message = ?1, updated_at = ?2
             WHERE id = ?3",
            params![message, Utc::now().timestamp(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<ProcessedEvent>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT * FROM processed_events WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records whose stake phase has not completed, oldest first.
    pub fn unprocessed(&self) -> Result<Vec<ProcessedEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM processed_events WHERE processed = 0 ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let (total, processed, failed): (i64, i64, i64) = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(processed), 0),
                COALESCE(SUM(CASE WHEN processed = 0 AND error_message IS NOT NULL
                                  THEN 1 ELSE 0 END), 0)
             FROM processed_events",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(StoreStats {
            total: total as u64,
            processed: processed as u64,
            pending: (total - processed - failed) as u64,
            failed: failed as u64,
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ProcessedEvent> {
    let amount: String = row.get("amount")?;
    let mint_amount: String = row.get("mint_amount")?;
    Ok(ProcessedEvent {
        id: row.get("id")?,
        user_address: row.get("user_address")?,
        amount: amount.parse().unwrap_or_default(),
        lock_index: row.get::<_, i64>("lock_index")? as u32,
        duration_minutes: row.get::<_, i64>("duration_minutes")? as u64,
        reward_multiplier: row.get::<_, i64>("reward_multiplier")? as u64,
        event_timestamp: row.get::<_, i64>("event_timestamp")? as u64,
        unlock_timestamp: row.get::<_, i64>("unlock_timestamp")? as u64,
        ledger: row.get::<_, i64>("ledger")? as u32,
        transaction_hash: row.get("transaction_hash")?,
        mint_amount: mint_amount.parse().unwrap_or_default(),
        mint_tx: row.get("mint_tx")?,
        mint_confirmed_at: row.get("mint_confirmed_at")?,
        stake_tx: row.get("stake_tx")?,
        stake_confirmed_at: row.get("stake_confirmed_at")?,
        processed: row.get::<_, i64>("processed")? != 0,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event(lock_index: u32) -> LockEvent {
        LockEvent {
            user: "GDERSSCKJQPPXUQOZIOXGRVAGNLVPVZCJ2MAX7RCMVMWGRPVAEG7XGTK".to_string(),
            amount: 100_0000000,
            duration_minutes: 60,
            reward_multiplier: 2,
            tx_hash: "abc123".to_string(),
            timestamp: 1_700_000_000,
            lock_index,
            unlock_timestamp: 1_700_003_600,
            ledger: 4500,
        }
    }

    #[test]
    fn save_and_get_round_trip() {
        let store = EventStore::in_memory().unwrap();
        let id = store.save(&test_event(3), 110_0000000).unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.user_address, test_event(3).user);
        assert_eq!(record.amount, 100_0000000);
        assert_eq!(record.mint_amount, 110_0000000);
        assert_eq!(record.lock_index, 3);
        assert_eq!(record.ledger, 4500);
        assert!(!record.processed);
        assert!(record.mint_tx.is_none());
        assert!(record.error_message.is_none());
    }

    #[test]
    fn amounts_beyond_i64_survive() {
        let store = EventStore::in_memory().unwrap();
        let mut event = test_event(1);
        event.amount = u128::MAX - 7;
        let id = store.save(&event, u128::MAX).unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.amount, u128::MAX - 7);
        assert_eq!(record.mint_amount, u128::MAX);
    }

    #[test]
    fn exists_tracks_identity_triple() {
        let store = EventStore::in_memory().unwrap();
        let event = test_event(3);
        assert!(!store.exists(&event.user, 3, 4500).unwrap());

        store.save(&event, 0).unwrap();
        assert!(store.exists(&event.user, 3, 4500).unwrap());
        // A different lock index is a different event.
        assert!(!store.exists(&event.user, 4, 4500).unwrap());
    }

    #[test]
    fn duplicate_triple_is_rejected() {
        let store = EventStore::in_memory().unwrap();
        store.save(&test_event(3), 0).unwrap();
        let err = store.save(&test_event(3), 0).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_, 3, 4500)));
    }

    #[test]
    fn mint_then_stake_lifecycle() {
        let store = EventStore::in_memory().unwrap();
        let id = store.save(&test_event(3), 110).unwrap();

        store.record_mint(id, "H1").unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.mint_tx.as_deref(), Some("H1"));
        assert!(record.mint_confirmed_at.is_some());
        assert!(!record.processed);

        store.record_stake(id, "H2").unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.stake_tx.as_deref(), Some("H2"));
        assert!(record.stake_confirmed_at.is_some());
        assert!(record.processed);
    }

    #[test]
    fn record_error_truncates_and_keeps_hashes() {
        let store = EventStore::in_memory().unwrap();
        let id = store.save(&test_event(3), 110).unwrap();
        store.record_mint(id, "H1").unwrap();

        let long = "x".repeat(800);
        store.record_error(id, &long).unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.error_message.as_ref().unwrap().len(), 500);
        assert_eq!(record.mint_tx.as_deref(), Some("H1"));
    }

    #[test]
    fn updates_on_missing_rows_are_not_found() {
        let store = EventStore::in_memory().unwrap();
        assert!(matches!(
            store.record_mint(99, "H1"),
            Err(StoreError::NotFound(99))
        ));
        assert!(matches!(
            store.record_error(99, "boom"),
            Err(StoreError::NotFound(99))
        ));
    }

    #[test]
    fn unprocessed_excludes_completed_records() {
        let store = EventStore::in_memory().unwrap();
        let first = store.save(&test_event(1), 0).unwrap();
        let second = store.save(&test_event(2), 0).unwrap();
        let third = store.save(&test_event(3), 0).unwrap();

        store.record_stake(second, "H2").unwrap();

        let pending = store.unprocessed().unwrap();
        let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, third]);
    }

    #[test]
    fn stats_split_by_outcome() {
        let store = EventStore::in_memory().unwrap();
        let done = store.save(&test_event(1), 0).unwrap();
        let failed = store.save(&test_event(2), 0).unwrap();
        store.save(&test_event(3), 0).unwrap();

        store.record_stake(done, "H2").unwrap();
        store.record_error(failed, "BLUB minting failed").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn empty_store_stats_are_zero() {
        let store = EventStore::in_memory().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }
}
