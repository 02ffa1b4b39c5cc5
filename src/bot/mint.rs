//! Mint phase executor.
//!
//! "Minting" is a `transfer` on the BLUB token contract from the
//! distributor account into the staking contract, signed by the
//! distributor key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::soroban::scval::ScVal;
use crate::soroban::tx::{Keypair, RemoteCallError, TxDispatcher};
use crate::units;

/// One mint attempt, submit through confirmation. Returns the confirmed
/// transaction hash.
#[async_trait]
pub trait MintOperation: Send + Sync {
    async fn mint_for_lock(
        &self,
        amount: u128,
        lock_index: u32,
        user: &str,
    ) -> Result<String, RemoteCallError>;
}

pub struct BlubMinter {
    dispatcher: Arc<TxDispatcher>,
    distributor: Keypair,
    token_contract: String,
    staking_contract: String,
}

impl BlubMinter {
    pub fn new(
        dispatcher: Arc<TxDispatcher>,
        distributor: Keypair,
        token_contract: impl Into<String>,
        staking_contract: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            distributor,
            token_contract: token_contract.into(),
            staking_contract: staking_contract.into(),
        }
    }
}

#[async_trait]
impl MintOperation for BlubMinter {
    async fn mint_for_lock(
        &self,
        amount: u128,
        lock_index: u32,
        user: &str,
    ) -> Result<String, RemoteCallError> {
        info!(
            lock_index,
            user,
            amount = %units::format_amount(amount),
            "minting BLUB into staking contract"
        );
        let args = vec![
            ScVal::Address(self.distributor.public_key()),
            ScVal::Address(self.staking_contract.clone()),
            ScVal::I128(i128::try_from(amount).unwrap_or(i128::MAX)),
        ];
        let hash = self
            .dispatcher
            .invoke(&self.distributor, &self.token_contract, "transfer", args)
            .await?;
        info!(lock_index, tx = %hash, "mint confirmed");
        Ok(hash)
    }
}
