//! Stake phase executor.
//!
//! Invokes `stake_minted_blub` on the staking contract, crediting the
//! minted amount to the user's lock entry. Signed by the admin key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::soroban::scval::ScVal;
use crate::soroban::tx::{Keypair, RemoteCallError, TxDispatcher};
use crate::units;

/// One stake attempt, submit through confirmation. Returns the confirmed
/// transaction hash.
#[async_trait]
pub trait StakeOperation: Send + Sync {
    async fn stake_minted(
        &self,
        user: &str,
        lock_index: u32,
        amount: u128,
    ) -> Result<String, RemoteCallError>;
}

pub struct StakeInvoker {
    dispatcher: Arc<TxDispatcher>,
    admin: Keypair,
    staking_contract: String,
}

impl StakeInvoker {
    pub fn new(
        dispatcher: Arc<TxDispatcher>,
        admin: Keypair,
        staking_contract: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            admin,
            staking_contract: staking_contract.into(),
        }
    }
}

#[async_trait]
impl StakeOperation for StakeInvoker {
    async fn stake_minted(
        &self,
        user: &str,
        lock_index: u32,
        amount: u128,
    ) -> Result<String, RemoteCallError> {
        info!(
            lock_index,
            user,
            amount = %units::format_amount(amount),
            "staking minted BLUB"
        );
        let args = vec![
            ScVal::Address(self.admin.public_key()),
            ScVal::Address(user.to_string()),
            ScVal::U32(lock_index),
            ScVal::I128(i128::try_from(amount).unwrap_or(i128::MAX)),
        ];
        let hash = self
            .dispatcher
            .invoke(&self.admin, &self.staking_contract, "stake_minted_blub", args)
            .await?;
        info!(lock_index, tx = %hash, "stake confirmed");
        Ok(hash)
    }
}
