//! Stellar and Soroban plumbing: strkey codec, contract values, JSON-RPC,
//! and transaction assembly.

pub mod rpc;
pub mod scval;
pub mod strkey;
pub mod tx;

pub use rpc::{LedgerQuery, RawEvent, RpcError, SorobanRpcClient};
pub use scval::{DecodeError, ScVal};
pub use tx::{Keypair, Operation, RemoteCallError, Transaction, TxDispatcher};
