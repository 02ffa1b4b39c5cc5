//! Transaction construction, signing, and submission.
//!
//! Builds classic and Soroban transaction envelopes directly in XDR, scoped
//! to the two operation kinds this service submits: contract invocations and
//! claimable-balance claims. Soroban invocations go through the full
//! simulate / sign / send / confirm pipeline; simulation output (resource
//! data, auth entries, fee) is spliced into the envelope as raw XDR.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::horizon::HorizonClient;

use super::rpc::{RpcError, SendStatus, SimulateResponse, SorobanRpcClient, TxStatus};
use super::scval::{put_i64, put_u32, put_u64, put_var_bytes, EncodeError, ScVal};
use super::strkey::{self, StrkeyError};

/// Flat fee per Soroban invocation before the simulated resource fee is
/// added on top.
const BASE_FEE: u32 = 50_000;

const CONFIRM_ATTEMPTS: u32 = 30;
const CONFIRM_INTERVAL: Duration = Duration::from_secs(2);

const ENVELOPE_TYPE_TX: u32 = 2;
const OP_INVOKE_HOST_FUNCTION: u32 = 24;
const OP_CLAIM_CLAIMABLE_BALANCE: u32 = 15;

/// Envelope construction errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("invalid key: {0}")]
    Key(#[from] StrkeyError),

    #[error("argument encoding failed: {0}")]
    Args(#[from] EncodeError),

    #[error("invalid simulation payload: {0}")]
    Simulation(String),
}

/// How one remote invocation attempt failed. Every kind is retried the same
/// way, but they are logged and reported distinctly.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    /// Transport or node-side hiccup; a later attempt may succeed.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The network rejected or failed the transaction.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The confirmation budget ran out with the outcome still unknown.
    #[error("confirmation timeout: {0}")]
    Timeout(String),
}

impl From<RpcError> for RemoteCallError {
    fn from(e: RpcError) -> Self {
        RemoteCallError::Transient(e.to_string())
    }
}

impl From<TxError> for RemoteCallError {
    fn from(e: TxError) -> Self {
        RemoteCallError::Rejected(e.to_string())
    }
}

/// ed25519 signing identity with strkey accessors.
pub struct Keypair {
    signing: SigningKey,
    public: [u8; 32],
}

impl Keypair {
    /// Parse an `S...` secret seed.
    pub fn from_secret(seed_strkey: &str) -> Result<Self, TxError> {
        let seed = strkey::decode_seed(seed_strkey.trim())?;
        Ok(Self::from_seed(seed))
    }

    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let public = signing.verifying_key().to_bytes();
        Self { signing, public }
    }

    fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let public = signing.verifying_key().to_bytes();
        Self { signing, public }
    }

    /// `G...` address of this key.
    pub fn public_key(&self) -> String {
        strkey::encode_account(&self.public)
    }

    /// `S...` form of the seed.
    pub fn secret_seed(&self) -> String {
        strkey::encode_seed(&self.signing.to_bytes())
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public
    }

    /// Last four bytes of the public key, as XDR decorated signatures carry.
    pub fn signature_hint(&self) -> [u8; 4] {
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&self.public[28..]);
        hint
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

/// One operation in a transaction.
pub enum Operation {
    /// `InvokeHostFunctionOp` calling a contract function.
    InvokeContract {
        contract: [u8; 32],
        function: String,
        args: Vec<ScVal>,
    },
    /// `ClaimClaimableBalanceOp`; `balance_id` is the raw
    /// `ClaimableBalanceID` XDR, which is exactly the hex-decoded id string
    /// Horizon reports.
    ClaimClaimableBalance { balance_id: Vec<u8> },
}

/// A transaction under construction. Auth entries and the Soroban resource
/// ext start empty and are filled in from simulation output.
pub struct Transaction {
    source: [u8; 32],
    fee: u32,
    sequence: i64,
    time_bounds: (u64, u64),
    operations: Vec<Operation>,
    soroban_ext: Option<Vec<u8>>,
    auth: Vec<Vec<u8>>,
}

impl Transaction {
    pub fn new(source: [u8; 32], sequence: i64, fee: u32) -> Self {
        Self {
            source,
            fee,
            sequence,
            time_bounds: (0, 0),
            operations: Vec::new(),
            soroban_ext: None,
            auth: Vec::new(),
        }
    }

    pub fn set_time_bounds(&mut self, min: u64, max: u64) {
        self.time_bounds = (min, max);
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    /// Splice simulation output into the envelope: resource data into the
    /// ext, auth entries into the invocation, and the resource fee on top of
    /// the base fee.
    pub fn apply_simulation(&mut self, sim: &SimulateResponse) -> Result<(), TxError> {
        if let Some(data) = &sim.transaction_data {
            let decoded = BASE64
                .decode(data)
                .map_err(|e| TxError::Simulation(format!("transactionData: {e}")))?;
            self.soroban_ext = Some(decoded);
        }
        let resource_fee: u64 = sim
            .min_resource_fee
            .as_deref()
            .unwrap_or("0")
            .parse()
            .unwrap_or(0);
        self.fee = self.fee.saturating_add(resource_fee as u32);
        if let Some(result) = sim.results.first() {
            self.auth = result
                .auth
                .iter()
                .map(|entry| BASE64.decode(entry))
                .collect::<Result<_, _>>()
                .map_err(|e| TxError::Simulation(format!("auth entry: {e}")))?;
        }
        Ok(())
    }

    /// Base64 envelope with no signatures, as `simulateTransaction` expects.
    pub fn unsigned_envelope(&self) -> Result<String, TxError> {
        Ok(BASE64.encode(self.envelope_xdr(&[])?))
    }

    /// Sign for the given network and return the base64 envelope.
    pub fn sign(&self, keypair: &Keypair, network_passphrase: &str) -> Result<String, TxError> {
        let hash = self.hash(network_passphrase)?;
        let signature = keypair.sign(&hash);
        let envelope = self.envelope_xdr(&[(keypair.signature_hint(), signature)])?;
        Ok(BASE64.encode(envelope))
    }

    /// Network-scoped signing hash:
    /// `sha256(network_id || ENVELOPE_TYPE_TX || tx)`.
    pub fn hash(&self, network_passphrase: &str) -> Result<[u8; 32], TxError> {
        let network_id = Sha256::digest(network_passphrase.as_bytes());
        let mut payload = Vec::new();
        payload.extend_from_slice(&network_id);
        put_u32(&mut payload, ENVELOPE_TYPE_TX);
        self.write_tx(&mut payload)?;
        Ok(Sha256::digest(&payload).into())
    }

    fn envelope_xdr(&self, signatures: &[([u8; 4], [u8; 64])]) -> Result<Vec<u8>, TxError> {
        let mut out = Vec::new();
        put_u32(&mut out, ENVELOPE_TYPE_TX);
        self.write_tx(&mut out)?;
        put_u32(&mut out, signatures.len() as u32);
        for (hint, signature) in signatures {
            out.extend_from_slice(hint);
            put_var_bytes(&mut out, signature);
        }
        Ok(out)
    }

    fn write_tx(&self, out: &mut Vec<u8>) -> Result<(), TxError> {
        // MuxedAccount, KEY_TYPE_ED25519.
        put_u32(out, 0);
        out.extend_from_slice(&self.source);
        put_u32(out, self.fee);
        put_i64(out, self.sequence);
        // Preconditions: PRECOND_TIME with explicit bounds.
        put_u32(out, 1);
        put_u64(out, self.time_bounds.0);
        put_u64(out, self.time_bounds.1);
        // MEMO_NONE.
        put_u32(out, 0);
        put_u32(out, self.operations.len() as u32);
        for op in &self.operations {
            self.write_op(op, out)?;
        }
        match &self.soroban_ext {
            Some(data) => {
                put_u32(out, 1);
                out.extend_from_slice(data);
            }
            None => put_u32(out, 0),
        }
        Ok(())
    }

    fn write_op(&self, op: &Operation, out: &mut Vec<u8>) -> Result<(), TxError> {
        // Per-op source account absent.
        put_u32(out, 0);
        match op {
            Operation::InvokeContract {
                contract,
                function,
                args,
            } => {
                put_u32(out, OP_INVOKE_HOST_FUNCTION);
                // HOST_FUNCTION_TYPE_INVOKE_CONTRACT.
                put_u32(out, 0);
                // InvokeContractArgs: contract SCAddress, symbol, args.
                put_u32(out, 1);
                out.extend_from_slice(contract);
                put_var_bytes(out, function.as_bytes());
                put_u32(out, args.len() as u32);
                for arg in args {
                    arg.write_xdr(out)?;
                }
                put_u32(out, self.auth.len() as u32);
                for entry in &self.auth {
                    out.extend_from_slice(entry);
                }
            }
            Operation::ClaimClaimableBalance { balance_id } => {
                put_u32(out, OP_CLAIM_CLAIMABLE_BALANCE);
                out.extend_from_slice(balance_id);
            }
        }
        Ok(())
    }
}

/// Drives a contract invocation end to end against one network.
pub struct TxDispatcher {
    rpc: Arc<SorobanRpcClient>,
    horizon: Arc<HorizonClient>,
    network_passphrase: String,
}

impl TxDispatcher {
    pub fn new(
        rpc: Arc<SorobanRpcClient>,
        horizon: Arc<HorizonClient>,
        network_passphrase: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            horizon,
            network_passphrase: network_passphrase.into(),
        }
    }

    /// Simulate, sign, send, and confirm one contract call. Returns the hash
    /// of the confirmed transaction.
    pub async fn invoke(
        &self,
        signer: &Keypair,
        contract_id: &str,
        function: &str,
        args: Vec<ScVal>,
    ) -> Result<String, RemoteCallError> {
        let contract = strkey::decode_contract(contract_id).map_err(TxError::Key)?;

        let account = signer.public_key();
        let sequence = self
            .horizon
            .account_sequence(&account)
            .await
            .map_err(|e| RemoteCallError::Transient(format!("sequence fetch: {e}")))?;

        let mut tx = Transaction::new(signer.public_bytes(), sequence + 1, BASE_FEE);
        tx.push(Operation::InvokeContract {
            contract,
            function: function.to_string(),
            args,
        });

        debug!(function, contract = contract_id, "simulating transaction");
        let sim = self.rpc.simulate_transaction(&tx.unsigned_envelope()?).await?;
        if let Some(err) = &sim.error {
            return Err(RemoteCallError::Rejected(format!("simulation failed: {err}")));
        }
        tx.apply_simulation(&sim)?;

        let envelope = tx.sign(signer, &self.network_passphrase)?;
        debug!(function, fee = tx.fee(), "submitting transaction");
        let send = self.rpc.send_transaction(&envelope).await?;
        match send.status {
            SendStatus::Pending => {}
            SendStatus::Duplicate => {
                // Already in flight from an earlier attempt; poll it through.
                warn!(hash = %send.hash, "duplicate submission, confirming existing transaction");
            }
            SendStatus::Error => {
                let detail = send
                    .error_result_xdr
                    .unwrap_or_else(|| "no error xdr".to_string());
                return Err(RemoteCallError::Rejected(format!("submission rejected: {detail}")));
            }
            SendStatus::TryAgainLater | SendStatus::Unknown => {
                return Err(RemoteCallError::Transient(format!(
                    "send status {:?}",
                    send.status
                )));
            }
        }

        self.wait_for_confirmation(&send.hash).await
    }

    /// Poll `getTransaction` until the transaction lands, fails, or the
    /// budget runs out. Poll errors keep the loop going; only an on-chain
    /// FAILED ends it early.
    async fn wait_for_confirmation(&self, hash: &str) -> Result<String, RemoteCallError> {
        for attempt in 1..=CONFIRM_ATTEMPTS {
            match self.rpc.get_transaction(hash).await {
                Ok(tx) => match tx.status {
                    TxStatus::Success => {
                        info!(%hash, attempt, "transaction confirmed");
                        return Ok(hash.to_string());
                    }
                    TxStatus::Failed => {
                        let detail = tx.result_xdr.unwrap_or_else(|| "no result xdr".to_string());
                        return Err(RemoteCallError::Rejected(format!(
                            "transaction failed on-chain: {detail}"
                        )));
                    }
                    TxStatus::NotFound | TxStatus::Unknown => {}
                },
                Err(e) => {
                    warn!(%hash, attempt, error = %e, "confirmation poll failed");
                }
            }
            if attempt < CONFIRM_ATTEMPTS {
                tokio::time::sleep(CONFIRM_INTERVAL).await;
            }
        }
        Err(RemoteCallError::Timeout(format!(
            "no confirmation for {hash} after {CONFIRM_ATTEMPTS} polls; it may still land"
        )))
    }
}
