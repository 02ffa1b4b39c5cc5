//! Claimable Balance Sweeper
//!
//! Claims every claimable balance offered to the distributor account and
//! reports totals by asset. Wallets create claimable balances instead of
//! payments when the recipient is missing a trustline; this sweeps them
//! into the account proper so the bot can spend them.
//!
//! Usage:
//!   claim-balances              Claim everything claimable by the account
//!   DRY_RUN=1 claim-balances    List what would be claimed and exit
//!
//! Environment:
//!   HORIZON_URL                Horizon endpoint (default: https://horizon.stellar.org)
//!   BLUB_DEPLOYER_SECRET_KEY   Signing seed (SECRET_KEY also accepted)
//!   CLAIM_ACCOUNT              Account to sweep (default: derived from the seed)
//!   NETWORK_PASSPHRASE         Signing passphrase (default: mainnet)
//!   DRY_RUN                    Set to 1/true/yes to list without claiming

use blub_bot::config::Network;
use blub_bot::horizon::{ClaimableBalance, HorizonClient};
use blub_bot::soroban::{Keypair, Operation, Transaction};
use dotenv::dotenv;
use std::collections::BTreeMap;
use std::env;

/// Horizon page size while listing balances.
const PAGE_LIMIT: u32 = 200;
/// Claim operations per transaction; Stellar caps a transaction at 100 ops.
const BATCH_SIZE: usize = 80;
/// Fee in stroops per claim operation.
const CLAIM_BASE_FEE: u32 = 1_000;
/// Upper time bound on each batch transaction.
const TX_TIMEOUT_SECS: i64 = 300;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let horizon_url =
        env::var("HORIZON_URL").unwrap_or_else(|_| "https://horizon.stellar.org".to_string());
    let passphrase = env::var("NETWORK_PASSPHRASE")
        .unwrap_or_else(|_| Network::Mainnet.default_passphrase().to_string());
    let dry_run = matches!(
        env::var("DRY_RUN").unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    );

    let secret = env::var("BLUB_DEPLOYER_SECRET_KEY")
        .or_else(|_| env::var("SECRET_KEY"))
        .ok();
    let keypair = match secret.as_deref().map(Keypair::from_secret) {
        Some(Ok(k)) => Some(k),
        Some(Err(e)) => {
            eprintln!("Invalid secret key: {}", e);
            std::process::exit(1);
        }
        None => None,
    };

    let account = match env::var("CLAIM_ACCOUNT")
        .ok()
        .or_else(|| keypair.as_ref().map(|k| k.public_key()))
    {
        Some(a) => a,
        None => {
            eprintln!("Set BLUB_DEPLOYER_SECRET_KEY (or SECRET_KEY), or CLAIM_ACCOUNT for a dry run.");
            std::process::exit(1);
        }
    };

    let horizon = HorizonClient::new(&horizon_url);

    println!("=== Claimable Balance Sweeper ===");
    println!();
    println!("Account: {}", account);
    println!("Horizon: {}", horizon_url);
    println!();

    let records = match horizon.claimable_balances(&account, PAGE_LIMIT).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to list claimable balances: {}", e);
            std::process::exit(1);
        }
    };

    if records.is_empty() {
        println!("Nothing to claim.");
        return;
    }

    print_totals(&records);

    if dry_run {
        println!("Dry run; not claiming. Balance ids:");
        for record in &records {
            println!("  {}", record.id);
        }
        return;
    }

    let keypair = match keypair {
        Some(k) => k,
        None => {
            eprintln!("Claiming requires BLUB_DEPLOYER_SECRET_KEY or SECRET_KEY.");
            std::process::exit(1);
        }
    };
    if keypair.public_key() != account {
        eprintln!(
            "CLAIM_ACCOUNT {} does not match the signing key {}.",
            account,
            keypair.public_key()
        );
        std::process::exit(1);
    }

    claim_all(&horizon, &keypair, &account, &passphrase, &records).await;

    println!("Done.");
}

/// Sum pending amounts per asset. Horizon reports `asset` as
/// `CODE:ISSUER`, or the literal `native` for XLM.
fn print_totals(records: &[ClaimableBalance]) {
    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for record in records {
        let code = record
            .asset
            .split(':')
            .next()
            .unwrap_or("native")
            .to_string();
        let amount: f64 = record.amount.parse().unwrap_or(0.0);
        let entry = totals.entry(code).or_insert((0.0, 0));
        entry.0 += amount;
        entry.1 += 1;
    }

    println!("Found {} claimable balance(s):", records.len());
    for (code, (amount, count)) in &totals {
        println!("  {}: {} across {} balance(s)", code, amount, count);
    }
    println!();
}

/// Claim in batches, each under a fresh sequence number. A failed batch is
/// reported and skipped; later batches still run.
async fn claim_all(
    horizon: &HorizonClient,
    keypair: &Keypair,
    account: &str,
    passphrase: &str,
    records: &[ClaimableBalance],
) {
    for (index, batch) in records.chunks(BATCH_SIZE).enumerate() {
        let mut ops = Vec::new();
        for record in batch {
            match hex::decode(&record.id) {
                Ok(balance_id) => ops.push(Operation::ClaimClaimableBalance { balance_id }),
                Err(e) => eprintln!("Skipping malformed balance id {}: {}", record.id, e),
            }
        }
        if ops.is_empty() {
            continue;
        }

        let sequence = match horizon.account_sequence(account).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Batch {}: failed to fetch sequence: {}", index + 1, e);
                continue;
            }
        };

        let mut tx = Transaction::new(
            keypair.public_bytes(),
            sequence + 1,
            CLAIM_BASE_FEE * ops.len() as u32,
        );
        let deadline = chrono::Utc::now().timestamp() + TX_TIMEOUT_SECS;
        tx.set_time_bounds(0, deadline as u64);
        for op in ops {
            tx.push(op);
        }

        let envelope = match tx.sign(keypair, passphrase) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Batch {}: failed to sign: {}", index + 1, e);
                continue;
            }
        };

        match horizon.submit_transaction(&envelope).await {
            Ok(hash) => {
                println!("Batch {}: SUCCESS {}", index + 1, hash);
                println!("  https://stellar.expert/explorer/public/tx/{}", hash);
            }
            Err(e) => {
                eprintln!("Batch {}: FAILED: {}", index + 1, e);
            }
        }
    }
}
