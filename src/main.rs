//! BLUB Bot - Soroban Lock Event Processor
//!
//! Watches the staking contract for `lock` events and runs the follow-up
//! workflow for each one: mint BLUB to the staking contract, then invoke
//! the stake entrypoint for the locker.
//!
//! Run modes:
//!   cargo run                    - Show usage
//!   cargo run -- run             - Start the event processing loop
//!   cargo run -- validate        - Check configuration and connectivity
//!   cargo run -- stats           - Show processing statistics
//!   cargo run -- keygen          - Generate a new Stellar keypair

use blub_bot::bot::{
    BlubMinter, BotService, EventPoller, EventStore, Orchestrator, OrchestratorConfig, StakeInvoker,
};
use blub_bot::config::Config;
use blub_bot::horizon::HorizonClient;
use blub_bot::logging;
use blub_bot::soroban::{Keypair, SorobanRpcClient, TxDispatcher};
use dotenv::dotenv;
use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "run" => cmd_run().await,
        "validate" => cmd_validate().await,
        "stats" => cmd_stats(),
        "keygen" => cmd_keygen(),
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("BLUB Bot - Soroban Lock Event Processor");
    println!();
    println!("Usage:");
    println!("  blub-bot run         Start the event processing loop");
    println!("  blub-bot validate    Check configuration and connectivity");
    println!("  blub-bot stats       Show processing statistics");
    println!("  blub-bot keygen      Generate a new Stellar keypair");
    println!();
    println!("Environment Variables:");
    println!("  SOROBAN_RPC_URL            Soroban RPC endpoint (required)");
    println!("  HORIZON_URL                Horizon API endpoint (required)");
    println!("  NETWORK_PASSPHRASE         Network passphrase for signing (required)");
    println!("  STAKING_CONTRACT_ID        Staking contract address (required)");
    println!("  BLUB_TOKEN_ADDRESS         BLUB token contract address (required)");
    println!("  ADMIN_SECRET_KEY           Admin signing seed (required)");
    println!("  BLUB_DEPLOYER_SECRET_KEY   Distributor signing seed (required)");
    println!("  NETWORK                    mainnet or testnet (default: mainnet)");
    println!("  DATABASE_PATH              SQLite database path (default: bot_events.db)");
    println!("  POLL_INTERVAL              Seconds between ledger scans (default: 5)");
    println!("  START_LEDGER               First ledger to scan, 0 = current (default: 0)");
    println!("  BLUB_MINT_PERCENTAGE       BLUB minted per locked token (default: 1.1)");
    println!("  LOG_LEVEL                  trace|debug|info|warn|error (default: info)");
    println!("  LOG_JSON                   Emit JSON logs when set to 1");
}

async fn cmd_run() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let admin = match Keypair::from_secret(&config.admin_secret_key) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Invalid ADMIN_SECRET_KEY: {}", e);
            std::process::exit(1);
        }
    };
    let distributor = match Keypair::from_secret(&config.blub_distributor_secret_key) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Invalid BLUB_DEPLOYER_SECRET_KEY: {}", e);
            std::process::exit(1);
        }
    };

    let store = match EventStore::new(&config.database_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.database_path, e);
            std::process::exit(1);
        }
    };

    let rpc = Arc::new(SorobanRpcClient::new(&config.soroban_rpc_url));
    let horizon = Arc::new(HorizonClient::new(&config.horizon_url));
    let dispatcher = Arc::new(TxDispatcher::new(
        rpc.clone(),
        horizon,
        &config.network_passphrase,
    ));

    let minter = Arc::new(BlubMinter::new(
        dispatcher.clone(),
        distributor,
        &config.blub_token_address,
        &config.staking_contract_id,
    ));
    let staker = Arc::new(StakeInvoker::new(
        dispatcher,
        admin,
        &config.staking_contract_id,
    ));

    let orchestrator = Orchestrator::new(
        store.clone(),
        minter,
        staker,
        OrchestratorConfig {
            mint_percent_bps: config.mint_percent_bps,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            settle_delay: config.settle_delay,
        },
    );

    let poller = match EventPoller::new(
        rpc,
        &config.staking_contract_id,
        config.batch_size,
        config.start_ledger,
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to reach Soroban RPC: {}", e);
            std::process::exit(1);
        }
    };

    let mut service = BotService::new(
        poller,
        orchestrator,
        store,
        config.poll_interval,
        config.retry_delay,
    );

    let running = service.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("Shutting down...");
            running.store(false, Ordering::SeqCst);
        }
    });

    config.print_summary();
    println!();
    println!("Watching for lock events on {}...", config.staking_contract_id);
    println!("Press Ctrl+C to stop");
    println!();

    service.run().await;

    println!("Stopped.");
}

async fn cmd_validate() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    config.print_summary();
    println!();
    println!("Checks:");

    let mut failures = 0;

    let admin = Keypair::from_secret(&config.admin_secret_key);
    match &admin {
        Ok(k) => println!("  Admin key: OK ({})", k.public_key()),
        Err(e) => {
            println!("  Admin key: FAILED ({})", e);
            failures += 1;
        }
    }

    match Keypair::from_secret(&config.blub_distributor_secret_key) {
        Ok(k) => println!("  Distributor key: OK ({})", k.public_key()),
        Err(e) => {
            println!("  Distributor key: FAILED ({})", e);
            failures += 1;
        }
    }

    let rpc = SorobanRpcClient::new(&config.soroban_rpc_url);
    match rpc.get_latest_ledger().await {
        Ok(seq) => println!("  Soroban RPC: OK (ledger {})", seq),
        Err(e) => {
            println!("  Soroban RPC: FAILED ({})", e);
            failures += 1;
        }
    }

    if let Ok(admin) = &admin {
        let horizon = HorizonClient::new(&config.horizon_url);
        match horizon.account_sequence(&admin.public_key()).await {
            Ok(seq) => println!("  Horizon: OK (admin sequence {})", seq),
            Err(e) => {
                println!("  Horizon: FAILED ({})", e);
                failures += 1;
            }
        }
    }

    println!();
    if failures == 0 {
        println!("All checks passed.");
    } else {
        println!("{} check(s) failed.", failures);
        std::process::exit(1);
    }
}

fn cmd_stats() {
    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "bot_events.db".to_string());

    let store = match EventStore::new(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open database {}: {}", path, e);
            std::process::exit(1);
        }
    };

    match store.stats() {
        Ok(stats) => {
            println!("=== BLUB Bot Statistics ===");
            println!();
            println!("Database: {}", path);
            println!();
            println!("  Total Events: {}", stats.total);
            println!("  Processed: {}", stats.processed);
            println!("  Pending: {}", stats.pending);
            println!("  Failed: {}", stats.failed);
        }
        Err(e) => {
            eprintln!("Failed to read statistics: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_keygen() {
    let keypair = Keypair::generate();

    println!("=== New Stellar Keypair Generated ===");
    println!();
    println!("Public Key: {}", keypair.public_key());
    println!("Secret Seed: {}", keypair.secret_seed());
    println!();
    println!("IMPORTANT: Save the secret seed securely!");
    println!();
    println!("To use this key as the bot admin, set:");
    println!("  export ADMIN_SECRET_KEY={}", keypair.secret_seed());
}
