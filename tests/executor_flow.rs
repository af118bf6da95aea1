//! Executor scenarios against a mocked RPC: wire format, ATA idempotency,
//! balance pre-check, simulation rejection, and the dry-run gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};

use launch_sniper::config::Config;
use launch_sniper::decode::TransactionRecord;
use launch_sniper::errors::{Result, SniperError};
use launch_sniper::executor::{ExecutionOutcome, LaunchpadKeys, SnipeExecutor};
use launch_sniper::rpc::{AccountSummary, ChainRpc, SimulationOutcome};
use launch_sniper::types::BuyOrder;
use launch_sniper::wallet::WalletManager;

/// Scripted RPC double. Records simulated and sent transactions.
struct ScriptedRpc {
    balance: u64,
    user_ata_exists: bool,
    simulation_err: Option<String>,
    simulated: Mutex<Vec<Transaction>>,
    sent: Mutex<Vec<Transaction>>,
    send_calls: AtomicU64,
}

impl ScriptedRpc {
    fn healthy(balance: u64, user_ata_exists: bool) -> Self {
        Self {
            balance,
            user_ata_exists,
            simulation_err: None,
            simulated: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }
    async fn current_slot(&self) -> Result<u64> {
        Ok(1)
    }
    async fn balance(&self, _key: &Pubkey) -> Result<u64> {
        Ok(self.balance)
    }
    async fn account_summary(&self, _key: &Pubkey) -> Result<Option<AccountSummary>> {
        unimplemented!()
    }
    async fn account_exists(&self, _key: &Pubkey) -> Result<bool> {
        Ok(self.user_ata_exists)
    }
    async fn transaction_record(&self, _signature: &str) -> Result<TransactionRecord> {
        unimplemented!()
    }
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome> {
        self.simulated.lock().unwrap().push(tx.clone());
        Ok(SimulationOutcome {
            err: self.simulation_err.clone(),
            logs: vec!["Program log: buy path".into()],
            units_consumed: Some(42_000),
        })
    }
    async fn send_and_confirm(&self, tx: &Transaction, _deadline: Duration) -> Result<Signature> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(tx.clone());
        Ok(Signature::from([9u8; 64]))
    }
}

fn executor_with(rpc: Arc<ScriptedRpc>, dry_run: bool) -> SnipeExecutor {
    let cfg = Config::default();
    SnipeExecutor::new(
        rpc,
        Arc::new(WalletManager::new_random()),
        LaunchpadKeys::from_config(&cfg).unwrap(),
        Duration::from_secs(30),
        dry_run,
    )
}

fn order() -> BuyOrder {
    BuyOrder::new(Pubkey::new_unique(), 10_000_000)
}

#[tokio::test]
async fn existing_ata_means_single_instruction() {
    let rpc = Arc::new(ScriptedRpc::healthy(1_000_000_000, true));
    let executor = executor_with(rpc.clone(), false);

    let outcome = executor.execute(&order()).await.unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Submitted(_)));

    let simulated = rpc.simulated.lock().unwrap();
    assert_eq!(simulated.len(), 1);
    // No ATA-create prepended: the buy is the only instruction.
    assert_eq!(simulated[0].message.instructions.len(), 1);
}

#[tokio::test]
async fn missing_ata_prepends_creation() {
    let rpc = Arc::new(ScriptedRpc::healthy(1_000_000_000, false));
    let executor = executor_with(rpc.clone(), false);

    executor.execute(&order()).await.unwrap();

    let simulated = rpc.simulated.lock().unwrap();
    assert_eq!(simulated[0].message.instructions.len(), 2);
    // The ATA-create targets the associated-token program; the buy comes last.
    let sent = rpc.sent.lock().unwrap();
    assert_eq!(sent[0].message.instructions.len(), 2);
}

#[tokio::test]
async fn buy_instruction_carries_wire_payload_and_account_order() {
    let cfg = Config::default();
    let rpc = Arc::new(ScriptedRpc::healthy(1_000_000_000, true));
    let executor = executor_with(rpc.clone(), false);
    let buy = order();

    let (instruction, accounts) = executor.build_buy_instruction(&buy).unwrap();

    assert_eq!(instruction.program_id, cfg.launchpad_program().unwrap());
    assert_eq!(instruction.data.len(), 24);
    assert_eq!(&instruction.data[0..8], &cfg.buy_discriminator().unwrap());
    assert_eq!(
        i64::from_le_bytes(instruction.data[8..16].try_into().unwrap()),
        10_000_000
    );
    assert_eq!(
        i64::from_le_bytes(instruction.data[16..24].try_into().unwrap()),
        -1
    );

    assert_eq!(instruction.accounts.len(), 12);
    assert_eq!(instruction.accounts[2].pubkey, buy.mint);
    assert_eq!(instruction.accounts[6].pubkey, executor.payer());
    assert!(instruction.accounts[6].is_signer);
    assert_eq!(instruction.accounts[11].pubkey, cfg.launchpad_program().unwrap());

    // Derivation is stable for the same mint.
    assert_eq!(executor.derive_accounts(&buy.mint), accounts);
}

#[tokio::test]
async fn insufficient_balance_fails_without_sending() {
    let rpc = Arc::new(ScriptedRpc::healthy(5_000_000, true));
    let executor = executor_with(rpc.clone(), false);

    let err = executor.execute(&order()).await.unwrap_err();
    match err {
        SniperError::InsufficientBalance { have, need } => {
            assert_eq!(have, 5_000_000);
            assert!(need > 10_000_000);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert!(rpc.simulated.lock().unwrap().is_empty());
    assert_eq!(rpc.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn simulation_rejection_aborts_submission() {
    let rpc = Arc::new(ScriptedRpc {
        simulation_err: Some("custom program error: 0x1".into()),
        ..ScriptedRpc::healthy(1_000_000_000, true)
    });
    let executor = executor_with(rpc.clone(), false);

    let err = executor.execute(&order()).await.unwrap_err();
    match err {
        SniperError::SimulationRejected(msg) => {
            assert!(msg.contains("custom program error"));
            // Provider logs ride along for the caller.
            assert!(msg.contains("buy path"));
        }
        other => panic!("expected SimulationRejected, got {other:?}"),
    }
    assert_eq!(rpc.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dry_run_simulates_but_never_sends() {
    let rpc = Arc::new(ScriptedRpc::healthy(1_000_000_000, true));
    let executor = executor_with(rpc.clone(), true);

    let outcome = executor.execute(&order()).await.unwrap();
    assert!(matches!(outcome, ExecutionOutcome::DryRun));
    assert_eq!(rpc.simulated.lock().unwrap().len(), 1);
    assert_eq!(rpc.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn live_send_is_signed() {
    let rpc = Arc::new(ScriptedRpc::healthy(1_000_000_000, true));
    let executor = executor_with(rpc.clone(), false);

    let outcome = executor.execute(&order()).await.unwrap();
    let ExecutionOutcome::Submitted(signature) = outcome else {
        panic!("expected submission");
    };
    assert_eq!(signature, Signature::from([9u8; 64]));

    let sent = rpc.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    // Fee payer signed: the first signature slot is populated and verifies.
    assert_ne!(sent[0].signatures[0], Signature::default());
    sent[0].verify().expect("payer signature verifies");
}
