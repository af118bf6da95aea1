//! Launchpad buy executor.
//!
//! Builds the fixed 24-byte buy payload, derives the launchpad PDAs and the
//! two associated token accounts, prepends an idempotent user-ATA creation
//! when the account is missing, simulates, signs, and submits at confirmed
//! commitment.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::Signature,
    system_program, sysvar,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{Result, SniperError};
use crate::metrics::{metrics, Timer};
use crate::rpc::ChainRpc;
use crate::types::BuyOrder;
use crate::wallet::WalletManager;

pub const BUY_DATA_LEN: usize = 24;

/// Seeds for the launchpad's two PDAs.
pub const GLOBAL_SEED: &[u8] = b"global";
pub const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";

/// Submission must cover the buy amount plus ATA rent and fees.
const FEE_AND_RENT_HEADROOM: u64 = 3_000_000;

/// Blockhashes stay usable for well over a minute; reusing one for 15 s keeps
/// the hot path off the RPC.
const BLOCKHASH_TTL: Duration = Duration::from_secs(15);

/// Launchpad constants resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct LaunchpadKeys {
    pub program: Pubkey,
    pub fee_vault: Pubkey,
    pub config_authority: Pubkey,
    pub buy_discriminator: [u8; 8],
}

impl LaunchpadKeys {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            program: cfg.launchpad_program()?,
            fee_vault: cfg.fee_vault()?,
            config_authority: cfg.authority()?,
            buy_discriminator: cfg.buy_discriminator()?,
        })
    }
}

/// The canonical 12-entry account list for the launchpad buy, in submission
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyAccounts {
    pub global: Pubkey,
    pub fee_vault: Pubkey,
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub bonding_curve_ata: Pubkey,
    pub user_ata: Pubkey,
    pub payer: Pubkey,
    pub system_program: Pubkey,
    pub token_program: Pubkey,
    pub rent_sysvar: Pubkey,
    pub config_authority: Pubkey,
    pub launchpad_program: Pubkey,
}

impl BuyAccounts {
    pub fn to_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new_readonly(self.global, false),
            AccountMeta::new(self.fee_vault, false),
            AccountMeta::new_readonly(self.mint, false),
            AccountMeta::new(self.bonding_curve, false),
            AccountMeta::new(self.bonding_curve_ata, false),
            AccountMeta::new(self.user_ata, false),
            AccountMeta::new(self.payer, true),
            AccountMeta::new_readonly(self.system_program, false),
            AccountMeta::new_readonly(self.token_program, false),
            AccountMeta::new_readonly(self.rent_sysvar, false),
            AccountMeta::new_readonly(self.config_authority, false),
            AccountMeta::new_readonly(self.launchpad_program, false),
        ]
    }

    /// Every key must be a real address before the instruction is assembled.
    pub fn validate(&self) -> Result<()> {
        let keys = [
            self.global,
            self.fee_vault,
            self.mint,
            self.bonding_curve,
            self.bonding_curve_ata,
            self.user_ata,
            self.payer,
            self.system_program,
            self.token_program,
            self.rent_sysvar,
            self.config_authority,
            self.launchpad_program,
        ];
        for key in keys {
            if key == Pubkey::default() {
                return Err(SniperError::InvalidAddress(
                    "buy account list contains an unset key".into(),
                ));
            }
        }
        Ok(())
    }
}

/// `discriminator[8] || i64_le(amount) || i64_le(sentinel)`, exactly 24 bytes.
pub fn encode_buy_data(discriminator: [u8; 8], amount_native: u64, sentinel: i64) -> [u8; BUY_DATA_LEN] {
    let mut data = [0u8; BUY_DATA_LEN];
    data[0..8].copy_from_slice(&discriminator);
    data[8..16].copy_from_slice(&(amount_native as i64).to_le_bytes());
    data[16..24].copy_from_slice(&sentinel.to_le_bytes());
    data
}

#[derive(Debug)]
pub enum ExecutionOutcome {
    Submitted(Signature),
    /// Simulated only; the signed send was skipped.
    DryRun,
}

pub struct SnipeExecutor {
    rpc: Arc<dyn ChainRpc>,
    wallet: Arc<WalletManager>,
    keys: LaunchpadKeys,
    confirm_deadline: Duration,
    dry_run: bool,
    blockhash_cache: Mutex<Option<(Instant, Hash)>>,
}

impl SnipeExecutor {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<WalletManager>,
        keys: LaunchpadKeys,
        confirm_deadline: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            rpc,
            wallet,
            keys,
            confirm_deadline,
            dry_run,
            blockhash_cache: Mutex::new(None),
        }
    }

    pub fn payer(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    /// PDA and ATA derivation for one mint.
    pub fn derive_accounts(&self, mint: &Pubkey) -> BuyAccounts {
        let (global, _) = Pubkey::find_program_address(&[GLOBAL_SEED], &self.keys.program);
        let (bonding_curve, _) = Pubkey::find_program_address(
            &[BONDING_CURVE_SEED, mint.as_ref()],
            &self.keys.program,
        );
        // The curve PDA is off-curve by construction; the ATA derivation is
        // the same find_program_address either way.
        let bonding_curve_ata = get_associated_token_address(&bonding_curve, mint);
        let user_ata = get_associated_token_address(&self.wallet.pubkey(), mint);

        BuyAccounts {
            global,
            fee_vault: self.keys.fee_vault,
            mint: *mint,
            bonding_curve,
            bonding_curve_ata,
            user_ata,
            payer: self.wallet.pubkey(),
            system_program: system_program::id(),
            token_program: spl_token::id(),
            rent_sysvar: sysvar::rent::id(),
            config_authority: self.keys.config_authority,
            launchpad_program: self.keys.program,
        }
    }

    pub fn build_buy_instruction(&self, order: &BuyOrder) -> Result<(Instruction, BuyAccounts)> {
        let accounts = self.derive_accounts(&order.mint);
        accounts.validate()?;
        let data = encode_buy_data(
            self.keys.buy_discriminator,
            order.amount_lamports,
            order.max_slippage_sentinel,
        );
        let instruction =
            Instruction::new_with_bytes(self.keys.program, &data, accounts.to_metas());
        Ok((instruction, accounts))
    }

    async fn recent_blockhash(&self) -> Result<Hash> {
        {
            let cache = self.blockhash_cache.lock().unwrap();
            if let Some((at, hash)) = *cache {
                if at.elapsed() < BLOCKHASH_TTL {
                    return Ok(hash);
                }
            }
        }
        let hash = self.rpc.latest_blockhash().await?;
        *self.blockhash_cache.lock().unwrap() = Some((Instant::now(), hash));
        Ok(hash)
    }

    /// Full buy pipeline: balance check, ATA probe, build, simulate, sign,
    /// send-and-confirm. Transient RPC failures are retried inside the
    /// gateway; `SimulationRejected` and `NotConfirmed` surface to the
    /// caller untouched.
    pub async fn execute(&self, order: &BuyOrder) -> Result<ExecutionOutcome> {
        let timer = Timer::start("executor_buy_ms");
        let payer = self.wallet.pubkey();

        let have = self.rpc.balance(&payer).await?;
        let need = order.amount_lamports.saturating_add(FEE_AND_RENT_HEADROOM);
        if have < need {
            return Err(SniperError::InsufficientBalance { have, need });
        }

        let (buy_instruction, accounts) = self.build_buy_instruction(order)?;

        let mut instructions: Vec<Instruction> = Vec::with_capacity(2);
        let ata_exists = self.rpc.account_exists(&accounts.user_ata).await?;
        if !ata_exists {
            instructions.push(create_associated_token_account_idempotent(
                &payer,
                &payer,
                &order.mint,
                &spl_token::id(),
            ));
            debug!(ata = %accounts.user_ata, "user ATA missing, creation prepended");
        }
        instructions.push(buy_instruction);

        let blockhash = self.recent_blockhash().await?;
        let mut tx = Transaction::new_with_payer(&instructions, Some(&payer));
        tx.message.recent_blockhash = blockhash;

        let simulation = self.rpc.simulate(&tx).await?;
        for line in &simulation.logs {
            debug!(target: "executor", sim_log = %line);
        }
        if let Some(err) = simulation.err {
            metrics().bump("executor_simulation_rejected");
            return Err(SniperError::SimulationRejected(format!(
                "{err}; logs: {}",
                simulation.logs.join(" | ")
            )));
        }

        if self.dry_run {
            info!(
                mint = %order.mint,
                amount = order.amount_lamports,
                units = ?simulation.units_consumed,
                "dry run: simulation clean, send skipped"
            );
            timer.finish();
            return Ok(ExecutionOutcome::DryRun);
        }

        self.wallet.sign(&mut tx, blockhash)?;
        match self.rpc.send_and_confirm(&tx, self.confirm_deadline).await {
            Ok(signature) => {
                metrics().bump("executor_buy_submitted");
                info!(mint = %order.mint, sig = %signature, "buy confirmed");
                timer.finish();
                Ok(ExecutionOutcome::Submitted(signature))
            }
            Err(e) => {
                warn!(mint = %order.mint, error = %e, "buy submission failed");
                timer.finish();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCRIMINATOR: [u8; 8] = [0x66, 0x06, 0x3d, 0x12, 0x01, 0xda, 0xeb, 0xea];

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn buy_data_matches_wire_format() {
        let data = encode_buy_data(DISCRIMINATOR, 10_000_000, -1);
        assert_eq!(data.len(), BUY_DATA_LEN);
        assert_eq!(
            hex(&data),
            "66063d1201daebea8096980000000000ffffffffffffffff"
        );
    }

    #[test]
    fn buy_data_round_trips() {
        for amount in [0u64, 1, 1 << 31, 1 << 62] {
            for sentinel in [-1i64, 0] {
                let data = encode_buy_data(DISCRIMINATOR, amount, sentinel);
                assert_eq!(&data[0..8], &DISCRIMINATOR);
                let amount_back =
                    i64::from_le_bytes(data[8..16].try_into().unwrap()) as u64;
                let sentinel_back = i64::from_le_bytes(data[16..24].try_into().unwrap());
                assert_eq!(amount_back, amount);
                assert_eq!(sentinel_back, sentinel);
            }
        }
    }

    #[test]
    fn account_metas_in_canonical_order() {
        let accounts = BuyAccounts {
            global: Pubkey::new_unique(),
            fee_vault: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            bonding_curve: Pubkey::new_unique(),
            bonding_curve_ata: Pubkey::new_unique(),
            user_ata: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            system_program: system_program::id(),
            token_program: spl_token::id(),
            rent_sysvar: sysvar::rent::id(),
            config_authority: Pubkey::new_unique(),
            launchpad_program: Pubkey::new_unique(),
        };
        let metas = accounts.to_metas();
        assert_eq!(metas.len(), 12);

        assert_eq!(metas[0].pubkey, accounts.global);
        assert_eq!(metas[1].pubkey, accounts.fee_vault);
        assert_eq!(metas[2].pubkey, accounts.mint);
        assert_eq!(metas[3].pubkey, accounts.bonding_curve);
        assert_eq!(metas[4].pubkey, accounts.bonding_curve_ata);
        assert_eq!(metas[5].pubkey, accounts.user_ata);
        assert_eq!(metas[6].pubkey, accounts.payer);
        assert_eq!(metas[7].pubkey, accounts.system_program);
        assert_eq!(metas[8].pubkey, accounts.token_program);
        assert_eq!(metas[9].pubkey, accounts.rent_sysvar);
        assert_eq!(metas[10].pubkey, accounts.config_authority);
        assert_eq!(metas[11].pubkey, accounts.launchpad_program);

        // Writability and signer flags.
        let writable = [1usize, 3, 4, 5, 6];
        for (i, meta) in metas.iter().enumerate() {
            assert_eq!(meta.is_writable, writable.contains(&i), "index {i}");
            assert_eq!(meta.is_signer, i == 6, "index {i}");
        }

        accounts.validate().expect("all keys set");
    }

    #[test]
    fn unset_key_fails_validation() {
        let accounts = BuyAccounts {
            global: Pubkey::new_unique(),
            fee_vault: Pubkey::default(),
            mint: Pubkey::new_unique(),
            bonding_curve: Pubkey::new_unique(),
            bonding_curve_ata: Pubkey::new_unique(),
            user_ata: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            system_program: system_program::id(),
            token_program: spl_token::id(),
            rent_sysvar: sysvar::rent::id(),
            config_authority: Pubkey::new_unique(),
            launchpad_program: Pubkey::new_unique(),
        };
        assert!(matches!(
            accounts.validate(),
            Err(SniperError::InvalidAddress(_))
        ));
    }

    #[test]
    fn pda_derivation_is_deterministic() {
        let program = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let (global_a, _) = Pubkey::find_program_address(&[GLOBAL_SEED], &program);
        let (global_b, _) = Pubkey::find_program_address(&[GLOBAL_SEED], &program);
        assert_eq!(global_a, global_b);

        let (curve_a, _) =
            Pubkey::find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], &program);
        let (curve_b, _) =
            Pubkey::find_program_address(&[BONDING_CURVE_SEED, mint.as_ref()], &program);
        assert_eq!(curve_a, curve_b);
        assert_ne!(global_a, curve_a);
    }
}
