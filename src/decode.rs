//! Shared decode model: a flattened transaction record plus the decoder
//! registry. Decoders are pure over `TransactionRecord` so every strategy can
//! be exercised without a live RPC.

pub mod amm_pool;
pub mod pump_launch;
pub mod virtual_pool;

use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
};

use crate::errors::{Result, SniperError};
use crate::types::{DecodedLaunch, DecoderFamily, LogMessage};

use self::amm_pool::AmmPoolDecoder;
use self::pump_launch::PumpLaunchDecoder;
use self::virtual_pool::VirtualPoolDecoder;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceEntry {
    pub account_index: u8,
    pub mint: String,
    pub ui_amount: Option<f64>,
}

/// Compiled instruction with indexes resolved into `account_keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionEntry {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
}

/// A confirmed transaction flattened for the decoders: the full account-key
/// set (static ∪ loaded writable ∪ loaded readonly), log lines, token-balance
/// diffs, and the compiled + inner instruction lists.
#[derive(Debug, Clone, Default)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub account_keys: Vec<Pubkey>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
    pub instructions: Vec<InstructionEntry>,
    pub inner_instructions: Vec<InstructionEntry>,
}

impl TransactionRecord {
    /// Flatten a `getTransaction` response. Unparseable account keys are kept
    /// as the default pubkey so instruction indexes stay aligned.
    pub fn from_encoded(
        signature: &str,
        fetched: EncodedConfirmedTransactionWithStatusMeta,
    ) -> Result<Self> {
        let mut record = TransactionRecord {
            signature: signature.to_string(),
            slot: fetched.slot,
            block_time: fetched.block_time,
            ..TransactionRecord::default()
        };

        let message = match fetched.transaction.transaction {
            EncodedTransaction::Json(ui_tx) => ui_tx.message,
            other => {
                return Err(SniperError::MalformedTransaction(format!(
                    "{signature}: unexpected encoding {other:?}"
                )))
            }
        };
        let raw = match message {
            UiMessage::Raw(raw) => raw,
            UiMessage::Parsed(_) => {
                return Err(SniperError::MalformedTransaction(format!(
                    "{signature}: expected raw message"
                )))
            }
        };

        record.account_keys = raw
            .account_keys
            .iter()
            .map(|k| Pubkey::from_str(k).unwrap_or_default())
            .collect();
        record.instructions = raw
            .instructions
            .iter()
            .map(|ix| InstructionEntry {
                program_id_index: ix.program_id_index as usize,
                accounts: ix.accounts.iter().map(|&a| a as usize).collect(),
            })
            .collect();

        let Some(meta) = fetched.transaction.meta else {
            return Err(SniperError::MalformedTransaction(format!(
                "{signature}: missing meta"
            )));
        };

        if let Some(loaded) =
            Option::<solana_transaction_status::UiLoadedAddresses>::from(meta.loaded_addresses)
        {
            for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
                record
                    .account_keys
                    .push(Pubkey::from_str(key).unwrap_or_default());
            }
        }
        if let Some(logs) = Option::<Vec<String>>::from(meta.log_messages) {
            record.log_messages = logs;
        }
        if let Some(balances) = Option::<Vec<_>>::from(meta.pre_token_balances) {
            record.pre_token_balances = balances.into_iter().map(balance_entry).collect();
        }
        if let Some(balances) = Option::<Vec<_>>::from(meta.post_token_balances) {
            record.post_token_balances = balances.into_iter().map(balance_entry).collect();
        }
        if let Some(inner) =
            Option::<Vec<solana_transaction_status::UiInnerInstructions>>::from(meta.inner_instructions)
        {
            for group in inner {
                for ix in group.instructions {
                    if let UiInstruction::Compiled(compiled) = ix {
                        record.inner_instructions.push(InstructionEntry {
                            program_id_index: compiled.program_id_index as usize,
                            accounts: compiled.accounts.iter().map(|&a| a as usize).collect(),
                        });
                    }
                }
            }
        }

        Ok(record)
    }

    /// Record for messages that never made it to RPC (synthetic signatures):
    /// only the feed's log lines are available.
    pub fn from_log_message(msg: &LogMessage) -> Self {
        TransactionRecord {
            signature: msg.signature.clone(),
            slot: msg.slot,
            log_messages: msg.lines.clone(),
            ..TransactionRecord::default()
        }
    }

    pub fn key_at(&self, index: usize) -> Option<&Pubkey> {
        self.account_keys.get(index)
    }
}

fn balance_entry(
    balance: solana_transaction_status::UiTransactionTokenBalance,
) -> TokenBalanceEntry {
    TokenBalanceEntry {
        account_index: balance.account_index,
        mint: balance.mint,
        ui_amount: balance.ui_token_amount.ui_amount,
    }
}

/// One decode strategy. Returns `None` on any failure; the orchestrator
/// counts unresolved messages, it never unwinds.
pub trait LaunchDecoder: Send + Sync {
    fn family(&self) -> DecoderFamily;
    fn decode(&self, record: &TransactionRecord, msg: &LogMessage) -> Option<DecodedLaunch>;
}

/// Registry keyed by decoder family.
pub struct DecoderSet {
    decoders: Vec<Box<dyn LaunchDecoder>>,
}

impl DecoderSet {
    pub fn standard() -> Self {
        Self {
            decoders: vec![
                Box::new(PumpLaunchDecoder::default()),
                Box::new(AmmPoolDecoder::default()),
                Box::new(VirtualPoolDecoder::default()),
            ],
        }
    }

    pub fn for_family(&self, family: DecoderFamily) -> Option<&dyn LaunchDecoder> {
        self.decoders
            .iter()
            .find(|d| d.family() == family)
            .map(|d| d.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_families() {
        let set = DecoderSet::standard();
        assert!(set.for_family(DecoderFamily::PumpLaunch).is_some());
        assert!(set.for_family(DecoderFamily::AmmPool).is_some());
        assert!(set.for_family(DecoderFamily::VirtualPool).is_some());
    }

    #[test]
    fn log_only_record_carries_lines() {
        let msg = LogMessage {
            signature: "slot-77".into(),
            slot: 77,
            source_program: "pumpfun".into(),
            lines: vec!["Program log: Instruction: Create".into()],
            received_at_ms: 0,
        };
        let record = TransactionRecord::from_log_message(&msg);
        assert_eq!(record.slot, 77);
        assert_eq!(record.log_messages.len(), 1);
        assert!(record.account_keys.is_empty());
    }
}
