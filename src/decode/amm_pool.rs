//! AMM pool-initialisation decoder.
//!
//! Primary signal: a token balance that exists post-transaction but not
//! pre-transaction. Fallback: first token-program instruction whose leading
//! account is not one of the well-known non-mint addresses.

use std::collections::HashSet;
use std::str::FromStr;

use solana_sdk::{pubkey::Pubkey, system_program, sysvar};

use crate::decode::{InstructionEntry, LaunchDecoder, TransactionRecord};
use crate::types::{DecodedLaunch, DecoderFamily, LogMessage};

pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Default)]
pub struct AmmPoolDecoder;

impl AmmPoolDecoder {
    fn non_mint_allowlist() -> [Pubkey; 4] {
        [
            Pubkey::from_str(NATIVE_MINT).expect("native mint constant"),
            system_program::id(),
            spl_token::id(),
            sysvar::rent::id(),
        ]
    }

    fn from_balance_diff(record: &TransactionRecord) -> Option<Pubkey> {
        let pre: HashSet<u8> = record
            .pre_token_balances
            .iter()
            .map(|b| b.account_index)
            .collect();
        record
            .post_token_balances
            .iter()
            .find(|b| !pre.contains(&b.account_index) && b.ui_amount.unwrap_or(0.0) > 0.0)
            .and_then(|b| Pubkey::from_str(&b.mint).ok())
    }

    fn from_instruction_scan(record: &TransactionRecord) -> Option<Pubkey> {
        let allowlist = Self::non_mint_allowlist();
        let token_program = spl_token::id();

        let candidates = record
            .instructions
            .iter()
            .chain(record.inner_instructions.iter());
        for ix in candidates {
            if record.key_at(ix.program_id_index) != Some(&token_program) {
                continue;
            }
            let Some(first) = Self::first_account(record, ix) else {
                continue;
            };
            if !allowlist.contains(&first) && first != Pubkey::default() {
                return Some(first);
            }
        }
        None
    }

    fn first_account(record: &TransactionRecord, ix: &InstructionEntry) -> Option<Pubkey> {
        ix.accounts.first().and_then(|&i| record.key_at(i)).copied()
    }
}

impl LaunchDecoder for AmmPoolDecoder {
    fn family(&self) -> DecoderFamily {
        DecoderFamily::AmmPool
    }

    fn decode(&self, record: &TransactionRecord, _msg: &LogMessage) -> Option<DecodedLaunch> {
        Self::from_balance_diff(record)
            .or_else(|| Self::from_instruction_scan(record))
            .map(DecodedLaunch::bare)
    }
}
