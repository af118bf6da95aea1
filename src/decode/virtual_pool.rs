//! Virtual-pool (Meteora-class) launch decoder.
//!
//! The mint comes from any funded post-transaction token balance; pool
//! address, vault, initial liquidity and token name/symbol are scraped from
//! the log lines when the pool program prints them.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use solana_sdk::pubkey::Pubkey;

use crate::decode::{LaunchDecoder, TransactionRecord};
use crate::types::{DecodedLaunch, DecoderFamily, LaunchMetadata, LogMessage};

#[derive(Default)]
pub struct VirtualPoolDecoder;

fn pool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)pool[:=]\s*([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap())
}

fn vault_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)vault[:=]\s*([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap())
}

fn liquidity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)liquidity[:=]\s*([0-9]+(?:\.[0-9]+)?)").unwrap())
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)name[:=]\s*"([^"]+)""#).unwrap())
}

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)symbol[:=]\s*"([^"]+)""#).unwrap())
}

impl VirtualPoolDecoder {
    fn funded_mint(record: &TransactionRecord) -> Option<Pubkey> {
        record
            .post_token_balances
            .iter()
            .find(|b| b.ui_amount.unwrap_or(0.0) > 0.0)
            .and_then(|b| Pubkey::from_str(&b.mint).ok())
    }

    fn scrape_metadata(lines: &[String]) -> LaunchMetadata {
        let mut meta = LaunchMetadata::default();
        for line in lines {
            if meta.pool.is_none() {
                meta.pool = capture_key(pool_re(), line);
            }
            if meta.vault.is_none() {
                meta.vault = capture_key(vault_re(), line);
            }
            if meta.initial_liquidity.is_none() {
                meta.initial_liquidity = liquidity_re()
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok());
            }
            if meta.name.is_none() {
                meta.name = capture_text(name_re(), line);
            }
            if meta.symbol.is_none() {
                meta.symbol = capture_text(symbol_re(), line);
            }
        }
        meta
    }
}

fn capture_key(re: &Regex, line: &str) -> Option<Pubkey> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| Pubkey::from_str(m.as_str()).ok())
}

fn capture_text(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl LaunchDecoder for VirtualPoolDecoder {
    fn family(&self) -> DecoderFamily {
        DecoderFamily::VirtualPool
    }

    fn decode(&self, record: &TransactionRecord, msg: &LogMessage) -> Option<DecodedLaunch> {
        let mint = Self::funded_mint(record)?;
        let lines = if record.log_messages.is_empty() {
            &msg.lines
        } else {
            &record.log_messages
        };
        let mut launch = DecodedLaunch::bare(mint);
        launch.metadata = Self::scrape_metadata(lines);
        Some(launch)
    }
}
