use std::fmt;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;

/// One subscription target. Each descriptor doubles as a telemetry key:
/// per-source counters are keyed by `label`.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    /// Stable numeric id used to map inbound pubsub messages back to their feed.
    pub id: u64,
    pub label: String,
    pub address: Pubkey,
}

/// A retained program-log notification, after throttle/dedup/staleness gating.
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// Base58 transaction signature, or `"slot-<slot>"` when the feed omits one.
    pub signature: String,
    pub slot: u64,
    pub source_program: String,
    pub lines: Vec<String>,
    pub received_at_ms: u64,
}

impl LogMessage {
    /// Feeds occasionally deliver log batches without a signature; those can
    /// still be classified but never fetched back from RPC.
    pub fn has_real_signature(&self) -> bool {
        !self.signature.is_empty() && !self.signature.starts_with("slot-")
    }

    pub fn joined_lines(&self) -> String {
        self.lines.join("\n")
    }
}

/// Classification label attached to a matched launch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    PumpfunCreate,
    #[serde(rename = "raydium_initPool")]
    RaydiumInitPool,
    #[serde(rename = "meteora_initPool")]
    MeteoraInitPool,
    SplMintInit,
    ScoreOnlyFallback,
}

impl Tag {
    pub fn decoder_family(&self) -> DecoderFamily {
        match self {
            Tag::PumpfunCreate => DecoderFamily::PumpLaunch,
            Tag::RaydiumInitPool | Tag::SplMintInit => DecoderFamily::AmmPool,
            Tag::MeteoraInitPool => DecoderFamily::VirtualPool,
            // Fallback matches carry no instruction evidence; the pump decoder
            // is the only one that can work from log frames alone.
            Tag::ScoreOnlyFallback => DecoderFamily::PumpLaunch,
        }
    }

    /// Only bonding-curve launches are buyable through the launchpad executor.
    pub fn is_launchpad_buy(&self) -> bool {
        matches!(self, Tag::PumpfunCreate)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tag::PumpfunCreate => "pumpfun_create",
            Tag::RaydiumInitPool => "raydium_initPool",
            Tag::MeteoraInitPool => "meteora_initPool",
            Tag::SplMintInit => "spl_mint_init",
            Tag::ScoreOnlyFallback => "score_only_fallback",
        };
        f.write_str(s)
    }
}

/// Which of the three decode strategies applies to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderFamily {
    PumpLaunch,
    AmmPool,
    VirtualPool,
}

/// Where the winning classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    Decoder,
    Fingerprint,
    ScoreFallback,
}

/// Final classification of one log message. `mint == None` means the event
/// matched but no mint could be recovered.
#[derive(Debug, Clone)]
pub struct TagResult {
    pub tag: Tag,
    pub confidence: f64,
    pub mint: Option<Pubkey>,
    pub source: ClassificationSource,
}

/// Optional launch metadata recovered by the richer decode paths.
#[derive(Debug, Clone, Default)]
pub struct LaunchMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
    pub pool: Option<Pubkey>,
    pub vault: Option<Pubkey>,
    pub initial_liquidity: Option<f64>,
}

/// Successful decoder output for one transaction.
#[derive(Debug, Clone)]
pub struct DecodedLaunch {
    pub mint: Pubkey,
    /// Decoder-attested confidence; `None` leaves the fingerprint's value in place.
    pub confidence: Option<f64>,
    pub bonding_curve: Option<Pubkey>,
    pub bonding_curve_ata: Option<Pubkey>,
    pub creator: Option<Pubkey>,
    pub metadata: LaunchMetadata,
}

impl DecodedLaunch {
    pub fn bare(mint: Pubkey) -> Self {
        Self {
            mint,
            confidence: None,
            bonding_curve: None,
            bonding_curve_ata: None,
            creator: None,
            metadata: LaunchMetadata::default(),
        }
    }
}

/// Buy request handed to the executor.
#[derive(Debug, Clone)]
pub struct BuyOrder {
    pub mint: Pubkey,
    pub amount_lamports: u64,
    /// Two's-complement little-endian in the wire payload; `-1` means "no cap"
    /// as far as the launchpad program is concerned.
    pub max_slippage_sentinel: i64,
}

impl BuyOrder {
    pub fn new(mint: Pubkey, amount_lamports: u64) -> Self {
        Self {
            mint,
            amount_lamports,
            max_slippage_sentinel: -1,
        }
    }
}

pub type LogSender = mpsc::Sender<LogMessage>;
pub type LogReceiver = mpsc::Receiver<LogMessage>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_signatures_are_flagged() {
        let msg = LogMessage {
            signature: "slot-1234".into(),
            slot: 1234,
            source_program: "pumpfun".into(),
            lines: vec![],
            received_at_ms: 0,
        };
        assert!(!msg.has_real_signature());

        let msg = LogMessage {
            signature: "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW".into(),
            slot: 1234,
            source_program: "pumpfun".into(),
            lines: vec![],
            received_at_ms: 0,
        };
        assert!(msg.has_real_signature());
    }

    #[test]
    fn tag_families_route_to_decoders() {
        assert_eq!(Tag::PumpfunCreate.decoder_family(), DecoderFamily::PumpLaunch);
        assert_eq!(Tag::RaydiumInitPool.decoder_family(), DecoderFamily::AmmPool);
        assert_eq!(Tag::SplMintInit.decoder_family(), DecoderFamily::AmmPool);
        assert_eq!(Tag::MeteoraInitPool.decoder_family(), DecoderFamily::VirtualPool);
        assert!(Tag::PumpfunCreate.is_launchpad_buy());
        assert!(!Tag::RaydiumInitPool.is_launchpad_buy());
    }

    #[test]
    fn buy_order_defaults_sentinel_to_minus_one() {
        let order = BuyOrder::new(Pubkey::new_unique(), 10_000_000);
        assert_eq!(order.max_slippage_sentinel, -1);
    }
}
