//! Bonding-curve launch decoder.
//!
//! Works entirely from `Program data:` frames in the log stream, so it also
//! covers messages whose transaction never gets fetched. Recovery order per
//! frame: fixed offset 8, then the structured create-event layout for frames
//! large enough to carry it, then a sliding 32-byte window scan.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::decode::{LaunchDecoder, TransactionRecord};
use crate::types::{DecodedLaunch, DecoderFamily, LaunchMetadata, LogMessage};

const PROGRAM_DATA_MARKER: &str = "Program data: ";

/// Create-event layout: name[32] || symbol[4] || uri[200] || mint[32] ||
/// bonding_curve[32] || user[32].
const CREATE_LAYOUT_LEN: usize = 332;
const NAME_RANGE: std::ops::Range<usize> = 0..32;
const SYMBOL_RANGE: std::ops::Range<usize> = 32..36;
const URI_RANGE: std::ops::Range<usize> = 36..236;
const MINT_RANGE: std::ops::Range<usize> = 236..268;
const CURVE_RANGE: std::ops::Range<usize> = 268..300;
const USER_RANGE: std::ops::Range<usize> = 300..332;

const SUFFIX_CONFIDENCE: f64 = 0.94;
const LAYOUT_CONFIDENCE: f64 = 0.86;

pub struct PumpLaunchDecoder {
    /// Launchpad vanity suffix on minted addresses, matched case-insensitively.
    mint_suffix: String,
}

impl Default for PumpLaunchDecoder {
    fn default() -> Self {
        Self {
            mint_suffix: "pump".to_string(),
        }
    }
}

impl PumpLaunchDecoder {
    pub fn with_suffix(mint_suffix: impl Into<String>) -> Self {
        Self {
            mint_suffix: mint_suffix.into().to_ascii_lowercase(),
        }
    }

    fn suffix_matches(&self, key: &Pubkey) -> bool {
        key.to_string()
            .to_ascii_lowercase()
            .ends_with(&self.mint_suffix)
    }

    fn key_with_suffix(&self, window: &[u8]) -> Option<Pubkey> {
        let key = Pubkey::try_from(window).ok()?;
        self.suffix_matches(&key).then_some(key)
    }

    fn decode_frame(&self, frame: &[u8]) -> Option<DecodedLaunch> {
        if frame.len() < 32 {
            return None;
        }

        if frame.len() >= 40 {
            if let Some(mint) = self.key_with_suffix(&frame[8..40]) {
                let mut launch = DecodedLaunch::bare(mint);
                launch.confidence = Some(SUFFIX_CONFIDENCE);
                return Some(launch);
            }
        }

        if frame.len() >= CREATE_LAYOUT_LEN {
            if let Some(launch) = self.parse_create_layout(frame) {
                return Some(launch);
            }
        }

        for offset in 0..=frame.len() - 32 {
            if let Some(mint) = self.key_with_suffix(&frame[offset..offset + 32]) {
                let mut launch = DecodedLaunch::bare(mint);
                launch.confidence = Some(SUFFIX_CONFIDENCE);
                return Some(launch);
            }
        }

        None
    }

    fn parse_create_layout(&self, frame: &[u8]) -> Option<DecodedLaunch> {
        let mint = Pubkey::try_from(&frame[MINT_RANGE]).ok()?;
        if mint == Pubkey::default() {
            return None;
        }
        let bonding_curve = Pubkey::try_from(&frame[CURVE_RANGE]).ok()?;
        let user = Pubkey::try_from(&frame[USER_RANGE]).ok()?;

        let confidence = if self.suffix_matches(&mint) {
            SUFFIX_CONFIDENCE
        } else {
            LAYOUT_CONFIDENCE
        };

        Some(DecodedLaunch {
            mint,
            confidence: Some(confidence),
            bonding_curve: Some(bonding_curve),
            // The curve's token account is the ATA of the mint under the
            // curve PDA, which lives off the ed25519 curve.
            bonding_curve_ata: Some(get_associated_token_address(&bonding_curve, &mint)),
            creator: Some(user),
            metadata: LaunchMetadata {
                name: text_field(&frame[NAME_RANGE]),
                symbol: text_field(&frame[SYMBOL_RANGE]),
                uri: text_field(&frame[URI_RANGE]),
                ..LaunchMetadata::default()
            },
        })
    }
}

/// Fixed-width text field: lossy UTF-8 with trailing NULs stripped.
fn text_field(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string();
    (!text.is_empty()).then_some(text)
}

impl LaunchDecoder for PumpLaunchDecoder {
    fn family(&self) -> DecoderFamily {
        DecoderFamily::PumpLaunch
    }

    fn decode(&self, record: &TransactionRecord, msg: &LogMessage) -> Option<DecodedLaunch> {
        // The fetched record carries the authoritative logs; the feed lines
        // are the fallback when the transaction was never fetched.
        let lines = if record.log_messages.is_empty() {
            &msg.lines
        } else {
            &record.log_messages
        };

        for line in lines {
            let Some(encoded) = line.split(PROGRAM_DATA_MARKER).nth(1) else {
                continue;
            };
            let Ok(frame) = BASE64.decode(encoded.trim()) else {
                continue;
            };
            if let Some(launch) = self.decode_frame(&frame) {
                return Some(launch);
            }
        }
        None
    }
}
