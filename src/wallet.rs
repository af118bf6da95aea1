//! Keypair loading and legacy-transaction signing.

use std::{fs, path::Path};

use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use tracing::{debug, info};

use crate::errors::{Result, SniperError};

pub struct WalletManager {
    keypair: Keypair,
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.keypair.pubkey())
            .finish()
    }
}

impl WalletManager {
    /// Load the payer keypair from file. Accepts the Solana CLI JSON-array
    /// format and raw base58 of the 64-byte secret.
    pub fn from_file<P: AsRef<Path>>(keypair_path: P) -> Result<Self> {
        let path = keypair_path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            SniperError::ConfigInvalid(format!("cannot read keypair {}: {e}", path.display()))
        })?;
        let keypair = Self::parse_keypair(&raw)?;
        info!(pubkey = %keypair.pubkey(), path = %path.display(), "loaded payer keypair");
        Ok(Self { keypair })
    }

    /// Build from raw 64-byte secret key material.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let keypair = Keypair::from_bytes(secret)
            .map_err(|e| SniperError::ConfigInvalid(format!("invalid payer secret: {e}")))?;
        Ok(Self { keypair })
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn new_random() -> Self {
        let keypair = Keypair::new();
        debug!(pubkey = %keypair.pubkey(), "generated ephemeral keypair");
        Self { keypair }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a legacy transaction against the given blockhash.
    pub fn sign(&self, tx: &mut Transaction, blockhash: Hash) -> Result<()> {
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|e| SniperError::MalformedTransaction(format!("signing failed: {e}")))
    }

    fn parse_keypair(raw: &str) -> Result<Keypair> {
        let raw = raw.trim();

        if raw.starts_with('[') && raw.ends_with(']') {
            let bytes: Vec<u8> = serde_json::from_str(raw).map_err(|e| {
                SniperError::ConfigInvalid(format!("keypair JSON array unreadable: {e}"))
            })?;
            if bytes.len() != 64 {
                return Err(SniperError::ConfigInvalid(format!(
                    "keypair must be 64 bytes, got {}",
                    bytes.len()
                )));
            }
            return Keypair::from_bytes(&bytes)
                .map_err(|e| SniperError::ConfigInvalid(format!("keypair bytes rejected: {e}")));
        }

        if let Ok(bytes) = bs58::decode(raw).into_vec() {
            if bytes.len() == 64 {
                if let Ok(keypair) = Keypair::from_bytes(&bytes) {
                    return Ok(keypair);
                }
            }
        }

        Err(SniperError::ConfigInvalid(
            "keypair must be a JSON byte array or base58 string".into(),
        ))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(&self.keypair.to_bytes().to_vec())
            .map_err(|e| SniperError::ConfigInvalid(format!("keypair serialize failed: {e}")))?;
        fs::write(&path, json).map_err(|e| {
            SniperError::ConfigInvalid(format!(
                "cannot write keypair {}: {e}",
                path.as_ref().display()
            ))
        })
    }
}
