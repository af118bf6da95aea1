use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::errors::{Result, SniperError};
use crate::types::{ProgramDescriptor, Tag};

/// Combinator applied by the fingerprint matcher after the min-score gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLogic {
    And,
    Or,
    Fuzzy,
}

/// One configured subscription target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSubscription {
    pub alias: String,
    pub address: String,
}

/// Configuration-time fingerprint. Order in the list is match priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintSpec {
    pub tag: Tag,
    pub required_instructions: Vec<String>,
    /// Program addresses or aliases, matched by equality against the source
    /// program or by substring against the joined log text.
    pub required_programs: Vec<String>,
    pub logic: MatchLogic,
    pub min_score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Endpoints
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    // Subscriptions and classification tables
    #[serde(default = "default_program_subscriptions")]
    pub program_subscriptions: Vec<ProgramSubscription>,
    #[serde(default = "default_signal_weights")]
    pub signal_weights: BTreeMap<String, f64>,
    #[serde(default = "default_fingerprints")]
    pub fingerprints: Vec<FingerprintSpec>,

    // Thresholds
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_stale_slot_threshold")]
    pub stale_slot_threshold: u64,

    // Rate limits and retry budget
    #[serde(default = "default_rpc_rate_limit")]
    pub rpc_rate_limit: u32,
    #[serde(default = "default_validation_rate_limit")]
    pub validation_rate_limit: u32,
    #[serde(default = "default_socket_message_rate_limit")]
    pub socket_message_rate_limit: u32,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u32,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
    #[serde(default = "default_rpc_deadline_secs")]
    pub rpc_deadline_secs: u64,

    // Launchpad constants
    #[serde(default = "default_launchpad_program_id")]
    pub launchpad_program_id: String,
    #[serde(default = "default_global_fee_vault")]
    pub global_fee_vault: String,
    #[serde(default = "default_config_authority")]
    pub config_authority: String,
    #[serde(default = "default_buy_discriminator_hex")]
    pub buy_discriminator_hex: String,

    // Executor
    #[serde(default = "default_amount_in_native")]
    pub amount_in_native: u64,
    #[serde(default)]
    pub keypair_path: Option<String>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Tie-break order when one tag could map to more than one venue.
    #[serde(default = "default_dex_priority")]
    pub dex_priority: Vec<String>,

    // Ingest tuning
    #[serde(default = "default_ws_reconnect_base_ms")]
    pub ws_reconnect_base_ms: u64,
    #[serde(default = "default_ws_reconnect_max_ms")]
    pub ws_reconnect_max_ms: u64,
    #[serde(default = "default_ws_max_silent_ms")]
    pub ws_max_silent_ms: u64,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_dedup_sweep_secs")]
    pub dedup_sweep_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_url: default_socket_url(),
            rpc_url: default_rpc_url(),
            program_subscriptions: default_program_subscriptions(),
            signal_weights: default_signal_weights(),
            fingerprints: default_fingerprints(),
            confidence_threshold: default_confidence_threshold(),
            score_threshold: default_score_threshold(),
            stale_slot_threshold: default_stale_slot_threshold(),
            rpc_rate_limit: default_rpc_rate_limit(),
            validation_rate_limit: default_validation_rate_limit(),
            socket_message_rate_limit: default_socket_message_rate_limit(),
            rpc_max_retries: default_rpc_max_retries(),
            rpc_retry_delay_ms: default_rpc_retry_delay_ms(),
            rpc_deadline_secs: default_rpc_deadline_secs(),
            launchpad_program_id: default_launchpad_program_id(),
            global_fee_vault: default_global_fee_vault(),
            config_authority: default_config_authority(),
            buy_discriminator_hex: default_buy_discriminator_hex(),
            amount_in_native: default_amount_in_native(),
            keypair_path: None,
            dry_run: default_dry_run(),
            dex_priority: default_dex_priority(),
            ws_reconnect_base_ms: default_ws_reconnect_base_ms(),
            ws_reconnect_max_ms: default_ws_reconnect_max_ms(),
            ws_max_silent_ms: default_ws_max_silent_ms(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_sweep_secs: default_dedup_sweep_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_socket_url() -> String {
    "wss://api.mainnet-beta.solana.com".to_string()
}
fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

pub const PUMPFUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CLMM_PROGRAM: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const METEORA_DBC_PROGRAM: &str = "dbcij3LWUppWqq96dh6gJWwBifmcGfLSB5D4DuSMaqN";

fn default_program_subscriptions() -> Vec<ProgramSubscription> {
    vec![
        ProgramSubscription {
            alias: "pumpfun".into(),
            address: PUMPFUN_PROGRAM.into(),
        },
        ProgramSubscription {
            alias: "raydium_amm".into(),
            address: RAYDIUM_AMM_PROGRAM.into(),
        },
        ProgramSubscription {
            alias: "raydium_clmm".into(),
            address: RAYDIUM_CLMM_PROGRAM.into(),
        },
        ProgramSubscription {
            alias: "meteora_dbc".into(),
            address: METEORA_DBC_PROGRAM.into(),
        },
    ]
}

fn default_signal_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("create".to_string(), 0.6),
        ("initializeMint".to_string(), 1.0),
        ("initializeMint2".to_string(), 1.0),
        ("mintTo".to_string(), 0.8),
        ("buyExactIn".to_string(), 0.7),
        ("initialize2".to_string(), 0.9),
        ("initializeVirtualPoolWithSplToken".to_string(), 1.0),
        ("openPositionWithToken22Nft".to_string(), 0.5),
    ])
}

fn default_fingerprints() -> Vec<FingerprintSpec> {
    vec![
        FingerprintSpec {
            tag: Tag::PumpfunCreate,
            required_instructions: vec!["create".into()],
            required_programs: vec![PUMPFUN_PROGRAM.into()],
            logic: MatchLogic::And,
            min_score: 2.0,
            confidence: 0.9,
        },
        FingerprintSpec {
            tag: Tag::RaydiumInitPool,
            required_instructions: vec!["initialize2".into(), "initializeAccount".into()],
            required_programs: vec![RAYDIUM_AMM_PROGRAM.into(), RAYDIUM_CLMM_PROGRAM.into()],
            logic: MatchLogic::Fuzzy,
            min_score: 2.0,
            confidence: 0.85,
        },
        FingerprintSpec {
            tag: Tag::MeteoraInitPool,
            required_instructions: vec![
                "initializeVirtualPoolWithSplToken".into(),
                "mintTo".into(),
            ],
            required_programs: vec![METEORA_DBC_PROGRAM.into()],
            logic: MatchLogic::Fuzzy,
            min_score: 2.0,
            confidence: 0.85,
        },
        FingerprintSpec {
            tag: Tag::SplMintInit,
            required_instructions: vec!["initializeMint".into()],
            required_programs: vec![
                "pumpfun".into(),
                "raydium_amm".into(),
                "raydium_clmm".into(),
                "meteora_dbc".into(),
            ],
            logic: MatchLogic::Or,
            min_score: 2.0,
            confidence: 0.6,
        },
    ]
}

fn default_confidence_threshold() -> f64 {
    0.8
}
fn default_score_threshold() -> f64 {
    1.5
}
fn default_stale_slot_threshold() -> u64 {
    50
}
fn default_rpc_rate_limit() -> u32 {
    10
}
fn default_validation_rate_limit() -> u32 {
    4
}
fn default_socket_message_rate_limit() -> u32 {
    200
}
fn default_rpc_max_retries() -> u32 {
    3
}
fn default_rpc_retry_delay_ms() -> u64 {
    500
}
fn default_rpc_deadline_secs() -> u64 {
    30
}
fn default_launchpad_program_id() -> String {
    PUMPFUN_PROGRAM.into()
}
fn default_global_fee_vault() -> String {
    "CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM".into()
}
fn default_config_authority() -> String {
    "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1".into()
}
fn default_buy_discriminator_hex() -> String {
    "66063d1201daebea".into()
}
fn default_amount_in_native() -> u64 {
    10_000_000
}
fn default_dry_run() -> bool {
    true
}
fn default_dex_priority() -> Vec<String> {
    vec![
        "pumpfun".into(),
        "raydium_amm".into(),
        "raydium_clmm".into(),
        "meteora_dbc".into(),
    ]
}
fn default_ws_reconnect_base_ms() -> u64 {
    500
}
fn default_ws_reconnect_max_ms() -> u64 {
    30_000
}
fn default_ws_max_silent_ms() -> u64 {
    45_000
}
fn default_dedup_ttl_secs() -> u64 {
    60
}
fn default_dedup_sweep_secs() -> u64 {
    10
}
fn default_stats_interval_secs() -> u64 {
    10
}

impl Config {
    /// Load `config.toml` when present, fall back to defaults, then apply env
    /// overrides and validate. A validation failure is fatal at startup.
    pub fn load() -> Result<Self> {
        let mut cfg = match fs::read_to_string("config.toml") {
            Ok(text) => toml::from_str::<Config>(&text)
                .map_err(|e| SniperError::ConfigInvalid(format!("config.toml: {e}")))?,
            Err(_) => Config::default(),
        };

        if let Ok(url) = std::env::var("SNIPER_SOCKET_URL") {
            cfg.socket_url = url;
        }
        if let Ok(url) = std::env::var("SNIPER_RPC_URL") {
            cfg.rpc_url = url;
        }
        if let Ok(path) = std::env::var("SNIPER_KEYPAIR_PATH") {
            cfg.keypair_path = Some(path);
        }
        if let Ok(v) = std::env::var("SNIPER_DRY_RUN") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => cfg.dry_run = true,
                "0" | "false" | "no" => cfg.dry_run = false,
                _ => {}
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.socket_url.starts_with("ws://") && !self.socket_url.starts_with("wss://") {
            return Err(SniperError::ConfigInvalid(format!(
                "socket_url must be a websocket endpoint, got {}",
                self.socket_url
            )));
        }
        if self.program_subscriptions.is_empty() {
            return Err(SniperError::ConfigInvalid(
                "at least one program subscription is required".into(),
            ));
        }
        for sub in &self.program_subscriptions {
            Pubkey::from_str(&sub.address).map_err(|_| {
                SniperError::ConfigInvalid(format!(
                    "subscription {} has invalid address {}",
                    sub.alias, sub.address
                ))
            })?;
        }
        for fp in &self.fingerprints {
            if fp.required_programs.is_empty() {
                return Err(SniperError::ConfigInvalid(format!(
                    "fingerprint {} has no required programs",
                    fp.tag
                )));
            }
            if !(0.0..=1.0).contains(&fp.confidence) || fp.confidence == 0.0 {
                return Err(SniperError::ConfigInvalid(format!(
                    "fingerprint {} confidence must be in (0, 1]",
                    fp.tag
                )));
            }
        }
        self.launchpad_program()?;
        self.fee_vault()?;
        self.authority()?;
        self.buy_discriminator()?;
        if self.rpc_rate_limit == 0
            || self.validation_rate_limit == 0
            || self.socket_message_rate_limit == 0
        {
            return Err(SniperError::ConfigInvalid("rate limits must be nonzero".into()));
        }
        if self.rpc_max_retries == 0 {
            return Err(SniperError::ConfigInvalid("rpc_max_retries must be nonzero".into()));
        }
        if self.amount_in_native == 0 {
            return Err(SniperError::ConfigInvalid("amount_in_native must be nonzero".into()));
        }
        if self.ws_reconnect_base_ms == 0 || self.ws_reconnect_base_ms > self.ws_reconnect_max_ms {
            return Err(SniperError::ConfigInvalid(
                "ws reconnect backoff window is inconsistent".into(),
            ));
        }
        if self.dedup_ttl_secs == 0 || self.dedup_sweep_secs == 0 {
            return Err(SniperError::ConfigInvalid("dedup window must be nonzero".into()));
        }
        Ok(())
    }

    /// Subscription list resolved into descriptors with stable numeric ids.
    pub fn descriptors(&self) -> Result<Vec<ProgramDescriptor>> {
        self.program_subscriptions
            .iter()
            .enumerate()
            .map(|(i, sub)| {
                let address = Pubkey::from_str(&sub.address)
                    .map_err(|_| SniperError::InvalidAddress(sub.address.clone()))?;
                Ok(ProgramDescriptor {
                    id: i as u64,
                    label: sub.alias.clone(),
                    address,
                })
            })
            .collect()
    }

    pub fn launchpad_program(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.launchpad_program_id)
            .map_err(|_| SniperError::ConfigInvalid(format!(
                "launchpad_program_id is not a valid address: {}",
                self.launchpad_program_id
            )))
    }

    pub fn fee_vault(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.global_fee_vault).map_err(|_| {
            SniperError::ConfigInvalid(format!(
                "global_fee_vault is not a valid address: {}",
                self.global_fee_vault
            ))
        })
    }

    pub fn authority(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.config_authority).map_err(|_| {
            SniperError::ConfigInvalid(format!(
                "config_authority is not a valid address: {}",
                self.config_authority
            ))
        })
    }

    pub fn buy_discriminator(&self) -> Result<[u8; 8]> {
        let hex = self.buy_discriminator_hex.trim();
        if hex.len() != 16 || !hex.is_ascii() {
            return Err(SniperError::ConfigInvalid(format!(
                "buy_discriminator_hex must be 8 bytes (16 hex chars), got {:?}",
                hex
            )));
        }
        let mut out = [0u8; 8];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
                SniperError::ConfigInvalid(format!("buy_discriminator_hex is not hex: {hex:?}"))
            })?;
        }
        Ok(out)
    }
}
