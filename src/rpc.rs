//! Typed JSON-RPC gateway.
//!
//! `ChainRpc` is the seam the rest of the pipeline depends on; the production
//! implementation wraps the nonblocking Solana RPC client with the token
//! gates, the backoff runner, and per-method request counters
//! (`rpc_request_attempt/success/error/rate_limited`).

use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use solana_account_decoder::{UiAccount, UiAccountData, UiAccountEncoding};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcSendTransactionConfig, RpcTransactionConfig,
};
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::Response;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::UiTransactionEncoding;
use tokio::time::sleep;
use tracing::debug;

use crate::backoff::BackoffPolicy;
use crate::decode::TransactionRecord;
use crate::errors::{Result, SniperError};
use crate::metrics::metrics;
use crate::rate_limit::{RateGates, TokenGate};

/// Parsed `getAccountInfo` result, reduced to what the validator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub owner: Pubkey,
    /// `parsed.type` from the jsonParsed encoding, when the owner program has
    /// a parser (`"mint"`, `"account"`, ...).
    pub parsed_kind: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Every RPC operation the pipeline performs. Mocked in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash>;
    async fn current_slot(&self) -> Result<u64>;
    async fn balance(&self, key: &Pubkey) -> Result<u64>;
    /// jsonParsed account lookup; `None` when the account does not exist.
    async fn account_summary(&self, key: &Pubkey) -> Result<Option<AccountSummary>>;
    async fn account_exists(&self, key: &Pubkey) -> Result<bool>;
    /// Confirmed transaction, flattened for the decoders.
    async fn transaction_record(&self, signature: &str) -> Result<TransactionRecord>;
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome>;
    /// Submit then poll at confirmed commitment until `deadline` elapses.
    async fn send_and_confirm(&self, tx: &Transaction, deadline: Duration) -> Result<Signature>;
}

pub struct RpcGateway {
    client: RpcClient,
    gates: std::sync::Arc<RateGates>,
    backoff: BackoffPolicy,
}

impl RpcGateway {
    pub fn new(rpc_url: &str, gates: std::sync::Arc<RateGates>, backoff: BackoffPolicy) -> Self {
        let client =
            RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        Self {
            client,
            gates,
            backoff,
        }
    }

    /// Token gate, backoff, counters. `gate` differs per method family: the
    /// validator path has its own bucket.
    async fn call<T, F, Fut>(&self, method: &'static str, gate: &TokenGate, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, ClientError>>,
    {
        gate.acquire().await;
        self.backoff
            .run(method, || async {
                metrics().bump(&format!("rpc_request_attempt_{method}"));
                match f().await {
                    Ok(value) => {
                        metrics().bump(&format!("rpc_request_success_{method}"));
                        Ok(value)
                    }
                    Err(e) => {
                        let err = SniperError::classify_provider(method, e.to_string());
                        if matches!(err, SniperError::RateLimited(_)) {
                            metrics().bump(&format!("rpc_request_rate_limited_{method}"));
                        } else {
                            metrics().bump(&format!("rpc_request_error_{method}"));
                        }
                        Err(err)
                    }
                }
            })
            .await
    }

    fn parsed_summary(account: UiAccount) -> Option<AccountSummary> {
        let owner = Pubkey::from_str(&account.owner).ok()?;
        let parsed_kind = match account.data {
            UiAccountData::Json(parsed) => parsed
                .parsed
                .get("type")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        };
        Some(AccountSummary { owner, parsed_kind })
    }
}

#[async_trait]
impl ChainRpc for RpcGateway {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.call("getLatestBlockhash", &self.gates.rpc, || {
            self.client.get_latest_blockhash()
        })
        .await
    }

    async fn current_slot(&self) -> Result<u64> {
        self.call("getSlot", &self.gates.rpc, || self.client.get_slot())
            .await
    }

    async fn balance(&self, key: &Pubkey) -> Result<u64> {
        self.call("getBalance", &self.gates.rpc, || self.client.get_balance(key))
            .await
    }

    async fn account_summary(&self, key: &Pubkey) -> Result<Option<AccountSummary>> {
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            data_slice: None,
            min_context_slot: None,
        };
        let params = json!([key.to_string(), config]);
        let response: Response<Option<UiAccount>> = self
            .call("getAccountInfo", &self.gates.validation, || {
                self.client.send(RpcRequest::GetAccountInfo, params.clone())
            })
            .await?;
        Ok(response.value.and_then(Self::parsed_summary))
    }

    async fn account_exists(&self, key: &Pubkey) -> Result<bool> {
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            data_slice: None,
            min_context_slot: None,
        };
        let response = self
            .call("getAccountInfo", &self.gates.rpc, || {
                self.client.get_account_with_config(key, config.clone())
            })
            .await?;
        Ok(response.value.is_some())
    }

    async fn transaction_record(&self, signature: &str) -> Result<TransactionRecord> {
        let parsed = Signature::from_str(signature).map_err(|_| {
            SniperError::MalformedTransaction(format!("unparseable signature {signature}"))
        })?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let fetched = self
            .call("getTransaction", &self.gates.rpc, || {
                self.client.get_transaction_with_config(&parsed, config.clone())
            })
            .await?;
        TransactionRecord::from_encoded(signature, fetched)
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome> {
        let response = self
            .call("simulateTransaction", &self.gates.rpc, || {
                self.client.simulate_transaction(tx)
            })
            .await?;
        let value = response.value;
        Ok(SimulationOutcome {
            err: value.err.map(|e| e.to_string()),
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
        })
    }

    async fn send_and_confirm(&self, tx: &Transaction, deadline: Duration) -> Result<Signature> {
        let send_config = RpcSendTransactionConfig {
            // The executor has already simulated; a second preflight only
            // costs the race.
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .call("sendTransaction", &self.gates.rpc, || {
                self.client.send_transaction_with_config(tx, send_config.clone())
            })
            .await?;

        let started = Instant::now();
        let commitment = CommitmentConfig::confirmed();
        loop {
            if started.elapsed() >= deadline {
                return Err(SniperError::NotConfirmed(signature.to_string()));
            }
            self.gates.rpc.acquire().await;
            metrics().bump("rpc_request_attempt_getSignatureStatuses");
            match self.client.get_signature_statuses(&[signature]).await {
                Ok(response) => {
                    metrics().bump("rpc_request_success_getSignatureStatuses");
                    if let Some(Some(status)) = response.value.first() {
                        if let Some(err) = &status.err {
                            return Err(SniperError::ProviderError(format!(
                                "{signature} failed on chain: {err}"
                            )));
                        }
                        if status.satisfies_commitment(commitment) {
                            return Ok(signature);
                        }
                    }
                    debug!(sig = %signature, "not yet confirmed");
                }
                Err(e) => {
                    metrics().bump("rpc_request_error_getSignatureStatuses");
                    debug!(sig = %signature, error = %e, "confirmation poll failed");
                }
            }
            sleep(Duration::from_millis(400)).await;
        }
    }
}
