//! Advisory mint validation: one `getAccountInfo` per candidate address for
//! the life of the process, memoized whichever way it resolves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::errors::Result;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;

pub struct MintValidator {
    rpc: Arc<dyn ChainRpc>,
    verdicts: Mutex<HashMap<Pubkey, bool>>,
}

impl MintValidator {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// True iff the account exists, is owned by the SPL token program, and
    /// parses as a mint. The verdict is cached for the process lifetime.
    pub async fn validate(&self, address: &Pubkey) -> Result<bool> {
        if let Some(&verdict) = self.verdicts.lock().unwrap().get(address) {
            metrics().bump("mint_validate_cache_hit");
            return Ok(verdict);
        }

        let summary = self.rpc.account_summary(address).await?;
        let verdict = summary
            .map(|s| s.owner == spl_token::id() && s.parsed_kind.as_deref() == Some("mint"))
            .unwrap_or(false);
        debug!(mint = %address, verdict, "mint validated");
        metrics().bump("mint_validate_lookup");
        self.verdicts.lock().unwrap().insert(*address, verdict);
        Ok(verdict)
    }

    pub fn cached_len(&self) -> usize {
        self.verdicts.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::AccountSummary;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct StubRpc {
        calls: AtomicU64,
        summary: Option<AccountSummary>,
    }

    #[async_trait]
    impl ChainRpc for StubRpc {
        async fn latest_blockhash(&self) -> Result<solana_sdk::hash::Hash> {
            unimplemented!()
        }
        async fn current_slot(&self) -> Result<u64> {
            unimplemented!()
        }
        async fn balance(&self, _key: &Pubkey) -> Result<u64> {
            unimplemented!()
        }
        async fn account_summary(&self, _key: &Pubkey) -> Result<Option<AccountSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.summary.clone())
        }
        async fn account_exists(&self, _key: &Pubkey) -> Result<bool> {
            unimplemented!()
        }
        async fn transaction_record(&self, _signature: &str) -> Result<crate::decode::TransactionRecord> {
            unimplemented!()
        }
        async fn simulate(
            &self,
            _tx: &solana_sdk::transaction::Transaction,
        ) -> Result<crate::rpc::SimulationOutcome> {
            unimplemented!()
        }
        async fn send_and_confirm(
            &self,
            _tx: &solana_sdk::transaction::Transaction,
            _deadline: Duration,
        ) -> Result<solana_sdk::signature::Signature> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn real_mint_validates_true() {
        let rpc = Arc::new(StubRpc {
            calls: AtomicU64::new(0),
            summary: Some(AccountSummary {
                owner: spl_token::id(),
                parsed_kind: Some("mint".into()),
            }),
        });
        let validator = MintValidator::new(rpc);
        assert!(validator.validate(&Pubkey::new_unique()).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_owner_or_kind_fails() {
        let wrong_owner = Arc::new(StubRpc {
            calls: AtomicU64::new(0),
            summary: Some(AccountSummary {
                owner: Pubkey::new_unique(),
                parsed_kind: Some("mint".into()),
            }),
        });
        assert!(!MintValidator::new(wrong_owner)
            .validate(&Pubkey::new_unique())
            .await
            .unwrap());

        let wrong_kind = Arc::new(StubRpc {
            calls: AtomicU64::new(0),
            summary: Some(AccountSummary {
                owner: spl_token::id(),
                parsed_kind: Some("account".into()),
            }),
        });
        assert!(!MintValidator::new(wrong_kind)
            .validate(&Pubkey::new_unique())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_account_fails() {
        let rpc = Arc::new(StubRpc {
            calls: AtomicU64::new(0),
            summary: None,
        });
        assert!(!MintValidator::new(rpc)
            .validate(&Pubkey::new_unique())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn verdicts_are_memoized_per_address() {
        let rpc = Arc::new(StubRpc {
            calls: AtomicU64::new(0),
            summary: Some(AccountSummary {
                owner: spl_token::id(),
                parsed_kind: Some("mint".into()),
            }),
        });
        let validator = MintValidator::new(rpc.clone());
        let mint = Pubkey::new_unique();
        for _ in 0..5 {
            assert!(validator.validate(&mint).await.unwrap());
        }
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);

        // A different address pays its own single lookup.
        validator.validate(&Pubkey::new_unique()).await.unwrap();
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 2);
        assert_eq!(validator.cached_len(), 2);
    }
}
