//! End-to-end wiring: consumes retained log messages from ingest and runs
//! each through score → fingerprint → decode → validate → execute, strictly
//! in that order. Cross-message ordering is not guaranteed; per-message tasks
//! run concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classify::{match_fingerprints, score_logs, Fingerprint, FingerprintHit};
use crate::decode::{DecoderSet, TransactionRecord};
use crate::executor::{ExecutionOutcome, SnipeExecutor};
use crate::ingest::PipelineCounters;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::types::{
    BuyOrder, ClassificationSource, LogMessage, LogReceiver, ProgramDescriptor, Tag, TagResult,
};
use crate::validator::MintValidator;

/// Confidence at which a failed advisory validation no longer blocks
/// dispatch.
const VALIDATION_OVERRIDE_CONFIDENCE: f64 = 0.9;
/// Confidence assigned to score-only fallback classifications.
const FALLBACK_CONFIDENCE: f64 = 0.5;

pub struct Orchestrator {
    ctx: Arc<PipelineCtx>,
}

/// Everything a per-message task needs, shared by reference.
pub struct PipelineCtx {
    pub descriptors: Vec<ProgramDescriptor>,
    pub signal_weights: BTreeMap<String, f64>,
    pub fingerprints: Vec<Fingerprint>,
    pub score_threshold: f64,
    pub confidence_threshold: f64,
    pub amount_in_native: u64,
    pub dex_priority: Vec<String>,
    pub stats_interval: Duration,
    pub rpc: Arc<dyn ChainRpc>,
    pub decoders: DecoderSet,
    pub validator: Arc<MintValidator>,
    pub executor: Option<Arc<SnipeExecutor>>,
    pub counters: Arc<PipelineCounters>,
}

impl PipelineCtx {
    fn descriptor_for(&self, label: &str) -> Option<&ProgramDescriptor> {
        self.descriptors.iter().find(|d| d.label == label)
    }

    /// Venue the dispatch is attributed to. Tags name their venue directly;
    /// the score-only fallback borrows the highest-priority venue that is
    /// consistent with the source program.
    pub fn venue_for(&self, tag: Tag, source: &str) -> String {
        match tag {
            Tag::ScoreOnlyFallback => self
                .dex_priority
                .iter()
                .find(|v| v.as_str() == source)
                .cloned()
                .unwrap_or_else(|| {
                    self.dex_priority
                        .first()
                        .cloned()
                        .unwrap_or_else(|| source.to_string())
                }),
            _ => source.to_string(),
        }
    }

    /// Score and fingerprint stages. Pure over the message and the
    /// configured tables.
    pub fn classify(&self, msg: &LogMessage) -> Option<(Tag, f64, ClassificationSource)> {
        let joined = msg.joined_lines();
        let context = format!("{} {joined}", msg.source_program);
        let score = score_logs(&msg.lines, &context, &self.signal_weights);

        let program_id = self
            .descriptor_for(&msg.source_program)
            .map(|d| d.address.to_string())
            .unwrap_or_default();
        let hit: Option<FingerprintHit> = match_fingerprints(
            &self.fingerprints,
            &msg.lines,
            None,
            &program_id,
            &msg.source_program,
        );

        match hit {
            Some(hit) => Some((hit.tag, hit.confidence, ClassificationSource::Fingerprint)),
            None if score >= self.score_threshold => Some((
                Tag::ScoreOnlyFallback,
                FALLBACK_CONFIDENCE,
                ClassificationSource::ScoreFallback,
            )),
            None => {
                debug!(sig = %msg.signature, score, "no classification");
                None
            }
        }
    }
}

impl Orchestrator {
    pub fn new(ctx: PipelineCtx) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> Arc<PipelineCtx> {
        self.ctx.clone()
    }

    /// Consume retained messages until the channel closes or stop fires.
    /// In-flight per-message tasks are drained before returning.
    pub async fn run(&self, mut rx: LogReceiver, stop: Arc<Notify>) {
        let stats_ctx = self.ctx.clone();
        let stats_stop = stop.clone();
        let stats_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stats_ctx.stats_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stats_stop.notified() => break,
                    _ = ticker.tick() => {
                        stats_ctx.counters.log_report();
                        log_metrics_snapshot();
                    }
                }
            }
        });

        let mut tasks: JoinSet<()> = JoinSet::new();
        info!("orchestrator started");
        loop {
            tokio::select! {
                _ = stop.notified() => {
                    info!("shutdown requested, draining in-flight messages");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Some(msg) => {
                            let ctx = self.ctx.clone();
                            tasks.spawn(async move {
                                process_message(ctx, msg).await;
                            });
                            // Reap whatever already finished.
                            while tasks.try_join_next().is_some() {}
                        }
                        None => {
                            info!("ingest channel closed");
                            break;
                        }
                    }
                }
            }
        }
        while tasks.join_next().await.is_some() {}
        stats_task.abort();
        self.ctx.counters.log_report();
        log_metrics_snapshot();
        info!("orchestrator stopped");
    }
}

/// Registry-side half of the periodic report: RPC request counters and buy
/// latency percentiles from the process-global metrics snapshot.
fn log_metrics_snapshot() {
    let snapshot = metrics().export();

    let mut rpc_counters: Vec<(&String, &u64)> = snapshot
        .counters
        .iter()
        .filter(|(name, _)| name.starts_with("rpc_request_"))
        .collect();
    rpc_counters.sort();
    for (name, value) in rpc_counters {
        debug!(target: "metrics", counter = %name, value = *value, "rpc requests");
    }

    if let Some(buy) = snapshot.durations.get("executor_buy_ms") {
        info!(
            target: "metrics",
            count = buy.count,
            p50_ms = buy.p50_ms,
            p95_ms = buy.p95_ms,
            max_ms = buy.max_ms,
            "buy latency"
        );
    }
}

/// One message through the pipeline. Counter discipline: `matches` on
/// classification, `unresolved` on decode/validation failure, `failures` on
/// executor failure.
pub async fn process_message(ctx: Arc<PipelineCtx>, msg: LogMessage) {
    metrics().bump("pipeline_messages");

    let Some((tag, base_confidence, source)) = ctx.classify(&msg) else {
        return;
    };
    ctx.counters.bump_matches(&msg.source_program);

    let record = fetch_record(&ctx, &msg).await;
    let decoded = ctx
        .decoders
        .for_family(tag.decoder_family())
        .and_then(|decoder| decoder.decode(&record, &msg));

    let Some(decoded) = decoded else {
        ctx.counters.bump_unresolved(&msg.source_program);
        warn!(
            sig = %msg.signature,
            %tag,
            source = %msg.source_program,
            "classified but no mint recovered"
        );
        return;
    };

    let result = TagResult {
        tag,
        confidence: decoded.confidence.unwrap_or(base_confidence),
        mint: Some(decoded.mint),
        source: if decoded.confidence.is_some() {
            ClassificationSource::Decoder
        } else {
            source
        },
    };
    info!(
        sig = %msg.signature,
        %tag,
        confidence = result.confidence,
        mint = %decoded.mint,
        venue = %ctx.venue_for(tag, &msg.source_program),
        name = decoded.metadata.name.as_deref().unwrap_or(""),
        symbol = decoded.metadata.symbol.as_deref().unwrap_or(""),
        "launch resolved"
    );

    let validated = match ctx.validator.validate(&decoded.mint).await {
        Ok(v) => v,
        Err(e) => {
            warn!(mint = %decoded.mint, error = %e, "mint validation errored");
            false
        }
    };
    if !validated {
        if result.confidence >= VALIDATION_OVERRIDE_CONFIDENCE {
            warn!(
                mint = %decoded.mint,
                confidence = result.confidence,
                "validation failed, proceeding on classifier confidence"
            );
        } else {
            ctx.counters.bump_unresolved(&msg.source_program);
            warn!(mint = %decoded.mint, "validation failed, dropping");
            return;
        }
    }

    dispatch(&ctx, &msg, &result).await;
}

async fn fetch_record(ctx: &PipelineCtx, msg: &LogMessage) -> TransactionRecord {
    if !msg.has_real_signature() {
        return TransactionRecord::from_log_message(msg);
    }
    match ctx.rpc.transaction_record(&msg.signature).await {
        Ok(record) => record,
        Err(e) => {
            debug!(sig = %msg.signature, error = %e, "transaction fetch failed, decoding from feed logs");
            TransactionRecord::from_log_message(msg)
        }
    }
}

async fn dispatch(ctx: &PipelineCtx, msg: &LogMessage, result: &TagResult) {
    let Some(mint) = result.mint else { return };

    if !result.tag.is_launchpad_buy() {
        debug!(%mint, tag = %result.tag, "not a launchpad buy, no dispatch");
        return;
    }
    if result.confidence < ctx.confidence_threshold {
        debug!(
            %mint,
            confidence = result.confidence,
            threshold = ctx.confidence_threshold,
            "confidence below dispatch threshold"
        );
        return;
    }
    let Some(executor) = &ctx.executor else {
        warn!(%mint, "matched buyable launch but no executor armed");
        return;
    };

    let order = BuyOrder::new(mint, ctx.amount_in_native);
    info!(
        sig = %msg.signature,
        tag = %result.tag,
        confidence = result.confidence,
        %mint,
        amount = order.amount_lamports,
        "dispatching buy"
    );
    match executor.execute(&order).await {
        Ok(ExecutionOutcome::Submitted(signature)) => {
            info!(%mint, sig = %signature, "buy landed");
        }
        Ok(ExecutionOutcome::DryRun) => {
            info!(%mint, "dry run complete");
        }
        Err(e) => {
            ctx.counters.bump_failures(&msg.source_program);
            error!(%mint, error = %e, "buy dispatch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::fingerprint::compile;
    use crate::config::Config;
    use crate::ingest::PipelineCounters;
    use crate::rpc::{AccountSummary, SimulationOutcome};
    use async_trait::async_trait;
    use solana_sdk::pubkey::Pubkey;

    struct NoRpc;

    #[async_trait]
    impl ChainRpc for NoRpc {
        async fn latest_blockhash(&self) -> crate::errors::Result<solana_sdk::hash::Hash> {
            unimplemented!()
        }
        async fn current_slot(&self) -> crate::errors::Result<u64> {
            Ok(0)
        }
        async fn balance(&self, _key: &Pubkey) -> crate::errors::Result<u64> {
            unimplemented!()
        }
        async fn account_summary(
            &self,
            _key: &Pubkey,
        ) -> crate::errors::Result<Option<AccountSummary>> {
            Ok(None)
        }
        async fn account_exists(&self, _key: &Pubkey) -> crate::errors::Result<bool> {
            Ok(false)
        }
        async fn transaction_record(
            &self,
            _signature: &str,
        ) -> crate::errors::Result<TransactionRecord> {
            Err(crate::errors::SniperError::ProviderError("offline".into()))
        }
        async fn simulate(
            &self,
            _tx: &solana_sdk::transaction::Transaction,
        ) -> crate::errors::Result<SimulationOutcome> {
            unimplemented!()
        }
        async fn send_and_confirm(
            &self,
            _tx: &solana_sdk::transaction::Transaction,
            _deadline: Duration,
        ) -> crate::errors::Result<solana_sdk::signature::Signature> {
            unimplemented!()
        }
    }

    fn test_ctx() -> PipelineCtx {
        let cfg = Config::default();
        let descriptors = cfg.descriptors().unwrap();
        let rpc: Arc<dyn ChainRpc> = Arc::new(NoRpc);
        PipelineCtx {
            descriptors: descriptors.clone(),
            signal_weights: cfg.signal_weights.clone(),
            fingerprints: compile(&cfg.fingerprints),
            score_threshold: cfg.score_threshold,
            confidence_threshold: cfg.confidence_threshold,
            amount_in_native: cfg.amount_in_native,
            dex_priority: cfg.dex_priority.clone(),
            stats_interval: Duration::from_secs(10),
            rpc: rpc.clone(),
            decoders: DecoderSet::standard(),
            validator: Arc::new(MintValidator::new(rpc)),
            executor: None,
            counters: Arc::new(PipelineCounters::for_descriptors(&descriptors)),
        }
    }

    fn pump_create_msg() -> LogMessage {
        LogMessage {
            signature: "slot-100".into(),
            slot: 100,
            source_program: "pumpfun".into(),
            lines: vec![
                "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]".into(),
                "Program log: Instruction: Create".into(),
                "Program log: Instruction: InitializeMint2".into(),
                "Program log: Instruction: MintTo".into(),
            ],
            received_at_ms: 0,
        }
    }

    #[test]
    fn pump_create_classifies_by_fingerprint() {
        let ctx = test_ctx();
        let (tag, confidence, source) = ctx.classify(&pump_create_msg()).unwrap();
        assert_eq!(tag, Tag::PumpfunCreate);
        assert!(confidence > 0.8);
        assert_eq!(source, ClassificationSource::Fingerprint);
    }

    #[test]
    fn unknown_trace_is_unclassified() {
        let ctx = test_ctx();
        let msg = LogMessage {
            signature: "slot-5".into(),
            slot: 5,
            source_program: "pumpfun".into(),
            lines: vec!["Program log: Instruction: Transfer".into()],
            received_at_ms: 0,
        };
        assert!(ctx.classify(&msg).is_none());
    }

    #[test]
    fn heavy_score_without_fingerprint_falls_back() {
        let mut ctx = test_ctx();
        ctx.fingerprints.clear();
        let (tag, confidence, source) = ctx.classify(&pump_create_msg()).unwrap();
        assert_eq!(tag, Tag::ScoreOnlyFallback);
        assert_eq!(confidence, FALLBACK_CONFIDENCE);
        assert_eq!(source, ClassificationSource::ScoreFallback);
    }

    #[test]
    fn venue_prefers_source_when_prioritised() {
        let ctx = test_ctx();
        assert_eq!(ctx.venue_for(Tag::ScoreOnlyFallback, "raydium_amm"), "raydium_amm");
        assert_eq!(ctx.venue_for(Tag::ScoreOnlyFallback, "not-listed"), "pumpfun");
        assert_eq!(ctx.venue_for(Tag::PumpfunCreate, "pumpfun"), "pumpfun");
    }

    #[tokio::test]
    async fn unresolvable_message_bumps_unresolved() {
        let ctx = Arc::new(test_ctx());
        // Classifies as pumpfun_create but carries no Program data frame, and
        // the transaction cannot be fetched: decode must fail.
        process_message(ctx.clone(), pump_create_msg()).await;
        let counters = ctx.counters.source("pumpfun").unwrap();
        assert_eq!(counters.matches.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(counters.unresolved.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(counters.failures.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
