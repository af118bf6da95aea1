//! Application entry: wires websocket ingest, classification, validation and
//! the launchpad buy executor together.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use launch_sniper::backoff::BackoffPolicy;
use launch_sniper::classify::fingerprint::compile;
use launch_sniper::config::Config;
use launch_sniper::decode::DecoderSet;
use launch_sniper::executor::{LaunchpadKeys, SnipeExecutor};
use launch_sniper::ingest::ws_source::WsIngest;
use launch_sniper::ingest::{
    spawn_dedup_sweeper, DedupCache, IngestGate, PipelineCounters, SlotCache,
};
use launch_sniper::orchestrator::{Orchestrator, PipelineCtx};
use launch_sniper::rate_limit::RateGates;
use launch_sniper::rpc::{ChainRpc, RpcGateway};
use launch_sniper::validator::MintValidator;
use launch_sniper::wallet::WalletManager;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            return ExitCode::FAILURE;
        }
    };
    info!(
        socket = %cfg.socket_url,
        rpc = %cfg.rpc_url,
        programs = cfg.program_subscriptions.len(),
        dry_run = cfg.dry_run,
        "configuration loaded"
    );

    let descriptors = match cfg.descriptors() {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "subscription list rejected");
            return ExitCode::FAILURE;
        }
    };

    let gates = Arc::new(RateGates::new(
        cfg.socket_message_rate_limit,
        cfg.rpc_rate_limit,
        cfg.validation_rate_limit,
    ));
    let backoff = BackoffPolicy::new(cfg.rpc_retry_delay_ms, cfg.rpc_max_retries);
    let rpc: Arc<dyn ChainRpc> = Arc::new(RpcGateway::new(&cfg.rpc_url, gates.clone(), backoff));

    // The executor arms only with a payer keypair; without one the pipeline
    // still classifies and validates.
    let executor = match build_executor(&cfg, rpc.clone()) {
        Ok(executor) => executor,
        Err(code) => return code,
    };

    let counters = Arc::new(PipelineCounters::for_descriptors(&descriptors));
    let dedup = Arc::new(DedupCache::new(Duration::from_secs(cfg.dedup_ttl_secs)));
    let slot_cache = Arc::new(SlotCache::new(Duration::from_secs(1)));
    let stop = Arc::new(Notify::new());

    let sweeper = spawn_dedup_sweeper(
        dedup.clone(),
        Duration::from_secs(cfg.dedup_sweep_secs),
        stop.clone(),
    );

    let (log_tx, log_rx) = mpsc::channel(1024);
    let ingest = Arc::new(WsIngest::new(
        cfg.socket_url.clone(),
        descriptors.clone(),
        cfg.ws_reconnect_base_ms,
        cfg.ws_reconnect_max_ms,
        cfg.ws_max_silent_ms,
        gates.clone(),
        rpc.clone(),
        IngestGate {
            dedup: dedup.clone(),
            slot_cache: slot_cache.clone(),
            counters: counters.clone(),
            stale_slot_threshold: cfg.stale_slot_threshold,
        },
    ));
    let ingest_task = {
        let ingest = ingest.clone();
        tokio::spawn(async move {
            ingest.run(log_tx).await;
        })
    };

    let orchestrator = Orchestrator::new(PipelineCtx {
        descriptors,
        signal_weights: cfg.signal_weights.clone(),
        fingerprints: compile(&cfg.fingerprints),
        score_threshold: cfg.score_threshold,
        confidence_threshold: cfg.confidence_threshold,
        amount_in_native: cfg.amount_in_native,
        dex_priority: cfg.dex_priority.clone(),
        stats_interval: Duration::from_secs(cfg.stats_interval_secs),
        rpc: rpc.clone(),
        decoders: DecoderSet::standard(),
        validator: Arc::new(MintValidator::new(rpc.clone())),
        executor,
        counters,
    });

    let shutdown_stop = stop.clone();
    let shutdown_ingest = ingest.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, shutting down");
            shutdown_ingest.request_stop();
            shutdown_stop.notify_waiters();
        }
    });

    orchestrator.run(log_rx, stop.clone()).await;

    let _ = ingest_task.await;
    sweeper.abort();
    info!("clean shutdown");
    ExitCode::SUCCESS
}

fn build_executor(
    cfg: &Config,
    rpc: Arc<dyn ChainRpc>,
) -> Result<Option<Arc<SnipeExecutor>>, ExitCode> {
    let Some(path) = &cfg.keypair_path else {
        if cfg.dry_run {
            warn!("no keypair configured; pipeline runs without an executor");
            return Ok(None);
        }
        error!("live mode requires a payer keypair");
        return Err(ExitCode::FAILURE);
    };

    let wallet = match WalletManager::from_file(path) {
        Ok(wallet) => Arc::new(wallet),
        Err(e) => {
            // An unreadable payer key is an unrecoverable init failure.
            error!(error = %e, "payer keypair rejected");
            return Err(ExitCode::FAILURE);
        }
    };
    let keys = match LaunchpadKeys::from_config(cfg) {
        Ok(keys) => keys,
        Err(e) => {
            error!(error = %e, "launchpad constants rejected");
            return Err(ExitCode::FAILURE);
        }
    };
    Ok(Some(Arc::new(SnipeExecutor::new(
        rpc,
        wallet,
        keys,
        Duration::from_secs(cfg.rpc_deadline_secs),
        cfg.dry_run,
    ))))
}
