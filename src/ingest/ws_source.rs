//! Persistent websocket subscriber.
//!
//! One connection carries one `logsSubscribe` per configured program,
//! issued ≥ 500 ms apart and tagged with the descriptor id. Messages run the
//! admission gate (throttle → dedup → staleness) before being handed to the
//! orchestrator. Any close recycles the connection under capped, jittered
//! backoff; SIGINT drives a one-way transition to `Closing`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{SelectAll, StreamExt};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::sync::{Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::ingest::{reconnect_backoff_ms, IngestGate, IngestState};
use crate::metrics::metrics;
use crate::rate_limit::RateGates;
use crate::rpc::ChainRpc;
use crate::types::{LogSender, ProgramDescriptor};

/// Spacing between consecutive subscription requests on a fresh connection.
const SUBSCRIBE_SPACING: Duration = Duration::from_millis(500);
/// Jitter ceiling added to every reconnect wait.
const RECONNECT_JITTER_MS: u64 = 1_000;
/// Watchdog poll period while streaming.
const WATCHDOG_PERIOD: Duration = Duration::from_secs(5);

pub struct WsIngest {
    socket_url: String,
    descriptors: Vec<ProgramDescriptor>,
    reconnect_base_ms: u64,
    reconnect_max_ms: u64,
    max_silent: Duration,
    gates: Arc<RateGates>,
    rpc: Arc<dyn ChainRpc>,
    gate: IngestGate,
    stop: Notify,
    stopping: AtomicBool,
    last_activity: RwLock<Instant>,
}

impl WsIngest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket_url: String,
        descriptors: Vec<ProgramDescriptor>,
        reconnect_base_ms: u64,
        reconnect_max_ms: u64,
        max_silent_ms: u64,
        gates: Arc<RateGates>,
        rpc: Arc<dyn ChainRpc>,
        gate: IngestGate,
    ) -> Self {
        Self {
            socket_url,
            descriptors,
            reconnect_base_ms,
            reconnect_max_ms,
            max_silent: Duration::from_millis(max_silent_ms),
            gates,
            rpc,
            gate,
            stop: Notify::new(),
            stopping: AtomicBool::new(false),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// One-way: once requested, the socket task closes and never reconnects.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
    }

    fn stop_requested(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: IngestState) {
        debug!(target: "ingest", ?state, "socket state");
        metrics().set_gauge("ingest_state", state as u64);
    }

    /// Run until stop is requested. Never returns on transient failure.
    pub async fn run(&self, tx: LogSender) {
        let mut attempt: u32 = 0;
        loop {
            if self.stop_requested() {
                self.set_state(IngestState::Disconnected);
                return;
            }
            self.set_state(IngestState::Connecting);
            match PubsubClient::new(&self.socket_url).await {
                Ok(client) => {
                    info!(target: "ingest", url = %self.socket_url, "socket connected");
                    match self.stream_session(&client, &tx).await {
                        SessionEnd::Stopped => {
                            self.set_state(IngestState::Disconnected);
                            return;
                        }
                        SessionEnd::Streamed => {
                            // The session reached STREAMING, so the endpoint
                            // is healthy; restart the schedule.
                            attempt = 0;
                        }
                        SessionEnd::Failed => {}
                    }
                }
                Err(e) => {
                    error!(target: "ingest", error = %e, "socket connect failed");
                }
            }
            self.set_state(IngestState::Disconnected);

            let wait = Duration::from_millis(
                reconnect_backoff_ms(attempt, self.reconnect_base_ms, self.reconnect_max_ms)
                    + fastrand::u64(0..RECONNECT_JITTER_MS),
            );
            attempt = attempt.saturating_add(1);
            metrics().bump("ingest_reconnects");
            warn!(target: "ingest", ?wait, attempt, "scheduling reconnect");
            if self.stop_requested() {
                return;
            }
            tokio::select! {
                _ = self.stop.notified() => {
                    self.set_state(IngestState::Closing);
                    self.set_state(IngestState::Disconnected);
                    return;
                }
                _ = sleep(wait) => {}
            }
        }
    }

    /// Subscribe to every descriptor and pump messages until the connection
    /// dies or stop is requested.
    async fn stream_session(&self, client: &PubsubClient, tx: &LogSender) -> SessionEnd {
        self.set_state(IngestState::Open);
        let commitment = RpcTransactionLogsConfig {
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let mut streams = SelectAll::new();
        let mut unsubscribes: Vec<
            Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>,
        > = Vec::with_capacity(self.descriptors.len());
        for (position, descriptor) in self.descriptors.iter().enumerate() {
            if position > 0 {
                sleep(SUBSCRIBE_SPACING).await;
            }
            if self.stop_requested() {
                self.set_state(IngestState::Closing);
                for unsubscribe in unsubscribes {
                    unsubscribe().await;
                }
                return SessionEnd::Stopped;
            }
            let filter =
                RpcTransactionLogsFilter::Mentions(vec![descriptor.address.to_string()]);
            match client.logs_subscribe(filter, commitment.clone()).await {
                Ok((stream, unsubscribe)) => {
                    let id = descriptor.id;
                    streams.push(stream.map(move |event| (id, event)).boxed());
                    unsubscribes.push(unsubscribe);
                    info!(
                        target: "ingest",
                        source = %descriptor.label,
                        id,
                        address = %descriptor.address,
                        "subscribed"
                    );
                }
                Err(e) => {
                    error!(target: "ingest", source = %descriptor.label, error = %e, "logsSubscribe failed");
                    for unsubscribe in unsubscribes {
                        unsubscribe().await;
                    }
                    return SessionEnd::Failed;
                }
            }
        }

        self.set_state(IngestState::Streaming);
        *self.last_activity.write().await = Instant::now();

        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    self.set_state(IngestState::Closing);
                    for unsubscribe in unsubscribes {
                        unsubscribe().await;
                    }
                    info!(target: "ingest", "socket closed on request");
                    return SessionEnd::Stopped;
                }
                event = streams.next() => {
                    match event {
                        Some((id, notification)) => {
                            *self.last_activity.write().await = Instant::now();
                            let Some(descriptor) =
                                self.descriptors.iter().find(|d| d.id == id)
                            else {
                                continue;
                            };
                            let value = notification.value;
                            let signature =
                                (!value.signature.is_empty()).then(|| value.signature.clone());
                            if let Some(msg) = self
                                .gate
                                .admit(
                                    &self.gates.socket,
                                    self.rpc.as_ref(),
                                    &descriptor.label,
                                    signature,
                                    notification.context.slot,
                                    value.logs,
                                )
                                .await
                            {
                                if tx.send(msg).await.is_err() {
                                    warn!(target: "ingest", "orchestrator channel closed");
                                    for unsubscribe in unsubscribes {
                                        unsubscribe().await;
                                    }
                                    return SessionEnd::Stopped;
                                }
                            }
                        }
                        None => {
                            warn!(target: "ingest", "all subscriptions ended");
                            return SessionEnd::Streamed;
                        }
                    }
                }
                _ = sleep(WATCHDOG_PERIOD) => {
                    let last = *self.last_activity.read().await;
                    if last.elapsed() > self.max_silent {
                        warn!(target: "ingest", silent = ?last.elapsed(), "socket silent too long, recycling");
                        for unsubscribe in unsubscribes {
                            unsubscribe().await;
                        }
                        return SessionEnd::Streamed;
                    }
                }
            }
        }
    }
}

enum SessionEnd {
    /// Stop requested; do not reconnect.
    Stopped,
    /// Session reached STREAMING before dying; reset the backoff schedule.
    Streamed,
    /// Subscription setup failed; keep escalating the backoff.
    Failed,
}
