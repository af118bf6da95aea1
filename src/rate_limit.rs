//! Token-bucket gates over `governor`.
//!
//! Three buckets exist per process: the websocket message path (non-blocking,
//! refusals shed load), the generic RPC path (blocking), and the
//! mint-validation RPC path (blocking, separately budgeted so validation
//! bursts cannot starve the executor).

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::metrics::metrics;

pub struct TokenGate {
    name: &'static str,
    limiter: DefaultDirectRateLimiter,
}

impl TokenGate {
    /// `rate_per_second` doubles as the burst size when `burst` is zero.
    pub fn new(name: &'static str, rate_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate_per_second.max(1)).expect("nonzero rate");
        let burst = NonZeroU32::new(if burst == 0 { rate_per_second.max(1) } else { burst })
            .expect("nonzero burst");
        let limiter = RateLimiter::direct(Quota::per_second(rate).allow_burst(burst));
        Self { name, limiter }
    }

    /// Non-blocking single-token acquisition. The message path drops on `false`.
    pub fn try_acquire(&self) -> bool {
        let ok = self.limiter.check().is_ok();
        if !ok {
            metrics().bump(&format!("rate_gate_refused_{}", self.name));
        }
        ok
    }

    pub fn try_acquire_n(&self, n: u32) -> bool {
        let Some(n) = NonZeroU32::new(n) else {
            return true;
        };
        match self.limiter.check_n(n) {
            Ok(Ok(())) => true,
            _ => {
                metrics().bump(&format!("rate_gate_refused_{}", self.name));
                false
            }
        }
    }

    /// Suspends until a token is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub async fn acquire_n(&self, n: u32) {
        if let Some(n) = NonZeroU32::new(n) {
            // Requests larger than the bucket can never be satisfied; treat
            // that as a single-token wait rather than suspending forever.
            if self.limiter.until_n_ready(n).await.is_err() {
                self.limiter.until_ready().await;
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The per-process bucket set, built once from configuration.
pub struct RateGates {
    pub socket: TokenGate,
    pub rpc: TokenGate,
    pub validation: TokenGate,
}

impl RateGates {
    pub fn new(socket_rate: u32, rpc_rate: u32, validation_rate: u32) -> Self {
        Self {
            socket: TokenGate::new("socket", socket_rate, 0),
            rpc: TokenGate::new("rpc", rpc_rate, 0),
            validation: TokenGate::new("validation", validation_rate, 0),
        }
    }
}
