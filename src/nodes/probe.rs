use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::Endpoint;
use crate::rpc::{ChainRpc, HttpRpc};

/// Outcome of probing one endpoint
///
/// A latency probe is a burst of size one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub latency_ms: Option<u64>,
    pub success_count: usize,
    pub burst_size: usize,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn latency(endpoint: Endpoint, latency_ms: Option<u64>, elapsed: Duration) -> Self {
        Self {
            endpoint,
            latency_ms,
            success_count: latency_ms.map_or(0, |_| 1),
            burst_size: 1,
            elapsed,
        }
    }

    pub fn burst(
        endpoint: Endpoint,
        success_count: usize,
        burst_size: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            endpoint,
            latency_ms: None,
            success_count,
            burst_size,
            elapsed,
        }
    }

    /// Whether every call of the burst succeeded
    pub fn passed(&self) -> bool {
        self.success_count == self.burst_size
    }
}

/// Measures endpoint health. Never fails: problems show up as absent latency or a short burst
#[async_trait]
pub trait Probe: Send + Sync {
    async fn measure_latency(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeResult;

    async fn probe_burst(&self, endpoint: &Endpoint, burst: usize, timeout: Duration)
        -> ProbeResult;
}

/// Probes endpoints with `eth_blockNumber` calls over HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProbe;

#[async_trait]
impl Probe for HttpProbe {
    async fn measure_latency(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeResult {
        let rpc = match HttpRpc::new(&endpoint.url, timeout) {
            Ok(rpc) => rpc,
            Err(e) => {
                debug!(endpoint = %endpoint, "unusable endpoint: {}", e);
                return ProbeResult::latency(endpoint.clone(), None, Duration::ZERO);
            }
        };

        let start = Instant::now();
        let latency_ms = match rpc.block_number().await {
            Ok(_) => Some(start.elapsed().as_millis() as u64),
            Err(e) => {
                trace!(endpoint = %endpoint, "latency probe failed: {}", e);
                None
            }
        };

        ProbeResult::latency(endpoint.clone(), latency_ms, start.elapsed())
    }

    async fn probe_burst(
        &self,
        endpoint: &Endpoint,
        burst: usize,
        timeout: Duration,
    ) -> ProbeResult {
        let start = Instant::now();
        let mut success_count = 0;

        match HttpRpc::new(&endpoint.url, timeout) {
            Ok(rpc) => {
                for _ in 0..burst {
                    if let Err(e) = rpc.block_number().await {
                        debug!(endpoint = %endpoint, success_count, "burst stopped: {}", e);
                        break;
                    }
                    success_count += 1;
                }
            }
            Err(e) => debug!(endpoint = %endpoint, "unusable endpoint: {}", e),
        }

        ProbeResult::burst(endpoint.clone(), success_count, burst, start.elapsed())
    }
}
