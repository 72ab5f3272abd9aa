use std::time::Duration;

use futures::{future, stream, StreamExt};
use tracing::{debug, info, instrument};

use super::{Endpoint, Probe, ProbeResult};
use crate::config::NodesConfig;

/// Selection parameters
#[derive(Debug, Clone)]
pub struct Selection {
    /// Calls every kept endpoint must answer back-to-back
    pub burst: usize,

    /// How many of the fastest endpoints get burst-probed
    pub top_n: usize,

    /// Per-call timeout
    pub timeout: Duration,

    /// Latency probes in flight at once
    pub latency_concurrency: usize,
}

impl From<&NodesConfig> for Selection {
    fn from(config: &NodesConfig) -> Self {
        Self {
            burst: config.burst,
            top_n: config.top_n,
            timeout: config.timeout(),
            latency_concurrency: config.latency_concurrency,
        }
    }
}

/// Ranks candidates by latency and keeps the fastest `top_n` that sustain a full burst
///
/// Only the `top_n` fastest are burst-probed, so unreliable endpoints further down the list are
/// spared the load. The result keeps latency order, fastest first, and may be empty
#[instrument(skip_all, fields(candidates = candidates.len(), burst = selection.burst))]
pub async fn select_working<P: Probe + ?Sized>(
    probe: &P,
    candidates: Vec<Endpoint>,
    selection: &Selection,
) -> Vec<Endpoint> {
    let mut responsive: Vec<(Endpoint, u64)> = stream::iter(candidates.iter())
        .map(|endpoint| probe.measure_latency(endpoint, selection.timeout))
        .buffer_unordered(selection.latency_concurrency.max(1))
        .filter_map(|result| {
            let ProbeResult {
                endpoint,
                latency_ms,
                ..
            } = result;
            future::ready(latency_ms.map(|ms| (endpoint, ms)))
        })
        .collect()
        .await;

    debug!(responsive = responsive.len());

    responsive.sort_by_key(|(_, ms)| *ms);
    responsive.truncate(selection.top_n);

    // join_all keeps input order, so no re-sorting is needed afterwards
    let bursts = future::join_all(
        responsive
            .iter()
            .map(|(endpoint, _)| probe.probe_burst(endpoint, selection.burst, selection.timeout)),
    )
    .await;

    responsive
        .into_iter()
        .zip(bursts)
        .filter_map(|((endpoint, latency_ms), burst)| {
            info!(
                endpoint = %endpoint,
                latency_ms,
                success = burst.success_count,
                elapsed_ms = burst.elapsed.as_millis() as u64,
                passed = burst.passed(),
            );
            burst.passed().then_some(endpoint)
        })
        .collect()
}
