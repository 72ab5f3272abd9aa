//! Discovery and selection of public RPC endpoints
//!
//! Candidates come from an [`EndpointDirectory`], are ranked by single-call latency, and the
//! fastest few are kept only if they sustain a full burst of back-to-back calls

mod directory;
mod probe;
mod selector;

use std::fmt;

use color_eyre::eyre::Result;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::NodesConfig;

pub use self::directory::{EndpointDirectory, NodesPage, StaticEndpoints};
pub use self::probe::{HttpProbe, Probe, ProbeResult};
pub use self::selector::{select_working, Selection};

/// A single JSON-RPC server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Discovers candidates and returns the ones worth using, fastest first
///
/// Fails if the candidate list can't be obtained. An empty result means nothing survived
/// probing, which is left to the caller to judge
#[instrument(name = "nodes", skip_all)]
pub async fn find_working_endpoints(config: &NodesConfig) -> Result<Vec<Endpoint>> {
    let directory: Box<dyn EndpointDirectory> = match config.pinned.endpoints() {
        Some(endpoints) => Box::new(StaticEndpoints::new(endpoints.to_vec())),
        None => Box::new(NodesPage::new(
            &config.directory_url,
            config.directory_timeout(),
        )?),
    };

    let candidates = directory.discover().await?;
    info!(candidates = candidates.len(), "probing endpoints");

    Ok(select_working(&HttpProbe, candidates, &Selection::from(config)).await)
}
