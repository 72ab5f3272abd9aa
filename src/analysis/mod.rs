//! Follow-up on reported contracts: source verification, then static analysis for functions that
//! send the contract's ether to an arbitrary address

mod guards;
mod slither;
mod verification;

use std::path::PathBuf;

use alloy_primitives::Address;
use color_eyre::eyre::Result;
use tracing::{debug, instrument, warn};

use crate::config::AnalysisConfig;

use self::guards::SoliditySources;
use self::slither::{Finding, Slither};
use self::verification::Etherscan;

const ARBITRARY_SEND: &str = "arbitrary-send-eth";

#[derive(Debug)]
pub struct Analyzer {
    etherscan: Etherscan,
    slither: Slither,

    /// Root of the per-address flattened sources
    sources_dir: PathBuf,
}

impl Analyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            etherscan: Etherscan::new(config)?,
            slither: Slither::new(config),
            sources_dir: config.sources_dir.clone(),
        })
    }

    pub async fn is_verified(&self, address: Address) -> Result<bool> {
        self.etherscan.is_verified(address).await
    }

    /// Functions anyone can call to send the contract's ether away
    ///
    /// Only meaningful for verified contracts, as slither works off the published sources
    #[instrument(skip(self))]
    pub async fn drainable_functions(&self, address: Address) -> Result<Vec<String>> {
        self.slither.run(address).await?;
        let findings = self.slither.findings(address).await?;
        debug!(findings = findings.len());

        let dir = self.sources_dir.join(address.to_checksum(None));
        let functions = tokio::task::spawn_blocking(move || {
            let sources = SoliditySources::load(&dir);
            if sources.is_empty() {
                warn!(dir = %dir.display(), "no sources found, findings are unfiltered");
            }
            unguarded(findings, &sources)
        })
        .await?;

        Ok(functions)
    }
}

/// Arbitrary-send findings on functions with no visible access control
fn unguarded(findings: Vec<Finding>, sources: &SoliditySources) -> Vec<String> {
    findings
        .into_iter()
        .filter(|f| f.check == ARBITRARY_SEND)
        .filter_map(|f| f.function)
        .filter(|function| {
            !sources.is_nonpublic(function)
                && !sources.has_modifier_guard(function)
                && !sources.has_manual_owner_check(function)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn finding(check: &str, function: Option<&str>) -> Finding {
        Finding {
            check: check.to_owned(),
            function: function.map(str::to_owned),
        }
    }

    #[test]
    fn test_unguarded() {
        let sources = SoliditySources::from_files(vec![r#"
            contract Vault {
                function sweep(address payable to) public { to.transfer(address(this).balance); }
                function drain(address payable to) external onlyOwner { to.transfer(1); }
                function rescue(address payable to) public {
                    require(msg.sender == owner);
                    to.transfer(address(this).balance);
                }
                function _pay(address payable to) internal { to.transfer(1); }
            }
        "#
        .to_owned()]);

        let findings = vec![
            finding(ARBITRARY_SEND, Some("sweep")),
            finding(ARBITRARY_SEND, Some("drain")),
            finding(ARBITRARY_SEND, Some("rescue")),
            finding(ARBITRARY_SEND, Some("_pay")),
            finding(ARBITRARY_SEND, None),
            finding("reentrancy-eth", Some("withdraw")),
        ];

        assert_eq!(unguarded(findings, &sources), vec!["sweep".to_owned()]);
    }

    #[test]
    fn test_unguarded_without_sources() {
        let findings = vec![finding(ARBITRARY_SEND, Some("sweep"))];

        assert_eq!(
            unguarded(findings, &SoliditySources::default()),
            vec!["sweep".to_owned()]
        );
    }
}
