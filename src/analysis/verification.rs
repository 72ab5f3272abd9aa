use std::time::Duration;

use alloy_primitives::Address;
use color_eyre::eyre::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::config::AnalysisConfig;

/// Source verification lookups against an etherscan-compatible API
#[derive(Debug)]
pub struct Etherscan {
    client: reqwest::Client,
    url: String,
    api_key: String,
    chain_id: u64,
}

#[derive(Debug, Deserialize)]
struct SourceCodeResponse {
    #[serde(default)]
    result: Value,
}

impl Etherscan {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            url: config.etherscan_url.clone(),
            api_key: config.etherscan_api_key(),
            chain_id: config.chain_id,
        })
    }

    #[instrument(skip(self))]
    pub async fn is_verified(&self, address: Address) -> Result<bool> {
        let resp: SourceCodeResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("chainid", self.chain_id.to_string()),
                ("module", "contract".to_owned()),
                ("action", "getsourcecode".to_owned()),
                ("address", address.to_checksum(None)),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(has_verified_source(&resp.result))
    }
}

/// Verified sources come back with a non-blank `SourceCode`, and an `ABI` other than the
/// "Contract source code not verified" placeholder. Error payloads (a plain string) are not
fn has_verified_source(result: &Value) -> bool {
    let Some(entry) = result.get(0) else {
        return false;
    };

    let source = entry["SourceCode"].as_str().unwrap_or_default();
    let abi = entry["ABI"].as_str().unwrap_or_default();

    !source.trim().is_empty() && !abi.to_lowercase().contains("not verified")
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(json!([{ "SourceCode": "pragma solidity ^0.8.0;", "ABI": "[]" }]), true)]
    #[case(json!([{ "SourceCode": "", "ABI": "Contract source code not verified" }]), false)]
    #[case(json!([{ "SourceCode": "  \n", "ABI": "[]" }]), false)]
    #[case(json!([{ "SourceCode": "contract A {}", "ABI": "Contract source code NOT VERIFIED" }]), false)]
    #[case(json!("Invalid API Key"), false)]
    #[case(json!([]), false)]
    #[case(Value::Null, false)]
    fn test_has_verified_source(#[case] result: Value, #[case] expected: bool) {
        assert_eq!(has_verified_source(&result), expected);
    }
}
