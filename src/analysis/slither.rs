use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use alloy_primitives::Address;
use color_eyre::eyre::Result;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::AnalysisConfig;

const DETECTORS: &str = "arbitrary-send-eth,reentrancy-eth,incorrect-return";
const EXCLUDED_DETECTORS: &str = "solidity-safemath,arithmetic";
const EXCLUDED_PATHS: &str = r".*SafeMath\.sol|.*openzeppelin/.*|.*libraries/.*";

/// A high impact detector hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check: String,

    /// The function the finding points at, if slither named one
    pub function: Option<String>,
}

/// Runs the slither static analyzer against deployed, verified contracts
#[derive(Debug)]
pub struct Slither {
    bin: PathBuf,
    chain_slug: String,
    reports_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct Report {
    #[serde(default)]
    results: Results,
}

#[derive(Debug, Default, Deserialize)]
struct Results {
    #[serde(default)]
    detectors: Vec<Detector>,
}

#[derive(Debug, Deserialize)]
struct Detector {
    #[serde(default)]
    check: String,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
}

impl Slither {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            bin: config.slither_bin.clone(),
            chain_slug: config.chain_slug.clone(),
            reports_dir: config.reports_dir.clone(),
        }
    }

    fn report_path(&self, address: Address) -> PathBuf {
        self.reports_dir
            .join(format!("{}.json", address.to_checksum(None)))
    }

    /// Analyzes `address`, leaving a JSON report behind
    ///
    /// Slither exits non-zero whenever a detector fires, so only failing to launch it is an error
    #[instrument(skip(self))]
    pub async fn run(&self, address: Address) -> Result<()> {
        let report = self.report_path(address);
        tokio::fs::create_dir_all(&self.reports_dir).await?;

        // slither refuses to overwrite an existing report
        if let Err(e) = tokio::fs::remove_file(&report).await {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        let output = Command::new(&self.bin)
            .arg(format!("{}:{}", self.chain_slug, address.to_checksum(None)))
            .args(["--detect", DETECTORS])
            .args(["--exclude-detectors", EXCLUDED_DETECTORS])
            .args(["--exclude-paths", EXCLUDED_PATHS])
            .arg("--json")
            .arg(&report)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.stderr.is_empty() {
            debug!(status = %output.status, "slither ran clean");
        } else {
            warn!(status = %output.status, "slither reported issues or warnings");
        }

        Ok(())
    }

    /// High impact findings of the last run, with high or medium confidence
    pub async fn findings(&self, address: Address) -> Result<Vec<Finding>> {
        match tokio::fs::read_to_string(self.report_path(address)).await {
            Ok(json) => Ok(parse_report(&json)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_report(json: &str) -> Result<Vec<Finding>, serde_json::Error> {
    let report: Report = serde_json::from_str(json)?;

    Ok(report
        .results
        .detectors
        .into_iter()
        .filter(|d| d.impact.eq_ignore_ascii_case("high"))
        .filter(|d| {
            d.confidence.eq_ignore_ascii_case("high") || d.confidence.eq_ignore_ascii_case("medium")
        })
        .map(|d| Finding {
            check: d.check.to_lowercase(),
            function: d
                .elements
                .into_iter()
                .find(|e| e.kind == "function")
                .map(|e| e.name),
        })
        .collect())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn report() -> &'static str {
        r#"{
            "success": true,
            "error": null,
            "results": {
                "detectors": [
                    {
                        "check": "arbitrary-send-eth",
                        "impact": "High",
                        "confidence": "Medium",
                        "elements": [
                            { "type": "function", "name": "sweep" },
                            { "type": "node", "name": "to.transfer(address(this).balance)" }
                        ]
                    },
                    {
                        "check": "reentrancy-eth",
                        "impact": "High",
                        "confidence": "Low",
                        "elements": [{ "type": "function", "name": "withdraw" }]
                    },
                    {
                        "check": "incorrect-return",
                        "impact": "High",
                        "confidence": "High",
                        "elements": [{ "type": "node", "name": "return(0, 0)" }]
                    },
                    {
                        "check": "naming-convention",
                        "impact": "Informational",
                        "confidence": "High",
                        "elements": []
                    }
                ]
            }
        }"#
    }

    #[rstest]
    fn test_parse_report(report: &str) -> Result<()> {
        let findings = parse_report(report)?;

        assert_eq!(
            findings,
            vec![
                Finding {
                    check: "arbitrary-send-eth".to_owned(),
                    function: Some("sweep".to_owned()),
                },
                Finding {
                    check: "incorrect-return".to_owned(),
                    function: None,
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn test_parse_failed_run() -> Result<()> {
        let findings = parse_report(r#"{ "success": false, "error": "compilation failed" }"#)?;

        assert!(findings.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let slither = Slither {
            bin: PathBuf::from("slither"),
            chain_slug: "mainnet".to_owned(),
            reports_dir: dir.path().to_path_buf(),
        };

        assert!(slither.findings(Address::ZERO).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let slither = Slither {
            bin: dir.path().join("no-such-slither"),
            chain_slug: "mainnet".to_owned(),
            reports_dir: dir.path().join("reports"),
        };

        assert!(slither.run(Address::ZERO).await.is_err());

        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_run_kills_slither() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("finished");
        let bin = dir.path().join("slow-slither");
        std::fs::write(
            &bin,
            format!("#!/bin/sh\nsleep 1\ntouch '{}'\n", marker.display()),
        )?;
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))?;

        let slither = Slither {
            bin,
            chain_slug: "mainnet".to_owned(),
            reports_dir: dir.path().join("reports"),
        };

        let run = tokio::time::timeout(Duration::from_millis(200), slither.run(Address::ZERO));
        assert!(run.await.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());

        Ok(())
    }
}
