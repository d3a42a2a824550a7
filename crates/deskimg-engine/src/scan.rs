//! Summaries of trivy `--format json` image reports.

use crate::ImageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SEVERITIES: &[&str] = &["CRITICAL", "HIGH", "MEDIUM", "LOW", "UNKNOWN"];

#[derive(Debug, Deserialize)]
struct TrivyReport {
    #[serde(rename = "ArtifactName", default)]
    artifact_name: String,
    #[serde(rename = "Results", default)]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
struct TrivyResult {
    #[serde(rename = "Target", default)]
    target: String,
    // trivy emits `null` rather than omitting the field for clean targets
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Debug, Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID", default)]
    id: String,
    #[serde(rename = "PkgName", default)]
    package: String,
    #[serde(rename = "Severity", default)]
    severity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub id: String,
    pub package: String,
    pub severity: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub artifact: String,
    /// Count per severity; every entry of [`SEVERITIES`] is present.
    pub counts: BTreeMap<String, usize>,
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn from_json(raw: &str) -> Result<Self, ImageError> {
        let report: TrivyReport = serde_json::from_str(raw)?;

        let mut counts: BTreeMap<String, usize> =
            SEVERITIES.iter().map(|s| ((*s).to_owned(), 0)).collect();
        let mut findings = Vec::new();

        for result in report.results {
            for vuln in result.vulnerabilities.unwrap_or_default() {
                let severity = normalize_severity(&vuln.severity);
                *counts.entry(severity.clone()).or_default() += 1;
                findings.push(Finding {
                    id: vuln.id,
                    package: vuln.package,
                    severity,
                    target: result.target.clone(),
                });
            }
        }

        Ok(Self {
            artifact: report.artifact_name,
            counts,
            findings,
        })
    }

    pub fn total(&self) -> usize {
        self.findings.len()
    }

    pub fn count(&self, severity: &str) -> usize {
        self.counts.get(severity).copied().unwrap_or(0)
    }
}

fn normalize_severity(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if SEVERITIES.contains(&upper.as_str()) {
        upper
    } else {
        "UNKNOWN".to_owned()
    }
}
