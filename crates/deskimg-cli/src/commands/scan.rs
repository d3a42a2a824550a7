use super::{colorize_severity, json_pretty, with_spinner, EXIT_SUCCESS};
use deskimg_engine::scan::SEVERITIES;
use deskimg_engine::{ImageProcessor, ScanReport};

const MAX_LISTED: usize = 20;

pub async fn run(processor: &ImageProcessor, reference: &str, json: bool) -> Result<u8, String> {
    let result = with_spinner(
        json,
        &format!("scanning {reference}..."),
        "scan complete",
        "scan failed",
        processor.scan(reference),
    )
    .await?;

    let report = ScanReport::from_json(&result.stdout)
        .map_err(|e| format!("unreadable trivy report: {e}"))?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{}: {} vulnerabilities", report.artifact, report.total());
    for severity in SEVERITIES {
        println!("  {:<10} {}", colorize_severity(severity), report.count(severity));
    }
    for finding in report.findings.iter().take(MAX_LISTED) {
        println!(
            "{:<10} {:<18} {:<24} {}",
            colorize_severity(&finding.severity),
            finding.id,
            finding.package,
            finding.target
        );
    }
    if report.total() > MAX_LISTED {
        println!("... {} more (use --json for all)", report.total() - MAX_LISTED);
    }
    Ok(EXIT_SUCCESS)
}
