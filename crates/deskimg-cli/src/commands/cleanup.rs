use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use deskimg_engine::cluster::KubeClusterClient;
use deskimg_engine::{CleanupReport, ImageProcessor};

pub async fn run(processor: &ImageProcessor, context: &str, json: bool) -> Result<u8, String> {
    let cluster = KubeClusterClient::for_context(context)
        .await
        .map_err(|e| e.to_string())?;

    let pb = (!json).then(|| spinner("removing legacy builder..."));
    let report = processor.remove_legacy_builder(&cluster).await;

    if let Some(ref pb) = pb {
        if report.is_clean() {
            spin_ok(pb, "legacy builder removed");
        } else {
            spin_fail(pb, "legacy builder cleanup incomplete");
        }
    }
    render(&report, json)
}

/// Print the report. Leftover resources are reported, not treated as failure.
fn render(report: &CleanupReport, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(report)?);
    } else {
        for item in &report.deleted {
            println!("deleted {item}");
        }
        for item in &report.failed {
            eprintln!("could not delete {item}");
        }
        if report.deleted.is_empty() && report.failed.is_empty() {
            println!("nothing to remove");
        }
    }
    Ok(EXIT_SUCCESS)
}
