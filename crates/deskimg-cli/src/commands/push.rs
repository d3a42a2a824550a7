use super::{json_pretty, with_spinner, EXIT_SUCCESS};
use deskimg_engine::ImageProcessor;

pub async fn run(processor: &ImageProcessor, reference: &str, json: bool) -> Result<u8, String> {
    with_spinner(
        json,
        &format!("pushing {reference}..."),
        &format!("pushed {reference}"),
        "push failed",
        processor.push(reference),
    )
    .await?;

    if json {
        let payload = serde_json::json!({
            "image": reference,
            "status": "pushed"
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
