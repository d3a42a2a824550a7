use super::{json_pretty, with_spinner, EXIT_SUCCESS};
use deskimg_engine::ImageProcessor;
use std::path::Path;

pub async fn run(
    processor: &ImageProcessor,
    context: &Path,
    file: &Path,
    tag: &str,
    json: bool,
) -> Result<u8, String> {
    with_spinner(
        json,
        &format!("building {tag}..."),
        &format!("built {tag}"),
        "build failed",
        processor.build(context, file, tag),
    )
    .await?;

    if json {
        let payload = serde_json::json!({
            "image": tag,
            "context": context,
            "namespace": processor.namespace(),
            "status": "built"
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}
