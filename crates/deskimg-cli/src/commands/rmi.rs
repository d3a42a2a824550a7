use super::{describe, json_pretty, EXIT_SUCCESS};
use deskimg_engine::ImageProcessor;

pub async fn run(processor: &ImageProcessor, image_ids: &[String], json: bool) -> Result<u8, String> {
    let mut removed = Vec::with_capacity(image_ids.len());
    for id in image_ids {
        processor.delete(id).await.map_err(|e| describe(&e))?;
        if !json {
            println!("removed {id}");
        }
        removed.push(id.as_str());
    }
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "removed": removed }))?);
    }
    Ok(EXIT_SUCCESS)
}
