use super::{describe, json_pretty, EXIT_SUCCESS};
use console::Style;
use deskimg_engine::ImageProcessor;

pub async fn run(processor: &ImageProcessor, json: bool) -> Result<u8, String> {
    let images = processor.list().await.map_err(|e| describe(&e))?;
    if json {
        println!("{}", json_pretty(&images)?);
    } else if images.is_empty() {
        println!("no images in namespace {}", processor.namespace());
    } else {
        let width = images
            .iter()
            .map(|i| i.image_name.len())
            .max()
            .unwrap_or(0)
            .max("REPOSITORY".len());
        let header = Style::new().bold();
        println!(
            "{}",
            header.apply_to(format!(
                "{:<width$} {:<20} {:<14} SIZE",
                "REPOSITORY", "TAG", "IMAGE ID"
            ))
        );
        for image in &images {
            println!(
                "{:<width$} {:<20} {:<14} {}",
                image.image_name, image.tag, image.image_id, image.size
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
