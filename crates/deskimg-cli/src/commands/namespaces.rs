use super::{describe, json_pretty, EXIT_SUCCESS};
use console::Style;
use deskimg_engine::ImageProcessor;

pub async fn run(processor: &ImageProcessor, json: bool) -> Result<u8, String> {
    let names = processor.namespaces().await.map_err(|e| describe(&e))?;
    if json {
        println!("{}", json_pretty(&names)?);
        return Ok(EXIT_SUCCESS);
    }
    let current = processor.namespace();
    for name in &names {
        if *name == current {
            println!("* {}", Style::new().green().apply_to(name));
        } else {
            println!("  {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
