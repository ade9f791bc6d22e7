//! `hnrag init`: write a default config file.

use std::path::Path;

use hnrag_config::AppConfig;

pub async fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(path);

    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;

    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set PINECONE_API_URL and PINECONE_API_KEY (or edit [index])");
    println!("  2. Make sure Ollama is running with the configured models");
    println!("  3. hnrag ingest stories.json");
    println!("  4. hnrag ask \"What is Y Combinator?\"");

    Ok(())
}
