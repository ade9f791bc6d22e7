//! `hnrag ingest`: embed stories and upsert them into the vector index.

use std::path::Path;

use hnrag_pipeline::{Ingestor, Story};

pub fn read_stories(file: &Path) -> Result<Vec<Story>, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let stories = serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse {}: {e}", file.display()))?;
    Ok(stories)
}

pub async fn run(path: Option<&Path>, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path)?;
    let stories = read_stories(file)?;
    let stores = hnrag_store::open(&config.storage).await?;
    let backends = hnrag_providers::build_from_config(&config)?;

    println!("Ingesting {} stories from {}", stories.len(), file.display());

    let report = Ingestor::new(backends.embedder, backends.index, stores.ledger)
        .with_chunking(config.ingest.chunk_size, config.ingest.chunk_overlap)
        .ingest(&stories)
        .await?;

    println!("  processed: {}", report.processed);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    println!("  chunks:    {}", report.chunks_upserted);

    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "Some stories were not indexed; rerun to retry them");
    }

    Ok(())
}
