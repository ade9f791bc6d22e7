//! `hnrag serve`: start the HTTP API server.

use std::path::Path;

pub async fn run(path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("hnrag gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.generation.model);
    println!("   Storage:   {} ({})", config.storage.backend, config.storage.path);

    hnrag_gateway::start(config).await?;

    Ok(())
}
