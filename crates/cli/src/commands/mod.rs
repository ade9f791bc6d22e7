pub mod ask;
pub mod history;
pub mod ingest;
pub mod init;
pub mod serve;

use std::path::{Path, PathBuf};

use hnrag_config::AppConfig;

/// Where the config lives: `--config` or `~/.hnrag/config.toml`.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(path);
    tracing::debug!(path = %path.display(), "Loading config");
    AppConfig::load_from(&path)
        .map_err(|e| format!("Failed to load config: {e}").into())
}
