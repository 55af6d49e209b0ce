// src/config/mod.rs
pub mod ai;
pub mod bots;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub use ai::{AiConfig, ProviderKind};
pub use bots::{BotConfig, BotKind, ExtractConfig, FileConfig, InformationalConfig, SourceConfig, SyncConfig, TransactionalConfig, WatchConfig};

const ENV_PATH: &str = "BOTS_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/bots.toml";

/// Parse and validate a bots file.
pub fn load_from(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Path resolution:
/// 1) explicit path (`--config`)
/// 2) $BOTS_CONFIG_PATH
/// 3) config/bots.toml
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var(ENV_PATH) {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_PATH),
    }
}

pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = resolve_path(explicit);
    tracing::debug!(target: "engine", path = %path.display(), "loading bots config");
    load_from(&path)
}
