use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use lightindex::IndexerMode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mode: IndexerMode,
    pub blocks: u64,
    pub checkpoints: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mode = match std::env::var("LIGHTINDEX_MODE") {
            Ok(v) => v
                .parse::<IndexerMode>()
                .with_context(|| format!("LIGHTINDEX_MODE={v}"))?,
            Err(_) => IndexerMode::Server,
        };

        let blocks = match std::env::var("LIGHTINDEX_BLOCKS") {
            Ok(v) => v
                .parse::<u64>()
                .with_context(|| format!("LIGHTINDEX_BLOCKS must be a block count, got '{v}'"))?,
            Err(_) => 70_000,
        };
        if blocks == 0 {
            bail!("LIGHTINDEX_BLOCKS must be non-zero");
        }

        let checkpoints = std::env::var("LIGHTINDEX_CHECKPOINTS").ok().map(PathBuf::from);

        Ok(Self {
            mode,
            blocks,
            checkpoints,
        })
    }
}
