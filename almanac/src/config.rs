use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use almanac_store::StoreConfig;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Where the reference store is checkpointed
    pub snapshot_path: PathBuf,

    #[serde(flatten)]
    pub store: StoreConfig,
}

pub fn read_config(config_file: PathBuf) -> Result<Config> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}
