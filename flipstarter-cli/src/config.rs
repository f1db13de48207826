use flipstarter_util::{ElectrumConfig, NetworkConfig, load_toml_config};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlipstarterConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub electrum: ElectrumConfig,
}

impl FlipstarterConfig {
    pub fn load(root_dir: &Path) -> Result<Self, String> {
        load_toml_config(root_dir)
    }
}
