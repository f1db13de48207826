use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BchNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl BchNetwork {
    pub fn cashaddr_prefix(&self) -> &'static str {
        match self {
            BchNetwork::Mainnet => "bitcoincash",
            BchNetwork::Testnet => "bchtest",
            BchNetwork::Regtest => "bchreg",
        }
    }
}

fn default_network() -> BchNetwork {
    BchNetwork::Mainnet
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network")]
    pub network: BchNetwork,
}

impl NetworkConfig {
    pub fn network(&self) -> BchNetwork {
        self.network
    }

    pub fn cashaddr_prefix(&self) -> &'static str {
        self.network.cashaddr_prefix()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrumConfig {
    #[serde(default = "default_electrum_rpc_url")]
    pub rpc_url: String,
}

fn default_electrum_rpc_url() -> String {
    format!("ws://127.0.0.1:{}", crate::constants::ELECTRUM_WS_PORT)
}

impl ElectrumConfig {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_str()
    }
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_electrum_rpc_url(),
        }
    }
}

// Loads `config.toml` from the service directory, falling back to defaults when absent.
pub fn load_toml_config<T>(root_dir: &Path) -> Result<T, String>
where
    T: DeserializeOwned + Serialize + Default,
{
    let path = root_dir.join("config.toml");
    if !path.exists() {
        let default_config = T::default();
        info!(
            "Config file {} does not exist. Using default configuration.",
            path.display()
        );
        if let Ok(s) = toml::to_string_pretty(&default_config) {
            info!("Default config: {}", s);
        }

        return Ok(default_config);
    }

    info!("Loading config from {}", path.display());
    let config_data = std::fs::read_to_string(&path).map_err(|e| {
        let msg = format!("Failed to read config file {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })?;

    toml::from_str(&config_data).map_err(|e| {
        let msg = format!("Failed to parse config file {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })
}
