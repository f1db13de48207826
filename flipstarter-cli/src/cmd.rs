use clap::{Parser, Subcommand};
use flipstarter_util::BchNetwork;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flipstarter-cli")]
#[command(about = "Flipstarter assurance contract tool")]
pub struct Cli {
    /// Electrum websocket url, overrides the config file
    #[arg(short, long)]
    pub url: Option<String>,

    /// Network used for address decoding, overrides the config file
    #[arg(short, long, value_parser = parse_network)]
    pub network: Option<BchNetwork>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
#[command(rename_all = "kebab-case")]
pub enum Commands {
    /// Print the Electrum script hash of a locking script or address
    ScriptHash {
        #[arg(value_name = "SCRIPT_HEX_OR_ADDRESS")]
        input: String,
    },

    /// Print the funding state and the current contribution band
    Limits {
        #[arg(long, value_name = "CAMPAIGN_JSON")]
        campaign: PathBuf,
    },

    /// Validate a commitment against a campaign without recording it
    Validate {
        #[arg(long, value_name = "CAMPAIGN_JSON")]
        campaign: PathBuf,

        #[arg(long, value_name = "COMMITMENT_JSON")]
        commitment: PathBuf,
    },

    /// Validate a commitment and record it in the campaign file
    Contribute {
        #[arg(long, value_name = "CAMPAIGN_JSON")]
        campaign: PathBuf,

        #[arg(long, value_name = "COMMITMENT_JSON")]
        commitment: PathBuf,
    },

    /// Track the campaign's commitments and record revocations until stopped
    Watch {
        #[arg(long, value_name = "CAMPAIGN_JSON")]
        campaign: PathBuf,
    },

    /// Broadcast the fulfillment transaction of a fully funded campaign
    Fulfill {
        #[arg(long, value_name = "CAMPAIGN_JSON")]
        campaign: PathBuf,
    },
}

impl Commands {
    pub fn is_service(&self) -> bool {
        matches!(self, Commands::Watch { .. })
    }
}

fn parse_network(s: &str) -> Result<BchNetwork, String> {
    match s.to_ascii_lowercase().as_str() {
        "mainnet" | "bitcoincash" => Ok(BchNetwork::Mainnet),
        "testnet" | "bchtest" => Ok(BchNetwork::Testnet),
        "regtest" | "bchreg" => Ok(BchNetwork::Regtest),
        _ => {
            let msg = format!("Invalid network: {}. Expected mainnet, testnet or regtest", s);
            println!("{}", msg);
            Err(msg)
        }
    }
}
