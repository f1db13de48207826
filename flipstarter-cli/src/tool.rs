use crate::cmd::{Cli, Commands};
use crate::config::FlipstarterConfig;
use flipstarter::{
    BlockchainServiceRef, Campaign, CampaignRegistry, CommitmentData, CommitmentEvent, CommitmentWatcher,
    CommitmentWatcherRef, CryptoService, CryptoServiceRef, ElectrumBlockchainService, FlipstarterError,
    Secp256k1Crypto, locking_script_from_address,
};
use flipstarter_util::{ToScriptHash, get_flipstarter_root_dir};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        let msg = format!("Failed to read {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })?;

    serde_json::from_str(&data).map_err(|e| {
        let msg = format!("Failed to parse {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let data = serde_json::to_string_pretty(value).map_err(|e| {
        let msg = format!("Failed to serialize {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })?;

    std::fs::write(path, data).map_err(|e| {
        let msg = format!("Failed to write {}: {}", path.display(), e);
        error!("{}", msg);
        msg
    })
}

fn to_msg(e: FlipstarterError) -> String {
    let msg = e.to_string();
    error!("{}", msg);
    msg
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub struct FlipstarterTool {
    config: FlipstarterConfig,
    crypto: CryptoServiceRef,
}

impl FlipstarterTool {
    pub fn new(cli: &Cli) -> Result<Self, String> {
        let root_dir = get_flipstarter_root_dir();
        let mut config = FlipstarterConfig::load(&root_dir)?;

        if let Some(network) = cli.network {
            config.network.network = network;
        }
        if let Some(url) = &cli.url {
            config.electrum.rpc_url = url.clone();
        }

        info!(
            "Using network {:?}, Electrum server {}",
            config.network.network(),
            config.electrum.rpc_url()
        );

        let crypto: CryptoServiceRef = Arc::new(Secp256k1Crypto::for_network(config.network.network()));
        Ok(Self { config, crypto })
    }

    async fn connect(&self) -> Result<BlockchainServiceRef, String> {
        println!("Connecting to Electrum server at {}", self.config.electrum.rpc_url());
        let service: BlockchainServiceRef =
            Arc::new(ElectrumBlockchainService::connect(self.config.electrum.rpc_url()).await?);

        Ok(service)
    }

    async fn create_watcher(&self) -> Result<(CommitmentWatcherRef, mpsc::UnboundedReceiver<CommitmentEvent>), String> {
        let service = self.connect().await?;
        let (watcher, events) = CommitmentWatcher::new(service, self.crypto.clone());

        Ok((Arc::new(watcher), events))
    }

    fn load_campaign(&self, path: &Path) -> Result<(Campaign, CampaignRegistry), String> {
        let campaign: Campaign = load_json(path)?;
        let registry = CampaignRegistry::new();
        registry.insert(campaign.clone()).map_err(to_msg)?;

        Ok((campaign, registry))
    }

    fn save_campaign(&self, registry: &CampaignRegistry, id: &str, path: &Path) -> Result<(), String> {
        let campaign = registry.get(id).map_err(to_msg)?;
        save_json(path, &campaign)
    }

    pub async fn process_command(&self, command: Commands) -> Result<(), String> {
        match command {
            Commands::ScriptHash { input } => {
                let script = match hex::decode(&input) {
                    Ok(script) => script,
                    Err(_) => locking_script_from_address(&input, self.crypto.as_ref()).map_err(to_msg)?,
                };

                println!("Locking script: {}", hex::encode(&script));
                println!("Script hash: {}", script.to_script_hash());
            }
            Commands::Limits { campaign } => {
                let campaign: Campaign = load_json(&campaign)?;
                self.print_limits(&campaign)?;
            }
            Commands::Validate { campaign, commitment } => {
                let campaign: Campaign = load_json(&campaign)?;
                let data: CommitmentData = load_json(&commitment)?;

                let (watcher, _events) = self.create_watcher().await?;
                let commitment = watcher
                    .submit_commitment(
                        &campaign.recipients,
                        campaign.committed_satoshis(),
                        campaign.commitment_count(),
                        &data,
                    )
                    .await
                    .map_err(to_msg)?;

                println!("Commitment is valid:");
                println!("{}", serde_json::to_string_pretty(&commitment).map_err(|e| e.to_string())?);
            }
            Commands::Contribute { campaign: path, commitment } => {
                let (campaign, registry) = self.load_campaign(&path)?;
                let data: CommitmentData = load_json(&commitment)?;

                let (watcher, _events) = self.create_watcher().await?;
                let commitment = watcher
                    .contribute(&registry, &campaign.id, &data, unix_now())
                    .await
                    .map_err(to_msg)?;

                self.save_campaign(&registry, &campaign.id, &path)?;
                println!(
                    "Contribution {}:{} of {} satoshis recorded",
                    commitment.tx_hash, commitment.tx_index, commitment.satoshis
                );
            }
            Commands::Watch { campaign } => {
                self.watch(&campaign).await?;
            }
            Commands::Fulfill { campaign: path } => {
                let (campaign, registry) = self.load_campaign(&path)?;

                let (watcher, _events) = self.create_watcher().await?;
                let transaction_id = watcher.fulfill(&registry, &campaign.id).await.map_err(to_msg)?;

                self.save_campaign(&registry, &campaign.id, &path)?;
                println!("Campaign {} fulfilled by transaction {}", campaign.id, transaction_id);
            }
        }

        Ok(())
    }

    fn print_limits(&self, campaign: &Campaign) -> Result<(), String> {
        let status = campaign.funding_status(self.crypto.clone()).map_err(to_msg)?;

        println!("Campaign: {}", campaign.id);
        for recipient in &campaign.recipients {
            let valid = self.crypto.is_valid_address(&recipient.address);
            println!("  {} {} satoshis{}", recipient.address, recipient.satoshis, if valid { "" } else { " (invalid)" });
        }
        println!("Requested: {} satoshis", status.requested_satoshis);
        println!(
            "Committed: {} satoshis in {} contributions",
            status.committed_satoshis, status.commitment_count
        );
        println!("Remaining: {} satoshis", status.remaining_satoshis);
        println!(
            "Needed to fulfill: {} satoshis (fee {})",
            status.shortfall_satoshis(),
            status.fulfillment_fee
        );
        println!("Miner fee estimate: {} satoshis", status.limits.miner_fee);
        println!(
            "Next contribution: {} to {} satoshis",
            status.limits.floor, status.limits.ceiling
        );
        if let Some(transaction_id) = &campaign.fulfillment {
            println!("Fulfilled by: {}", transaction_id);
        }

        Ok(())
    }

    async fn watch(&self, path: &Path) -> Result<(), String> {
        let (_lock, _guard) = flipstarter_util::init_process_lock(flipstarter_util::FLIPSTARTER_WATCHER_SERVICE_NAME)?;

        let (campaign, registry) = self.load_campaign(path)?;
        if campaign.is_fulfilled() {
            return Err(to_msg(FlipstarterError::CampaignFulfilled(campaign.id)));
        }

        let (watcher, mut events) = self.create_watcher().await?;
        let handle = watcher.start().map_err(to_msg)?;

        let live = registry.live_commitments();
        watcher.subscribe_to_commitments(&live).await.map_err(to_msg)?;
        watcher.check_all_commitments_for_updates(&live).await.map_err(to_msg)?;
        self.save_campaign(&registry, &campaign.id, path)?;

        println!("Watching {} commitments of campaign {}", live.len(), campaign.id);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };

                    if registry.apply_event(&event) {
                        let c = event.commitment();
                        match &event {
                            CommitmentEvent::Accepted(_) => println!("Accepted {}:{} {} satoshis", c.tx_hash, c.tx_index, c.satoshis),
                            CommitmentEvent::Revoked(_) => println!("Revoked {}:{} {} satoshis", c.tx_hash, c.tx_index, c.satoshis),
                        }
                        self.save_campaign(&registry, &campaign.id, path)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("Stopping watcher");
                    break;
                }
            }
        }

        handle.abort();
        info!("Watcher for campaign {} stopped", campaign.id);
        Ok(())
    }
}
