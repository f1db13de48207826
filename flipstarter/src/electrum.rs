use crate::codec::satoshis_from_f64;
use crate::service::{BlockchainService, StatusNotifier};
use crate::types::{
    BroadcastResponse, StatusNotification, TransactionInfo, TransactionOutputInfo, UnspentOutput,
};
use flipstarter_util::{
    ElectrumBroadcast, ElectrumClient, ElectrumClientRef, SATS_PER_BCH, ScriptHash, TxHash,
    parse_script_hash_notification, parse_tx_hash,
};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

// Electrum's error code for a transaction it cannot find.
const MISSING_TRANSACTION_CODE: i64 = 2;

type NotifierMap = Arc<Mutex<HashMap<ScriptHash, StatusNotifier>>>;

/// Blockchain service backed by an Electrum (Fulcrum) server.
pub struct ElectrumBlockchainService {
    client: ElectrumClientRef,
    notifiers: NotifierMap,
    forwarder: JoinHandle<()>,
}

impl ElectrumBlockchainService {
    pub async fn connect(server_url: &str) -> Result<Self, String> {
        let client = ElectrumClient::new(server_url).await?;
        Self::new(Arc::new(client)).await
    }

    pub async fn new(client: ElectrumClientRef) -> Result<Self, String> {
        let mut notifications = client.script_hash_notifications().await?;
        let notifiers: NotifierMap = Arc::new(Mutex::new(HashMap::new()));

        let routes = notifiers.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(item) = notifications.next().await {
                let params = match item {
                    Ok(params) => params,
                    Err(e) => {
                        warn!("Invalid script hash notification: {}", e);
                        continue;
                    }
                };

                match parse_script_hash_notification(&params) {
                    Ok((script_hash, status)) => route_notification(&routes, script_hash, status),
                    Err(e) => warn!("{}", e),
                }
            }

            info!("Electrum notification stream closed");
        });

        info!("Listening for script hash notifications from {}", client.server_url());
        Ok(Self {
            client,
            notifiers,
            forwarder,
        })
    }

}

impl Drop for ElectrumBlockchainService {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn route_notification(routes: &NotifierMap, script_hash: ScriptHash, status: Option<String>) {
    let mut routes = routes.lock().unwrap();
    let Some(notifier) = routes.get(&script_hash) else {
        debug!("No subscriber for script hash {}", script_hash);
        return;
    };

    if notifier.send(StatusNotification { script_hash, status }).is_err() {
        debug!("Subscriber for script hash {} is gone", script_hash);
        routes.remove(&script_hash);
    }
}

/// Satoshis of a verbose transaction output. Servers report either
/// `value_satoshi`, an integral satoshi `value`, or a decimal BCH `value`.
fn output_satoshis(output: &Value) -> Result<u64, String> {
    if let Some(satoshis) = output.get("value_satoshi").and_then(Value::as_u64) {
        return Ok(satoshis);
    }

    let value = match output.get("value") {
        Some(Value::Number(value)) => value,
        _ => return Err(format!("Output without value: {}", output)),
    };
    if let Some(satoshis) = value.as_u64() {
        return Ok(satoshis);
    }

    let bch = value
        .as_f64()
        .ok_or_else(|| format!("Invalid output value: {}", value))?;
    satoshis_from_f64((bch * SATS_PER_BCH as f64).round())
        .map_err(|e| format!("Invalid output value {}: {}", value, e))
}

fn output_locking_script(output: &Value) -> Result<Vec<u8>, String> {
    let script_hex = match output.get("scriptPubKey") {
        Some(Value::Object(script)) => script.get("hex").and_then(Value::as_str),
        Some(Value::String(script)) => Some(script.as_str()),
        _ => None,
    }
    .ok_or_else(|| format!("Invalid script pubkey in output: {}", output))?;

    hex::decode(script_hex).map_err(|e| format!("Invalid script pubkey hex {}: {}", script_hex, e))
}

fn parse_verbose_transaction(tx: &Value) -> Result<Option<TransactionInfo>, String> {
    if tx.get("code").and_then(Value::as_i64) == Some(MISSING_TRANSACTION_CODE) {
        return Ok(None);
    }

    let vout = tx
        .get("vout")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("Transaction without outputs: {}", tx))?;

    let outputs = vout
        .iter()
        .map(|output| {
            Ok(TransactionOutputInfo {
                satoshis: output_satoshis(output)?,
                locking_script: output_locking_script(output)?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Some(TransactionInfo { outputs }))
}

#[async_trait::async_trait]
impl BlockchainService for ElectrumBlockchainService {
    async fn list_unspent_outputs(&self, script_hash: &ScriptHash) -> Result<Vec<UnspentOutput>, String> {
        let items = self.client.list_unspent(script_hash).await?;

        items
            .into_iter()
            .map(|item| {
                Ok(UnspentOutput {
                    tx_hash: parse_tx_hash(&item.tx_hash)?,
                    output_index: item.tx_pos,
                })
            })
            .collect()
    }

    async fn get_transaction(&self, tx_hash: &TxHash) -> Result<Option<TransactionInfo>, String> {
        match self.client.get_transaction_verbose(tx_hash).await? {
            Some(tx) => parse_verbose_transaction(&tx).map_err(|e| {
                let msg = format!("Failed to parse transaction {}: {}", tx_hash, e);
                error!("{}", msg);
                msg
            }),
            None => Ok(None),
        }
    }

    async fn broadcast(&self, raw_transaction_hex: &str) -> Result<BroadcastResponse, String> {
        let response = match self.client.broadcast(raw_transaction_hex).await? {
            ElectrumBroadcast::Accepted(transaction_id) => BroadcastResponse::Accepted { transaction_id },
            ElectrumBroadcast::Rejected(message) => BroadcastResponse::Rejected { message },
        };

        Ok(response)
    }

    async fn subscribe_to_script_hash(
        &self,
        script_hash: &ScriptHash,
        notifier: StatusNotifier,
    ) -> Result<(), String> {
        self.notifiers.lock().unwrap().insert(*script_hash, notifier);

        // The current status is returned here, changes arrive as notifications.
        if let Err(e) = self.client.subscribe_script_hash(script_hash).await {
            self.notifiers.lock().unwrap().remove(script_hash);
            return Err(e);
        }

        Ok(())
    }

    async fn unsubscribe_from_script_hash(&self, script_hash: &ScriptHash) -> Result<(), String> {
        self.notifiers.lock().unwrap().remove(script_hash);

        let removed = self.client.unsubscribe_script_hash(script_hash).await?;
        if !removed {
            debug!("Server held no subscription for script hash {}", script_hash);
        }

        Ok(())
    }
}
