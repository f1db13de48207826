use crate::hash::{ScriptHash, parse_script_hash};
use crate::TxHash;
use jsonrpsee::core::ClientError;
use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::Deserialize;
use serde_json::Value;

const METHOD_LIST_UNSPENT: &str = "blockchain.scripthash.listunspent";
const METHOD_TRANSACTION_GET: &str = "blockchain.transaction.get";
const METHOD_TRANSACTION_BROADCAST: &str = "blockchain.transaction.broadcast";
const METHOD_SCRIPTHASH_SUBSCRIBE: &str = "blockchain.scripthash.subscribe";
const METHOD_SCRIPTHASH_UNSUBSCRIBE: &str = "blockchain.scripthash.unsubscribe";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListUnspentItem {
    pub tx_hash: String,
    pub tx_pos: u32,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElectrumBroadcast {
    Accepted(String),
    Rejected(String),
}

pub struct ElectrumClient {
    server_url: String,
    client: WsClient,
}

impl ElectrumClient {
    pub async fn new(server_url: &str) -> Result<Self, String> {
        let client = WsClientBuilder::default()
            .build(server_url)
            .await
            .map_err(|e| {
                let msg = format!("Failed to connect to Electrum server {}: {}", server_url, e);
                error!("{}", msg);
                msg
            })?;

        info!("Connected to Electrum server {}", server_url);
        Ok(Self {
            server_url: server_url.to_string(),
            client,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn list_unspent(&self, script_hash: &ScriptHash) -> Result<Vec<ListUnspentItem>, String> {
        self.client
            .request::<Vec<ListUnspentItem>, _>(METHOD_LIST_UNSPENT, rpc_params![script_hash.to_string()])
            .await
            .map_err(|e| {
                let msg = format!("listunspent failed for script hash {}: {}", script_hash, e);
                error!("{}", msg);
                msg
            })
    }

    // The server answers an unknown transaction with an error object, which is reported as None.
    pub async fn get_transaction_verbose(&self, tx_hash: &TxHash) -> Result<Option<Value>, String> {
        let ret = self
            .client
            .request::<Value, _>(METHOD_TRANSACTION_GET, rpc_params![tx_hash.to_string(), true])
            .await;

        match ret {
            Ok(Value::Null) => Ok(None),
            Ok(tx) => Ok(Some(tx)),
            Err(ClientError::Call(e)) => {
                warn!(
                    "Transaction {} not available: code {}, {}",
                    tx_hash,
                    e.code(),
                    e.message()
                );
                Ok(None)
            }
            Err(e) => {
                let msg = format!("Failed to get transaction {}: {}", tx_hash, e);
                error!("{}", msg);
                Err(msg)
            }
        }
    }

    pub async fn broadcast(&self, raw_tx_hex: &str) -> Result<ElectrumBroadcast, String> {
        let ret = self
            .client
            .request::<String, _>(METHOD_TRANSACTION_BROADCAST, rpc_params![raw_tx_hex])
            .await;

        match ret {
            Ok(txid) => Ok(ElectrumBroadcast::Accepted(txid)),
            Err(ClientError::Call(e)) => Ok(ElectrumBroadcast::Rejected(e.message().to_string())),
            Err(e) => {
                let msg = format!("Failed to broadcast transaction: {}", e);
                error!("{}", msg);
                Err(msg)
            }
        }
    }

    // Returns the current status of the script hash, None if it has no history.
    pub async fn subscribe_script_hash(&self, script_hash: &ScriptHash) -> Result<Option<String>, String> {
        self.client
            .request::<Option<String>, _>(
                METHOD_SCRIPTHASH_SUBSCRIBE,
                rpc_params![script_hash.to_string()],
            )
            .await
            .map_err(|e| {
                let msg = format!("Failed to subscribe to script hash {}: {}", script_hash, e);
                error!("{}", msg);
                msg
            })
    }

    pub async fn unsubscribe_script_hash(&self, script_hash: &ScriptHash) -> Result<bool, String> {
        self.client
            .request::<bool, _>(
                METHOD_SCRIPTHASH_UNSUBSCRIBE,
                rpc_params![script_hash.to_string()],
            )
            .await
            .map_err(|e| {
                let msg = format!("Failed to unsubscribe from script hash {}: {}", script_hash, e);
                error!("{}", msg);
                msg
            })
    }

    // Electrum pushes status changes as `blockchain.scripthash.subscribe` notifications
    // without a subscription id, so they are consumed per method.
    pub async fn script_hash_notifications(&self) -> Result<Subscription<Value>, String> {
        self.client
            .subscribe_to_method::<Value>(METHOD_SCRIPTHASH_SUBSCRIBE)
            .await
            .map_err(|e| {
                let msg = format!("Failed to listen for script hash notifications: {}", e);
                error!("{}", msg);
                msg
            })
    }
}

pub type ElectrumClientRef = std::sync::Arc<ElectrumClient>;

/// Parses the `[script_hash, status]` params of a status notification.
pub fn parse_script_hash_notification(params: &Value) -> Result<(ScriptHash, Option<String>), String> {
    let items = params
        .as_array()
        .ok_or_else(|| format!("Unexpected notification params: {}", params))?;

    let script_hash = items
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Notification without script hash: {}", params))?;
    let script_hash = parse_script_hash(script_hash)?;

    let status = match items.get(1) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => return Err(format!("Unexpected notification status: {}", other)),
    };

    Ok((script_hash, status))
}
