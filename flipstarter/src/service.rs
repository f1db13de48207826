use crate::types::{BroadcastResponse, StatusNotification, TransactionInfo, UnspentOutput};
use flipstarter_util::{ScriptHash, TxHash};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use flipstarter_util::CashAddrType as AddressType;

/// Receives `[script hash, status]` pushes for a subscription.
pub type StatusNotifier = mpsc::UnboundedSender<StatusNotification>;

/// Query and subscription access to the blockchain.
#[async_trait::async_trait]
pub trait BlockchainService: Send + Sync {
    async fn list_unspent_outputs(&self, script_hash: &ScriptHash) -> Result<Vec<UnspentOutput>, String>;

    /// Ok(None) when the transaction is unknown to the service.
    async fn get_transaction(&self, tx_hash: &TxHash) -> Result<Option<TransactionInfo>, String>;

    async fn broadcast(&self, raw_transaction_hex: &str) -> Result<BroadcastResponse, String>;

    async fn subscribe_to_script_hash(
        &self,
        script_hash: &ScriptHash,
        notifier: StatusNotifier,
    ) -> Result<(), String>;

    async fn unsubscribe_from_script_hash(&self, script_hash: &ScriptHash) -> Result<(), String>;
}

pub type BlockchainServiceRef = Arc<dyn BlockchainService>;

/// Signature verification and address utilities.
pub trait CryptoService: Send + Sync {
    /// `signature` is DER encoded, without the trailing hash type byte.
    fn verify(&self, public_key: &[u8], digest: &[u8; 32], signature: &[u8]) -> bool;

    fn is_valid_address(&self, address: &str) -> bool;
    fn address_to_hash(&self, address: &str) -> Result<Vec<u8>, String>;
    fn address_type(&self, address: &str) -> Result<AddressType, String>;

    fn sha256(&self, data: &[u8]) -> [u8; 32];
    fn double_hash(&self, data: &[u8]) -> [u8; 32];
}

pub type CryptoServiceRef = Arc<dyn CryptoService>;
