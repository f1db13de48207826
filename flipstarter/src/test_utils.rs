use crate::crypto::Secp256k1Crypto;
use crate::service::{AddressType, BlockchainService, CryptoService, StatusNotifier};
use crate::types::{
    BroadcastResponse, Commitment, CommitmentData, Recipient, StatusNotification, TransactionInfo,
    TransactionOutputInfo, UnspentOutput,
};
use bitcoincore_rpc::bitcoin::hashes::Hash;
use flipstarter_util::{ScriptHash, TxHash, parse_script_hash, parse_tx_hash};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// A real contribution signed on testnet for a single 558 satoshi recipient.
pub const TEST_RECIPIENT_ADDRESS: &str = "bchtest:qqekcwxmfzhgn775r6t382g08mx4cxclfsd2d2v0x0";
pub const TEST_RECIPIENT_SATOSHIS: u64 = 558;
pub const TEST_TX_HASH: &str = "4da543d3866ee0015a5dc2131de7a20ef8966eeaaf2875b24c7bc575ce5d9e60";
pub const TEST_UNLOCKING_SCRIPT: &str = "483045022100c221c2676e1b3a5ee7eab5a68351d4e1b368d3c49b9a09d04f8920b66545a559022063cc58d00594c409b07cd2243cf95ae203a29be5d0eae18bb6def64e9bad298cc12103c00d6cbc1712b782b8f9a6388d5ba7567457766fc7be0594bf52a87d3ee0ee5d";
pub const TEST_LOCKING_SCRIPT: &str = "76a914543a6f75dea3841ac24aac3a7e1633878abb66e188ac";
pub const TEST_SCRIPT_HASH: &str = "7a78f4a211778baeff95942c6df00cf1ab95e66d585d10c7877b9ad6ddb7298e";
pub const TEST_OUTPUT_SATOSHIS: u64 = 465;
pub const TEST_SIGHASH_DIGEST: &str = "4d5c19b787edcbe8a363d58d823563626139722d650adc10ff5936e63aacb5da";
pub const TEST_RAW_TRANSACTION: &str = "0200000001609e5dce75c57b4cb27528afea6e96f80ea2e71d13c25d5a01e06e86d343a54d000000006b483045022100c221c2676e1b3a5ee7eab5a68351d4e1b368d3c49b9a09d04f8920b66545a559022063cc58d00594c409b07cd2243cf95ae203a29be5d0eae18bb6def64e9bad298cc12103c00d6cbc1712b782b8f9a6388d5ba7567457766fc7be0594bf52a87d3ee0ee5dffffffff012e020000000000001976a914336c38db48ae89fbd41e9713a90f3ecd5c1b1f4c88ac00000000";

pub fn test_tx_hash() -> TxHash {
    parse_tx_hash(TEST_TX_HASH).unwrap()
}

pub fn test_script_hash() -> ScriptHash {
    parse_script_hash(TEST_SCRIPT_HASH).unwrap()
}

pub fn fake_tx_hash(seed: u8) -> TxHash {
    TxHash::from_byte_array([seed; 32])
}

pub fn test_recipients() -> Vec<Recipient> {
    vec![Recipient::new(TEST_RECIPIENT_ADDRESS, TEST_RECIPIENT_SATOSHIS)]
}

pub fn test_commitment_data() -> CommitmentData {
    CommitmentData {
        tx_hash: Some(TEST_TX_HASH.to_string()),
        tx_index: Some(0),
        unlocking_script: Some(TEST_UNLOCKING_SCRIPT.to_string()),
        sequence_number: Some(0xffff_ffff),
        intended_satoshis: None,
    }
}

pub fn test_commitment(campaign_id: &str) -> Commitment {
    test_commitment_at(campaign_id, test_tx_hash(), 0)
}

pub fn test_commitment_at(campaign_id: &str, tx_hash: TxHash, tx_index: u32) -> Commitment {
    Commitment {
        campaign_id: Some(campaign_id.to_string()),
        tx_hash,
        tx_index,
        unlocking_script: hex::decode(TEST_UNLOCKING_SCRIPT).unwrap(),
        locking_script: hex::decode(TEST_LOCKING_SCRIPT).unwrap(),
        script_hash: test_script_hash(),
        sequence_number: 0xffff_ffff,
        satoshis: TEST_OUTPUT_SATOSHIS,
        revoked: false,
    }
}

pub fn test_transaction(satoshis: u64) -> TransactionInfo {
    TransactionInfo {
        outputs: vec![TransactionOutputInfo {
            satoshis,
            locking_script: hex::decode(TEST_LOCKING_SCRIPT).unwrap(),
        }],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListUnspent(ScriptHash),
    GetTransaction(TxHash),
    Broadcast(String),
    Subscribe(ScriptHash),
    Unsubscribe(ScriptHash),
}

/// Holds one service call until the test releases it.
#[derive(Default)]
pub struct CallGate {
    entered: Notify,
    release: Notify,
}

impl CallGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolves once the gated call is waiting.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory blockchain that records every request it serves.
#[derive(Default)]
pub struct MockBlockchainService {
    transactions: Mutex<HashMap<TxHash, TransactionInfo>>,
    unspent: Mutex<HashMap<ScriptHash, Vec<UnspentOutput>>>,
    notifiers: Mutex<HashMap<ScriptHash, StatusNotifier>>,
    broadcast_response: Mutex<Option<BroadcastResponse>>,
    calls: Mutex<Vec<MockCall>>,

    unspent_failures: Mutex<HashSet<ScriptHash>>,
    subscribe_failures: Mutex<HashMap<ScriptHash, usize>>,
    unspent_gate: Mutex<Option<Arc<CallGate>>>,
    subscribe_gate: Mutex<Option<Arc<CallGate>>>,
}

impl MockBlockchainService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Knows the signed test transaction and lists its output as unspent.
    pub fn with_test_vector() -> Self {
        let mock = Self::new();
        mock.add_transaction(test_tx_hash(), test_transaction(TEST_OUTPUT_SATOSHIS));
        mock.set_unspent(&test_script_hash(), &[(test_tx_hash(), 0)]);
        mock
    }

    pub fn add_transaction(&self, tx_hash: TxHash, info: TransactionInfo) {
        self.transactions.lock().unwrap().insert(tx_hash, info);
    }

    pub fn set_unspent(&self, script_hash: &ScriptHash, outpoints: &[(TxHash, u32)]) {
        let list = outpoints
            .iter()
            .map(|(tx_hash, output_index)| UnspentOutput {
                tx_hash: *tx_hash,
                output_index: *output_index,
            })
            .collect();
        self.unspent.lock().unwrap().insert(*script_hash, list);
    }

    pub fn set_broadcast_response(&self, response: BroadcastResponse) {
        self.broadcast_response.lock().unwrap().replace(response);
    }

    /// Makes every unspent query for `script_hash` fail.
    pub fn fail_list_unspent(&self, script_hash: &ScriptHash) {
        self.unspent_failures.lock().unwrap().insert(*script_hash);
    }

    /// Makes the next `times` subscriptions to `script_hash` fail.
    pub fn fail_subscribe(&self, script_hash: &ScriptHash, times: usize) {
        self.subscribe_failures.lock().unwrap().insert(*script_hash, times);
    }

    /// Holds the next unspent query after it has read its result.
    pub fn gate_list_unspent(&self) -> Arc<CallGate> {
        let gate = CallGate::new();
        self.unspent_gate.lock().unwrap().replace(gate.clone());
        gate
    }

    /// Holds the next subscription before it completes.
    pub fn gate_subscribe(&self) -> Arc<CallGate> {
        let gate = CallGate::new();
        self.subscribe_gate.lock().unwrap().replace(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, filter: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| filter(call)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Pushes a status change to the notifier subscribed for `script_hash`.
    pub fn notify(&self, script_hash: &ScriptHash, status: Option<&str>) -> bool {
        let notifiers = self.notifiers.lock().unwrap();
        match notifiers.get(script_hash) {
            Some(notifier) => notifier
                .send(StatusNotification {
                    script_hash: *script_hash,
                    status: status.map(|s| s.to_string()),
                })
                .is_ok(),
            None => false,
        }
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl BlockchainService for MockBlockchainService {
    async fn list_unspent_outputs(&self, script_hash: &ScriptHash) -> Result<Vec<UnspentOutput>, String> {
        self.record(MockCall::ListUnspent(*script_hash));
        tokio::task::yield_now().await;

        if self.unspent_failures.lock().unwrap().contains(script_hash) {
            return Err(format!("listunspent failed for {}", script_hash));
        }

        let unspent = self.unspent.lock().unwrap().get(script_hash).cloned().unwrap_or_default();

        let gate = self.unspent_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        Ok(unspent)
    }

    async fn get_transaction(&self, tx_hash: &TxHash) -> Result<Option<TransactionInfo>, String> {
        self.record(MockCall::GetTransaction(*tx_hash));
        tokio::task::yield_now().await;

        Ok(self.transactions.lock().unwrap().get(tx_hash).cloned())
    }

    async fn broadcast(&self, raw_transaction_hex: &str) -> Result<BroadcastResponse, String> {
        self.record(MockCall::Broadcast(raw_transaction_hex.to_string()));

        let response = self.broadcast_response.lock().unwrap().clone();
        Ok(response.unwrap_or_else(|| BroadcastResponse::Accepted {
            transaction_id: "mock-transaction-id".to_string(),
        }))
    }

    async fn subscribe_to_script_hash(
        &self,
        script_hash: &ScriptHash,
        notifier: StatusNotifier,
    ) -> Result<(), String> {
        self.record(MockCall::Subscribe(*script_hash));

        let failed = match self.subscribe_failures.lock().unwrap().get_mut(script_hash) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };

        let gate = self.subscribe_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        if failed {
            return Err(format!("subscribe failed for {}", script_hash));
        }

        self.notifiers.lock().unwrap().insert(*script_hash, notifier);
        Ok(())
    }

    async fn unsubscribe_from_script_hash(&self, script_hash: &ScriptHash) -> Result<(), String> {
        self.record(MockCall::Unsubscribe(*script_hash));
        self.notifiers.lock().unwrap().remove(script_hash);
        Ok(())
    }
}

/// Real address handling, but every signature verifies.
pub struct AcceptAllCrypto {
    inner: Secp256k1Crypto,
}

impl AcceptAllCrypto {
    pub fn new() -> Self {
        Self {
            inner: Secp256k1Crypto::new("bchtest"),
        }
    }
}

impl CryptoService for AcceptAllCrypto {
    fn verify(&self, _public_key: &[u8], _digest: &[u8; 32], _signature: &[u8]) -> bool {
        true
    }

    fn is_valid_address(&self, address: &str) -> bool {
        self.inner.is_valid_address(address)
    }

    fn address_to_hash(&self, address: &str) -> Result<Vec<u8>, String> {
        self.inner.address_to_hash(address)
    }

    fn address_type(&self, address: &str) -> Result<AddressType, String> {
        self.inner.address_type(address)
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        self.inner.sha256(data)
    }

    fn double_hash(&self, data: &[u8]) -> [u8; 32] {
        self.inner.double_hash(data)
    }
}
