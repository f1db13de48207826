use crate::codec::decode_output_value;
use flipstarter_util::{ScriptHash, TxHash, hash_serde};
use serde::{Deserialize, Serialize};

pub type CampaignId = String;

/// A payment announced by a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub satoshis: u64,
}

impl Recipient {
    pub fn new(address: &str, satoshis: u64) -> Self {
        Self {
            address: address.to_string(),
            satoshis,
        }
    }
}

/// A recipient payment in its on-chain form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutput {
    /// Satoshis in wire encoding.
    pub value: [u8; 8],
    pub locking_script: Vec<u8>,
}

impl RecipientOutput {
    pub fn satoshis(&self) -> u64 {
        decode_output_value(&self.value)
    }
}

/// A contribution exactly as submitted by a contributor, nothing checked yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentData {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_index: Option<u32>,
    #[serde(default)]
    pub unlocking_script: Option<String>,
    #[serde(default, alias = "seqNum")]
    pub sequence_number: Option<u32>,
    #[serde(default)]
    pub intended_satoshis: Option<u64>,
}

/// A validated contributor input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<CampaignId>,
    #[serde(with = "hash_serde")]
    pub tx_hash: TxHash,
    pub tx_index: u32,
    #[serde(with = "hex")]
    pub unlocking_script: Vec<u8>,
    #[serde(with = "hex")]
    pub locking_script: Vec<u8>,
    #[serde(with = "hash_serde")]
    pub script_hash: ScriptHash,
    #[serde(alias = "seqNum")]
    pub sequence_number: u32,
    pub satoshis: u64,
    #[serde(default)]
    pub revoked: bool,
}

impl Commitment {
    pub fn spends(&self, tx_hash: &TxHash, output_index: u32) -> bool {
        self.tx_hash == *tx_hash && self.tx_index == output_index
    }

    // Identity is the outpoint within a campaign.
    pub fn is_same_commitment(&self, other: &Commitment) -> bool {
        self.spends(&other.tx_hash, other.tx_index) && self.campaign_id == other.campaign_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub tx_hash: TxHash,
    pub output_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutputInfo {
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub outputs: Vec<TransactionOutputInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastResponse {
    Accepted { transaction_id: String },
    Rejected { message: String },
}

/// Status change pushed by the blockchain service for a subscribed script hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub script_hash: ScriptHash,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentEvent {
    Accepted(Commitment),
    Revoked(Commitment),
}

impl CommitmentEvent {
    pub fn commitment(&self) -> &Commitment {
        match self {
            CommitmentEvent::Accepted(c) | CommitmentEvent::Revoked(c) => c,
        }
    }
}
