use crate::codec::{
    create_output, encode_output_index, encode_output_value, encode_var_buf, parse_key_hash_unlock_script,
    serialize_output,
};
use crate::error::{FlipstarterError, Result};
use crate::service::{BlockchainServiceRef, CryptoServiceRef};
use crate::threshold::FundingLimits;
use crate::types::{Commitment, CommitmentData, Recipient, RecipientOutput};
use bitcoincore_rpc::bitcoin::hashes::Hash;
use flipstarter_util::{ToScriptHash, parse_tx_hash};

/// SIGHASH_ALL | SIGHASH_ANYONECANPAY | SIGHASH_FORKID
pub const SIGHASH_TYPE: u8 = 0xc1;

pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

const SIGHASH_VERSION: u32 = 2;
const SIGHASH_LOCKTIME: u32 = 0;

/// Preimage digest a contributor signs: only its own outpoint and the
/// recipient outputs are committed to, so inputs from strangers combine freely.
pub fn assemble_sighash_digest(
    outputs: &[RecipientOutput],
    commitment: &Commitment,
    crypto: &CryptoServiceRef,
) -> Result<[u8; 32]> {
    let mut serialized_outputs = Vec::new();
    for output in outputs {
        serialized_outputs.extend_from_slice(&serialize_output(output));
    }
    let hash_outputs = crypto.double_hash(&serialized_outputs);

    let mut prev_tx_hash = commitment.tx_hash.to_byte_array();
    prev_tx_hash.reverse();

    let mut preimage = Vec::with_capacity(4 + 32 + 32 + 36 + 26 + 8 + 4 + 32 + 4 + 4);
    preimage.extend_from_slice(&SIGHASH_VERSION.to_le_bytes());
    preimage.extend_from_slice(&[0u8; 32]); // hashPrevouts
    preimage.extend_from_slice(&[0u8; 32]); // hashSequence
    preimage.extend_from_slice(&prev_tx_hash);
    preimage.extend_from_slice(&encode_output_index(commitment.tx_index));
    preimage.extend_from_slice(&encode_var_buf(&commitment.locking_script));
    preimage.extend_from_slice(&encode_output_value(commitment.satoshis)?);
    preimage.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&SIGHASH_LOCKTIME.to_le_bytes());
    preimage.extend_from_slice(&(SIGHASH_TYPE as u32).to_le_bytes());

    Ok(crypto.double_hash(&preimage))
}

/// Checks a proposed contribution against the chain, its signature and the
/// current funding band.
pub struct CommitmentValidator {
    service: BlockchainServiceRef,
    crypto: CryptoServiceRef,
}

impl CommitmentValidator {
    pub fn new(service: BlockchainServiceRef, crypto: CryptoServiceRef) -> Self {
        Self { service, crypto }
    }

    pub async fn validate(
        &self,
        recipients: &[Recipient],
        committed_satoshis: u64,
        commitment_count: usize,
        proposed: &CommitmentData,
    ) -> Result<Commitment> {
        let input = RequiredInput::from_data(proposed)?;

        let tx = self
            .service
            .get_transaction(&input.tx_hash)
            .await
            .map_err(FlipstarterError::Service)?
            .ok_or_else(|| {
                warn!("Commitment references unknown transaction {}", input.tx_hash);
                FlipstarterError::TransactionNotFound(input.tx_hash.to_string())
            })?;

        let output = tx.outputs.get(input.tx_index as usize).ok_or_else(|| {
            let msg = format!(
                "Transaction {} has no output at index {}",
                input.tx_hash, input.tx_index
            );
            warn!("{}", msg);
            FlipstarterError::Validation(msg)
        })?;

        let commitment = Commitment {
            campaign_id: None,
            tx_hash: input.tx_hash,
            tx_index: input.tx_index,
            unlocking_script: input.unlocking_script,
            locking_script: output.locking_script.clone(),
            script_hash: output.locking_script.to_script_hash(),
            sequence_number: SEQUENCE_FINAL,
            satoshis: output.satoshis,
            revoked: false,
        };

        let unspent = self
            .service
            .list_unspent_outputs(&commitment.script_hash)
            .await
            .map_err(FlipstarterError::Service)?;
        if !unspent
            .iter()
            .any(|utxo| commitment.spends(&utxo.tx_hash, utxo.output_index))
        {
            warn!(
                "Output {}:{} is not unspent at script hash {}",
                commitment.tx_hash, commitment.tx_index, commitment.script_hash
            );
            return Err(FlipstarterError::UtxoNotFound(commitment.tx_hash.to_string()));
        }

        self.verify_signature(recipients, &commitment)?;

        let requested_satoshis: u64 = recipients.iter().map(|r| r.satoshis).sum();
        let limits = FundingLimits::compute(
            requested_satoshis,
            recipients.len(),
            committed_satoshis,
            commitment_count,
        );

        let actual = commitment.satoshis;
        if (actual as i64) < limits.floor {
            return Err(FlipstarterError::UnderCommitment {
                actual,
                floor: limits.floor,
            });
        }
        if (actual as i64) > limits.ceiling {
            return Err(FlipstarterError::OverCommitment {
                actual,
                ceiling: limits.ceiling,
            });
        }

        debug!(
            "Commitment {}:{} of {} satoshis is valid, band [{}, {}]",
            commitment.tx_hash, commitment.tx_index, actual, limits.floor, limits.ceiling
        );
        Ok(commitment)
    }

    fn verify_signature(&self, recipients: &[Recipient], commitment: &Commitment) -> Result<()> {
        let outputs = recipients
            .iter()
            .map(|r| create_output(r.satoshis, &r.address, self.crypto.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let unlock = parse_key_hash_unlock_script(&commitment.unlocking_script)?;
        let (hash_type, der) = unlock
            .signature
            .split_last()
            .ok_or_else(|| FlipstarterError::Validation("Empty signature in unlocking script".to_string()))?;
        if *hash_type != SIGHASH_TYPE {
            let msg = format!("Unsupported signature hash type 0x{:02x}", hash_type);
            warn!("{}", msg);
            return Err(FlipstarterError::Validation(msg));
        }

        let digest = assemble_sighash_digest(&outputs, commitment, &self.crypto)?;
        if !self.crypto.verify(unlock.public_key, &digest, der) {
            warn!(
                "Signature verification failed for {}:{}",
                commitment.tx_hash, commitment.tx_index
            );
            return Err(FlipstarterError::Validation("signature verification failed".to_string()));
        }

        Ok(())
    }
}

// Fields every submission must carry before anything is looked up.
struct RequiredInput {
    tx_hash: flipstarter_util::TxHash,
    tx_index: u32,
    unlocking_script: Vec<u8>,
}

impl RequiredInput {
    fn from_data(data: &CommitmentData) -> Result<Self> {
        let missing = |field: &str| FlipstarterError::Validation(format!("Commitment requires '{}' property", field));

        let tx_hash = data
            .tx_hash
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("txHash"))?;
        let tx_index = data.tx_index.ok_or_else(|| missing("txIndex"))?;
        let unlocking_script = data
            .unlocking_script
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("unlockingScript"))?;
        match data.sequence_number {
            Some(seq) if seq != 0 => {}
            _ => return Err(missing("sequenceNumber")),
        }

        let tx_hash = parse_tx_hash(tx_hash).map_err(FlipstarterError::Validation)?;
        let unlocking_script = hex::decode(unlocking_script).map_err(|e| {
            FlipstarterError::Validation(format!("Invalid unlocking script hex: {}", e))
        })?;

        Ok(Self {
            tx_hash,
            tx_index,
            unlocking_script,
        })
    }
}
