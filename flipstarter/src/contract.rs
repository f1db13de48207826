use crate::codec::{create_output, encode_var_int, serialize_input, serialize_output};
use crate::error::Result;
use crate::service::CryptoServiceRef;
use crate::types::{Commitment, Recipient, RecipientOutput};
use bitcoincore_rpc::bitcoin::hashes::Hash;

const TRANSACTION_VERSION: u32 = 2;
const TRANSACTION_LOCKTIME: u32 = 0;

/// Funding ledger of one campaign: the fixed recipient outputs and the
/// contributor inputs accepted so far.
pub struct AssuranceContract {
    crypto: CryptoServiceRef,
    outputs: Vec<RecipientOutput>,
    inputs: Vec<Commitment>,
}

impl AssuranceContract {
    pub fn new(crypto: CryptoServiceRef) -> Self {
        Self {
            crypto,
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_recipients(crypto: CryptoServiceRef, recipients: &[Recipient]) -> Result<Self> {
        let mut contract = Self::new(crypto);
        for recipient in recipients {
            contract.add_output(recipient.satoshis, &recipient.address)?;
        }

        Ok(contract)
    }

    pub fn add_output(&mut self, satoshis: u64, address: &str) -> Result<()> {
        let output = create_output(satoshis, address, self.crypto.as_ref())?;
        self.outputs.push(output);
        Ok(())
    }

    // Validation happens before a commitment reaches the ledger.
    pub fn add_commitment(&mut self, commitment: Commitment) {
        self.inputs.push(commitment);
    }

    pub fn outputs(&self) -> &[RecipientOutput] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[Commitment] {
        &self.inputs
    }

    pub fn count_contract_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn total_contract_output_value(&self) -> u64 {
        self.outputs.iter().map(RecipientOutput::satoshis).sum()
    }

    pub fn total_commitment_value(&self) -> u64 {
        self.inputs.iter().map(|input| input.satoshis).sum()
    }

    pub fn remaining_commitment_value(&self) -> u64 {
        self.total_contract_output_value()
            .saturating_sub(self.total_commitment_value())
    }

    /// Serializes the complete transaction spending every input to the
    /// recipient outputs.
    pub fn assemble_transaction(&self) -> Result<Vec<u8>> {
        let mut tx = Vec::new();
        tx.extend_from_slice(&TRANSACTION_VERSION.to_le_bytes());

        tx.extend_from_slice(&encode_var_int(self.inputs.len() as u64));
        for input in &self.inputs {
            let mut prev_tx_hash = input.tx_hash.to_byte_array();
            prev_tx_hash.reverse();

            tx.extend_from_slice(&serialize_input(
                &prev_tx_hash,
                input.tx_index,
                &input.unlocking_script,
                input.sequence_number,
            ));
        }

        tx.extend_from_slice(&encode_var_int(self.outputs.len() as u64));
        for output in &self.outputs {
            tx.extend_from_slice(&serialize_output(output));
        }

        tx.extend_from_slice(&TRANSACTION_LOCKTIME.to_le_bytes());
        Ok(tx)
    }
}
