//! Raw transaction encoding.
//!
//! All multi-byte integers are little-endian. Transaction hashes are kept in
//! display (big-endian) order and reversed when written.

use crate::error::{FlipstarterError, Result};
use crate::service::{AddressType, CryptoService};
use crate::types::RecipientOutput;
use bitcoincore_rpc::bitcoin::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160};
use bitcoincore_rpc::bitcoin::script::{Builder, PushBytesBuf};

pub const DUST_LIMIT: u64 = 546;
pub const MAX_MONEY: u64 = 2_099_999_997_690_000;

// Largest amount representable without loss in a double.
pub const MAX_EXACT_SATOSHIS: u64 = 1 << 53;

pub const PUBLIC_KEY_LEN: usize = 33;

pub fn encode_var_int(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }

    buf
}

pub fn encode_var_buf(data: &[u8]) -> Vec<u8> {
    let mut buf = encode_var_int(data.len() as u64);
    buf.extend_from_slice(data);
    buf
}

pub fn reverse(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Converts a floating point amount to satoshis, rejecting anything that is
/// not a non-negative integer within exact double precision.
pub fn satoshis_from_f64(satoshis: f64) -> Result<u64> {
    if satoshis.is_nan() {
        let msg = format!("Satoshis '{}' is not a number", satoshis);
        return Err(FlipstarterError::Encoding(msg));
    }
    if satoshis.fract() != 0.0 || satoshis.is_infinite() {
        let msg = format!("Satoshis '{}' is not an integer", satoshis);
        return Err(FlipstarterError::Encoding(msg));
    }
    if satoshis < 0.0 {
        let msg = format!("Satoshis '{}' is negative", satoshis);
        return Err(FlipstarterError::Encoding(msg));
    }
    if satoshis > MAX_EXACT_SATOSHIS as f64 {
        let msg = format!("Satoshis '{}' exceeds the 53 bit exact integer range", satoshis);
        return Err(FlipstarterError::Encoding(msg));
    }

    Ok(satoshis as u64)
}

pub fn encode_output_value(satoshis: u64) -> Result<[u8; 8]> {
    if satoshis > MAX_EXACT_SATOSHIS {
        let msg = format!(
            "Cannot encode output value, satoshis '{}' exceeds the 53 bit exact integer range",
            satoshis
        );
        error!("{}", msg);
        return Err(FlipstarterError::Encoding(msg));
    }

    let high = (satoshis >> 32) as u32;
    let low = (satoshis & 0xffff_ffff) as u32;

    let mut value = [0u8; 8];
    value[..4].copy_from_slice(&low.to_le_bytes());
    value[4..].copy_from_slice(&high.to_le_bytes());
    Ok(value)
}

pub fn decode_output_value(value: &[u8; 8]) -> u64 {
    let low = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
    let high = u32::from_le_bytes([value[4], value[5], value[6], value[7]]);

    ((high as u64) << 32) | low as u64
}

pub fn encode_output_index(index: u32) -> [u8; 4] {
    index.to_le_bytes()
}

/// Signature and public key pushed by a P2PKH unlocking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHashUnlock<'a> {
    pub signature: &'a [u8],
    pub public_key: &'a [u8],
}

pub fn parse_key_hash_unlock_script(script: &[u8]) -> Result<KeyHashUnlock<'_>> {
    // <sig len> <sig> <33> <compressed pubkey>
    if script.len() < 2 + PUBLIC_KEY_LEN {
        let msg = format!(
            "Unlocking script of {} bytes is too short for a key hash spend",
            script.len()
        );
        return Err(FlipstarterError::Validation(msg));
    }

    let split = script.len() - (PUBLIC_KEY_LEN + 1);
    Ok(KeyHashUnlock {
        signature: &script[1..split],
        public_key: &script[script.len() - PUBLIC_KEY_LEN..],
    })
}

/// `prev_tx_hash` must already be in wire (reversed) order.
pub fn serialize_input(
    prev_tx_hash: &[u8; 32],
    prev_out_index: u32,
    unlocking_script: &[u8],
    sequence_number: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 4 + 9 + unlocking_script.len() + 4);
    buf.extend_from_slice(prev_tx_hash);
    buf.extend_from_slice(&encode_output_index(prev_out_index));
    buf.extend_from_slice(&encode_var_buf(unlocking_script));
    buf.extend_from_slice(&sequence_number.to_le_bytes());
    buf
}

/// Output value followed by its length-prefixed locking script.
pub fn serialize_output(output: &RecipientOutput) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 1 + output.locking_script.len());
    buf.extend_from_slice(&output.value);
    buf.extend_from_slice(&encode_var_buf(&output.locking_script));
    buf
}

pub fn locking_script_from_address(address: &str, crypto: &dyn CryptoService) -> Result<Vec<u8>> {
    let to_encoding_error = |e: String| {
        let msg = format!("Cannot derive locking script for address '{}': {}", address, e);
        error!("{}", msg);
        FlipstarterError::Encoding(msg)
    };

    let hash = crypto.address_to_hash(address).map_err(to_encoding_error)?;
    if hash.len() != 20 {
        return Err(to_encoding_error(format!("unexpected hash length {}", hash.len())));
    }
    let hash = PushBytesBuf::try_from(hash).map_err(|e| to_encoding_error(e.to_string()))?;

    let script = match crypto.address_type(address).map_err(to_encoding_error)? {
        AddressType::P2PKH => Builder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script(),
        AddressType::P2SH => Builder::new()
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUAL)
            .into_script(),
        AddressType::Other(version) => {
            return Err(to_encoding_error(format!("unsupported address type {}", version)));
        }
    };

    Ok(script.into_bytes())
}

pub fn create_output(satoshis: u64, address: &str, crypto: &dyn CryptoService) -> Result<RecipientOutput> {
    if !crypto.is_valid_address(address) {
        let msg = format!(
            "Cannot add output, address '{}' does not use a valid CashAddr encoding",
            address
        );
        error!("{}", msg);
        return Err(FlipstarterError::Encoding(msg));
    }

    if satoshis < DUST_LIMIT {
        let msg = format!(
            "Cannot add output, satoshis '{}' is smaller than the dust limit",
            satoshis
        );
        error!("{}", msg);
        return Err(FlipstarterError::Encoding(msg));
    }

    if satoshis > MAX_MONEY {
        let msg = format!(
            "Cannot add output, satoshis '{}' is larger than the max limit",
            satoshis
        );
        error!("{}", msg);
        return Err(FlipstarterError::Encoding(msg));
    }

    let locking_script = locking_script_from_address(address, crypto)?;
    Ok(RecipientOutput {
        value: encode_output_value(satoshis)?,
        locking_script,
    })
}
