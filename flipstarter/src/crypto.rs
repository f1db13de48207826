use crate::service::{AddressType, CryptoService};
use bitcoincore_rpc::bitcoin::hashes::{Hash, sha256, sha256d};
use bitcoincore_rpc::bitcoin::secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly, ecdsa::Signature};
use flipstarter_util::{BchNetwork, CashAddress, decode_cashaddr};

/// Default crypto capability: secp256k1 ECDSA and CashAddr for one network.
pub struct Secp256k1Crypto {
    secp: Secp256k1<VerifyOnly>,
    prefix: String,
}

impl Secp256k1Crypto {
    pub fn new(cashaddr_prefix: &str) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            prefix: cashaddr_prefix.to_ascii_lowercase(),
        }
    }

    pub fn for_network(network: BchNetwork) -> Self {
        Self::new(network.cashaddr_prefix())
    }

    fn decode(&self, address: &str) -> Result<CashAddress, String> {
        let decoded = decode_cashaddr(address, &self.prefix)?;
        if decoded.prefix != self.prefix {
            let msg = format!(
                "Address {} belongs to network '{}', expected '{}'",
                address, decoded.prefix, self.prefix
            );
            return Err(msg);
        }

        Ok(decoded)
    }
}

impl CryptoService for Secp256k1Crypto {
    fn verify(&self, public_key: &[u8], digest: &[u8; 32], signature: &[u8]) -> bool {
        let public_key = match PublicKey::from_slice(public_key) {
            Ok(key) => key,
            Err(e) => {
                debug!("Invalid public key {}: {}", hex::encode(public_key), e);
                return false;
            }
        };

        let mut signature = match Signature::from_der_lax(signature) {
            Ok(sig) => sig,
            Err(e) => {
                debug!("Invalid DER signature {}: {}", hex::encode(signature), e);
                return false;
            }
        };

        // libsecp256k1 only accepts low-S signatures.
        signature.normalize_s();

        let message = Message::from_digest(*digest);
        self.secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
    }

    fn is_valid_address(&self, address: &str) -> bool {
        self.decode(address).is_ok()
    }

    fn address_to_hash(&self, address: &str) -> Result<Vec<u8>, String> {
        self.decode(address).map(|decoded| decoded.hash)
    }

    fn address_type(&self, address: &str) -> Result<AddressType, String> {
        self.decode(address).map(|decoded| decoded.addr_type)
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        sha256::Hash::hash(data).to_byte_array()
    }

    fn double_hash(&self, data: &[u8]) -> [u8; 32] {
        sha256d::Hash::hash(data).to_byte_array()
    }
}
