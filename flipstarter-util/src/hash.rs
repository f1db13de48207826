use bitcoincore_rpc::bitcoin::Script;
use bitcoincore_rpc::bitcoin::hashes::{self, Hash, sha256, sha256d};
use std::str::FromStr;

hashes::hash_newtype! {
    /// Electrum subscription key of a locking script.
    #[hash_newtype(forward)]
    pub struct ScriptHash(sha256::Hash);

    /// Transaction hash, stored and displayed in the conventional big-endian order.
    #[hash_newtype(forward)]
    pub struct TxHash(sha256d::Hash);
}

pub trait ToScriptHash {
    fn to_script_hash(&self) -> ScriptHash;
}

impl ToScriptHash for [u8] {
    fn to_script_hash(&self) -> ScriptHash {
        // Same as Electrum: sha256 of the script bytes, then reversed
        let mut result = sha256::Hash::hash(self).to_byte_array();
        result.reverse();

        ScriptHash::from_byte_array(result)
    }
}

impl ToScriptHash for Script {
    fn to_script_hash(&self) -> ScriptHash {
        self.as_bytes().to_script_hash()
    }
}

pub fn parse_script_hash(s: &str) -> Result<ScriptHash, String> {
    ScriptHash::from_str(s).map_err(|e| format!("Invalid script hash {}: {}", s, e))
}

pub fn parse_tx_hash(s: &str) -> Result<TxHash, String> {
    TxHash::from_str(s).map_err(|e| format!("Invalid transaction hash {}: {}", s, e))
}

/// Serde helper storing a hash as its hex display string.
pub mod hash_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
