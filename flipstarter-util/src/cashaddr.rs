//! CashAddr decoding.
//!
//! Layout: `<prefix>:<base32 payload><40-bit checksum>`, where the payload is a
//! version byte followed by the hash. The checksum is a BCH code over the
//! lower 5 bits of every prefix character, a zero separator and the payload.

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAddrType {
    P2PKH,
    P2SH,
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashAddress {
    pub prefix: String,
    pub addr_type: CashAddrType,
    pub hash: Vec<u8>,
}

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    const GENERATORS: [u64; 5] = [
        0x98f2bc8e61,
        0x79b76d99e2,
        0xf33e5fb3c4,
        0xae2eabe2a8,
        0x1e4f43e470,
    ];

    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        for (i, generator) in GENERATORS.iter().enumerate() {
            if c0 & (1 << i) != 0 {
                c ^= generator;
            }
        }
    }

    c ^ 1
}

fn hash_size(version: u8) -> usize {
    match version & 0x07 {
        0 => 20,
        1 => 24,
        2 => 28,
        3 => 32,
        4 => 40,
        5 => 48,
        6 => 56,
        _ => 64,
    }
}

/// Decodes a CashAddr string. An address without an explicit prefix is
/// checked against `default_prefix`.
pub fn decode_cashaddr(address: &str, default_prefix: &str) -> Result<CashAddress, String> {
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(format!("Address {} uses mixed case", address));
    }

    let address = address.to_ascii_lowercase();
    let (prefix, payload) = match address.rsplit_once(':') {
        Some((prefix, payload)) => (prefix.to_string(), payload),
        None => (default_prefix.to_ascii_lowercase(), address.as_str()),
    };

    if prefix.is_empty() || payload.len() <= CHECKSUM_LEN {
        return Err(format!("Address {} is too short", address));
    }

    let mut data = Vec::with_capacity(payload.len());
    for c in payload.bytes() {
        let value = CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| format!("Invalid character '{}' in address {}", c as char, address))?;
        data.push(value as u8);
    }

    let checked = prefix
        .bytes()
        .map(|b| b & 0x1f)
        .chain(std::iter::once(0))
        .chain(data.iter().copied());
    if polymod(checked) != 0 {
        return Err(format!("Invalid checksum for address {}", address));
    }

    // Regroup 5-bit words into bytes, padding bits must be zero.
    let mut bytes = Vec::with_capacity(data.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for value in &data[..data.len() - CHECKSUM_LEN] {
        acc = (acc << 5) | *value as u32;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            bytes.push((acc >> bits) as u8);
        }
        acc &= (1 << bits) - 1;
    }
    if bits >= 5 || acc != 0 {
        return Err(format!("Invalid padding in address {}", address));
    }

    let (version, hash) = bytes
        .split_first()
        .ok_or_else(|| format!("Address {} has an empty payload", address))?;
    if version & 0x80 != 0 {
        return Err(format!("Reserved version bit set in address {}", address));
    }
    if hash.len() != hash_size(*version) {
        return Err(format!(
            "Hash length {} does not match version {} in address {}",
            hash.len(),
            version,
            address
        ));
    }

    let addr_type = match (version >> 3) & 0x0f {
        0 => CashAddrType::P2PKH,
        1 => CashAddrType::P2SH,
        other => CashAddrType::Other(other),
    };

    Ok(CashAddress {
        prefix,
        addr_type,
        hash: hash.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_decode_testnet_p2pkh() {
        let addr = decode_cashaddr(
            "bchtest:qqekcwxmfzhgn775r6t382g08mx4cxclfsd2d2v0x0",
            "bitcoincash",
        )
        .unwrap();

        assert_eq!(addr.prefix, "bchtest");
        assert_eq!(addr.addr_type, CashAddrType::P2PKH);
        assert_eq!(to_hex(&addr.hash), "336c38db48ae89fbd41e9713a90f3ecd5c1b1f4c");
    }

    #[test]
    fn test_decode_mainnet_vectors() {
        let p2pkh = decode_cashaddr(
            "bitcoincash:qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2",
            "bitcoincash",
        )
        .unwrap();
        assert_eq!(p2pkh.addr_type, CashAddrType::P2PKH);
        assert_eq!(to_hex(&p2pkh.hash), "f5bf48b397dae70be82b3cca4793f8eb2b6cdac9");

        let p2sh = decode_cashaddr(
            "bitcoincash:ppm2qsznhks23z7629mms6s4cwef74vcwvn0h829pq",
            "bitcoincash",
        )
        .unwrap();
        assert_eq!(p2sh.addr_type, CashAddrType::P2SH);
        assert_eq!(to_hex(&p2sh.hash), "76a04053bda0a88bda5177b86a15c3b29f559873");
    }

    #[test]
    fn test_decode_without_prefix_uses_default() {
        let addr = decode_cashaddr("qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2", "bitcoincash")
            .unwrap();
        assert_eq!(addr.prefix, "bitcoincash");

        // The checksum covers the prefix, so the wrong default fails
        assert!(decode_cashaddr("qr6m7j9njldwwzlg9v7v53unlr4jkmx6eylep8ekg2", "bchtest").is_err());
    }

    #[test]
    fn test_decode_uppercase() {
        let addr = decode_cashaddr(
            "BITCOINCASH:QR6M7J9NJLDWWZLG9V7V53UNLR4JKMX6EYLEP8EKG2",
            "bitcoincash",
        )
        .unwrap();
        assert_eq!(addr.addr_type, CashAddrType::P2PKH);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        // Bad checksum
        assert!(
            decode_cashaddr("bchtest:qqekcwxmfzhgn775r6t382g08mx4cxclfsd2d2v0xq", "bchtest")
                .is_err()
        );
        // Mixed case
        assert!(
            decode_cashaddr("bchtest:Qqekcwxmfzhgn775r6t382g08mx4cxclfsd2d2v0x0", "bchtest")
                .is_err()
        );
        // Character outside the charset
        assert!(
            decode_cashaddr("bchtest:bqekcwxmfzhgn775r6t382g08mx4cxclfsd2d2v0x0", "bchtest")
                .is_err()
        );
        // Legacy base58 address
        assert!(decode_cashaddr("1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu", "bitcoincash").is_err());
        assert!(decode_cashaddr("", "bitcoincash").is_err());
    }
}
