//! Account identifiers arrive in whatever SS58 network encoding the user copied them from. Every
//! comparison goes through [`normalize`], which re-encodes under [`CANONICAL_SS58_PREFIX`].

use std::str::FromStr;

use ahopsconfig::CANONICAL_SS58_PREFIX;
use blake2::{Blake2b512, Digest};

const CHECKSUM_LEN: usize = 2;
const SS58_HASH_PREFIX: &[u8] = b"SS58PRE";

/// Why an identifier could not be read as an account.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Neither hex nor valid base58
    #[error("not base58. {0}")]
    Base58(String),
    /// `0x` prefixed but not hex
    #[error("not hex. {0}")]
    Hex(String),
    /// Decoded to the wrong number of bytes
    #[error("unexpected length {0}")]
    BadLength(usize),
    /// Reserved or out of range network prefix
    #[error("invalid network prefix")]
    InvalidPrefix,
    /// Checksum does not match the body
    #[error("invalid checksum")]
    InvalidChecksum,
}

/// A 32 byte account public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId32(pub [u8; 32]);

impl AccountId32 {
    /// Decodes SS58 and returns the account with the network prefix it was encoded under.
    pub fn from_ss58(encoded: &str) -> Result<(Self, u16), AddressError> {
        let data = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| AddressError::Base58(e.to_string()))?;
        if data.len() < 2 {
            return Err(AddressError::BadLength(data.len()));
        }
        let (prefix_len, prefix) = match data[0] {
            0..=63 => (1, data[0] as u16),
            64..=127 => {
                let lower = (data[0] << 2) | (data[1] >> 6);
                let upper = data[1] & 0b0011_1111;
                (2, (lower as u16) | ((upper as u16) << 8))
            }
            _ => return Err(AddressError::InvalidPrefix),
        };
        if data.len() != prefix_len + 32 + CHECKSUM_LEN {
            return Err(AddressError::BadLength(data.len()));
        }
        let body_len = prefix_len + 32;
        if checksum(&data[..body_len])[..CHECKSUM_LEN] != data[body_len..] {
            return Err(AddressError::InvalidChecksum);
        }
        let mut account = [0u8; 32];
        account.copy_from_slice(&data[prefix_len..body_len]);

        Ok((AccountId32(account), prefix))
    }

    /// `0x` followed by 64 hex digits, i.e. the raw public key.
    pub fn from_hex(encoded: &str) -> Result<Self, AddressError> {
        let digits = encoded
            .strip_prefix("0x")
            .ok_or_else(|| AddressError::Hex("missing 0x".to_string()))?;
        let bytes = hex::decode(digits).map_err(|e| AddressError::Hex(e.to_string()))?;
        let account: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::BadLength(bytes.len()))?;

        Ok(AccountId32(account))
    }

    /// Encodes under the given network prefix.
    pub fn to_ss58(&self, prefix: u16) -> String {
        let mut data = match prefix {
            0..=63 => vec![prefix as u8],
            _ => {
                let first = ((prefix & 0b0000_0000_1111_1100) as u8) >> 2;
                let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
                vec![first | 0b0100_0000, second]
            }
        };
        data.extend_from_slice(&self.0);
        let hash = checksum(&data);
        data.extend_from_slice(&hash[..CHECKSUM_LEN]);

        bs58::encode(data).into_string()
    }

    /// Encodes under [`CANONICAL_SS58_PREFIX`].
    pub fn to_canonical(&self) -> String {
        self.to_ss58(CANONICAL_SS58_PREFIX)
    }
}

impl FromStr for AccountId32 {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("0x") {
            Self::from_hex(s)
        } else {
            Self::from_ss58(s).map(|(account, _)| account)
        }
    }
}

fn checksum(body: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_HASH_PREFIX);
    hasher.update(body);
    hasher.finalize().to_vec()
}

/// Canonical encoding of any supported account encoding.
pub fn normalize(raw: &str) -> Result<String, AddressError> {
    raw.parse::<AccountId32>().map(|account| account.to_canonical())
}

/// Compares two identifiers after normalization. Anything that fails to normalize matches nothing.
pub fn addresses_match(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a.eq_ignore_ascii_case(&b),
        _ => false,
    }
}
