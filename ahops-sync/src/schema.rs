//! Key/value layout of the AhOps storage maps.
//!
//! All three maps are keyed `(Twox64Concat u32, Twox64Concat u32, Twox64Concat AccountId32)`, i.e.
//! each key part is an 8 byte hash followed by the SCALE encoding of the part. Values are a `u128`
//! balance, preceded by the fund pot account for contributions. Nothing outside this module looks
//! at raw bytes.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::address::AccountId32;
use crate::error::DecodeError;
use crate::primitives::{Entry, EntryKind};

// twox_128("AhOps"), known constant
const AH_OPS_PALLET_PREFIX: [u8; 16] = [
    0xa3, 0xfd, 0x19, 0x27, 0xfc, 0x5a, 0x91, 0x37, 0x48, 0x69, 0x26, 0x4a, 0xa0, 0x66, 0xcc, 0x19,
];
// twox_128("RcCrowdloanContribution")
const CONTRIBUTION_PREFIX: [u8; 16] = [
    0x0c, 0xa7, 0x11, 0x8a, 0x15, 0xff, 0x77, 0xe2, 0x7a, 0x0f, 0xac, 0x33, 0xfd, 0xdc, 0x4a, 0x00,
];
// twox_128("RcLeaseReserve")
const LEASE_RESERVE_PREFIX: [u8; 16] = [
    0xd4, 0xcb, 0x61, 0xa4, 0xe0, 0x99, 0x87, 0x08, 0x44, 0x8b, 0xb3, 0xe6, 0x2e, 0xfd, 0xbe, 0xff,
];
// twox_128("RcCrowdloanReserve")
const CROWDLOAN_RESERVE_PREFIX: [u8; 16] = [
    0xd5, 0x17, 0x7b, 0x09, 0x70, 0x23, 0xda, 0xbb, 0x96, 0xb2, 0xa1, 0xd8, 0x4d, 0x4b, 0x06, 0x04,
];

const TWOX64_LEN: usize = 8;
/// Length of a full key: map prefix plus three hashed key parts.
pub const KEY_LEN: usize = 32 + (TWOX64_LEN + 4) * 2 + TWOX64_LEN + 32;
const BALANCE_LEN: usize = 16;

/// One storage map: where it lives and how its records decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageMap {
    kind: EntryKind,
}

impl StorageMap {
    /// The map holding entries of `kind`
    pub fn new(kind: EntryKind) -> Self {
        StorageMap { kind }
    }

    /// Kind of entry this map decodes to
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// `twox_128(pallet) ++ twox_128(item)`
    pub fn prefix(&self) -> [u8; 32] {
        let item = match self.kind {
            EntryKind::Contribution => CONTRIBUTION_PREFIX,
            EntryKind::LeaseReserve => LEASE_RESERVE_PREFIX,
            EntryKind::CrowdloanReserve => CROWDLOAN_RESERVE_PREFIX,
        };
        let mut prefix = [0u8; 32];
        prefix[..16].copy_from_slice(&AH_OPS_PALLET_PREFIX);
        prefix[16..].copy_from_slice(&item);
        prefix
    }

    /// Prefix as the node expects it in RPC params
    pub fn prefix_hex(&self) -> String {
        format!("0x{}", hex::encode(self.prefix()))
    }

    fn expected_value_len(&self) -> usize {
        match self.kind {
            EntryKind::Contribution => 32 + BALANCE_LEN,
            EntryKind::LeaseReserve | EntryKind::CrowdloanReserve => BALANCE_LEN,
        }
    }

    /// Decodes one raw record into a typed entry. Accounts come out canonically encoded.
    pub fn decode(&self, key: &[u8], value: &[u8]) -> Result<Entry, DecodeError> {
        if !key.starts_with(&self.prefix()) {
            return Err(DecodeError::WrongPrefix(self.kind.storage_name()));
        }
        if key.len() != KEY_LEN {
            return Err(DecodeError::KeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        if value.len() != self.expected_value_len() {
            return Err(DecodeError::ValueLength {
                expected: self.expected_value_len(),
                actual: value.len(),
            });
        }
        let key_length_error = || DecodeError::KeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        };

        let mut key_reader = Cursor::new(&key[32..]);
        key_reader.set_position(TWOX64_LEN as u64);
        let unlock_block = key_reader
            .read_u32::<LittleEndian>()
            .map_err(|_| key_length_error())?;
        key_reader.set_position(key_reader.position() + TWOX64_LEN as u64);
        let para_id = key_reader
            .read_u32::<LittleEndian>()
            .map_err(|_| key_length_error())?;
        key_reader.set_position(key_reader.position() + TWOX64_LEN as u64);
        let account = read_account(&mut key_reader).map_err(|_| key_length_error())?;

        let value_length_error = || DecodeError::ValueLength {
            expected: self.expected_value_len(),
            actual: value.len(),
        };
        let mut value_reader = Cursor::new(value);
        let fund_pot = match self.kind {
            EntryKind::Contribution => Some(
                read_account(&mut value_reader)
                    .map_err(|_| value_length_error())?
                    .to_canonical(),
            ),
            EntryKind::LeaseReserve | EntryKind::CrowdloanReserve => None,
        };
        let balance = value_reader
            .read_u128::<LittleEndian>()
            .map_err(|_| value_length_error())?;

        Ok(Entry::from_parts(
            self.kind,
            unlock_block,
            para_id,
            account.to_canonical(),
            fund_pot,
            balance,
        ))
    }
}

fn read_account(reader: &mut Cursor<&[u8]>) -> std::io::Result<AccountId32> {
    let mut account = [0u8; 32];
    reader.read_exact(&mut account)?;
    Ok(AccountId32(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(map: &StorageMap, block: u32, para: u32, account: [u8; 32]) -> Vec<u8> {
        let mut key = map.prefix().to_vec();
        key.extend_from_slice(&[0xaa; 8]);
        key.extend_from_slice(&block.to_le_bytes());
        key.extend_from_slice(&[0xbb; 8]);
        key.extend_from_slice(&para.to_le_bytes());
        key.extend_from_slice(&[0xcc; 8]);
        key.extend_from_slice(&account);
        key
    }

    #[test]
    fn prefixes_are_distinct_and_under_the_pallet() {
        let prefixes: Vec<_> = EntryKind::ALL
            .iter()
            .map(|kind| StorageMap::new(*kind).prefix())
            .collect();
        for prefix in &prefixes {
            assert_eq!(prefix[..16], AH_OPS_PALLET_PREFIX);
        }
        assert_ne!(prefixes[0], prefixes[1]);
        assert_ne!(prefixes[1], prefixes[2]);
        assert_eq!(
            StorageMap::new(EntryKind::LeaseReserve).prefix_hex(),
            "0xa3fd1927fc5a91374869264aa066cc19d4cb61a4e0998708448bb3e62efdbeff"
        );
    }

    #[test]
    fn decodes_lease_reserve() {
        let map = StorageMap::new(EntryKind::LeaseReserve);
        let value = 1_500_000_000_000u128.to_le_bytes();
        let entry = map.decode(&key(&map, 28_000_000, 2043, [7; 32]), &value).unwrap();

        assert_eq!(entry.kind(), EntryKind::LeaseReserve);
        assert_eq!(entry.unlock_block(), 28_000_000);
        assert_eq!(entry.para_id(), 2043);
        assert_eq!(entry.account(), &AccountId32([7; 32]).to_canonical());
        assert_eq!(entry.fund_pot(), &None);
        assert_eq!(entry.balance(), 1_500_000_000_000);
    }

    #[test]
    fn decodes_contribution_with_fund_pot() {
        let map = StorageMap::new(EntryKind::Contribution);
        let mut value = [9u8; 32].to_vec();
        value.extend_from_slice(&42u128.to_le_bytes());
        let entry = map.decode(&key(&map, 1, 3360, [1; 32]), &value).unwrap();

        assert_eq!(entry.fund_pot(), &Some(AccountId32([9; 32]).to_canonical()));
        assert_eq!(entry.balance(), 42);
    }

    #[test]
    fn rejects_foreign_and_truncated_records() {
        let lease = StorageMap::new(EntryKind::LeaseReserve);
        let reserve = StorageMap::new(EntryKind::CrowdloanReserve);
        let value = 1u128.to_le_bytes();
        let lease_key = key(&lease, 1, 1, [1; 32]);

        assert_eq!(
            reserve.decode(&lease_key, &value),
            Err(DecodeError::WrongPrefix("RcCrowdloanReserve"))
        );
        assert!(matches!(
            lease.decode(&lease_key[..KEY_LEN - 1], &value),
            Err(DecodeError::KeyLength { .. })
        ));
        assert!(matches!(
            lease.decode(&lease_key, &value[..8]),
            Err(DecodeError::ValueLength { .. })
        ));
    }
}
