//! Module for primitive structs associated with the sync engine

use getset::{CopyGetters, Getters};

use ahops_status::submission_status::DispatchError;

/// The three storage maps of the AhOps pallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    /// A crowdloan contribution held in a fund pot
    Contribution,
    /// A deposit reserved for a parachain slot lease
    LeaseReserve,
    /// A deposit reserved for creating a crowdloan
    CrowdloanReserve,
}

impl EntryKind {
    /// Every kind, in display order.
    pub const ALL: [EntryKind; 3] = [
        EntryKind::Contribution,
        EntryKind::LeaseReserve,
        EntryKind::CrowdloanReserve,
    ];

    /// Storage item name inside the pallet.
    pub fn storage_name(&self) -> &'static str {
        match self {
            EntryKind::Contribution => "RcCrowdloanContribution",
            EntryKind::LeaseReserve => "RcLeaseReserve",
            EntryKind::CrowdloanReserve => "RcCrowdloanReserve",
        }
    }

    /// Call that releases an entry of this kind.
    pub fn unlock_call(&self) -> &'static str {
        match self {
            EntryKind::Contribution => "withdraw_crowdloan_contribution",
            EntryKind::LeaseReserve => "unreserve_lease_deposit",
            EntryKind::CrowdloanReserve => "unreserve_crowdloan_reserve",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryKind::Contribution => "contributions",
            EntryKind::LeaseReserve => "lease_reserves",
            EntryKind::CrowdloanReserve => "crowdloan_reserves",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contribution" | "contributions" => Ok(EntryKind::Contribution),
            "lease" | "lease_reserve" | "lease_reserves" => Ok(EntryKind::LeaseReserve),
            "crowdloan" | "crowdloan_reserve" | "crowdloan_reserves" => {
                Ok(EntryKind::CrowdloanReserve)
            }
            other => Err(format!("unknown entry kind {}", other)),
        }
    }
}

/// (unlock block, para id, account) identifies one claimable record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    /// relay chain block the funds unlock at
    pub unlock_block: u32,
    /// associated parachain
    pub para_id: u32,
    /// holder, canonically encoded
    pub account: String,
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.unlock_block, self.para_id, self.account)
    }
}

/// Identifies one unlock. The same triple may appear in more than one map, each with its own call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnlockKey {
    /// map the entry was read from
    pub kind: EntryKind,
    /// the entry's identity within that map
    pub natural_key: NaturalKey,
}

impl std::fmt::Display for UnlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.natural_key)
    }
}

/// One record of an AhOps storage map, as fetched. Never mutated, only replaced on resync.
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct Entry {
    #[getset(get_copy = "pub")]
    kind: EntryKind,
    #[getset(get_copy = "pub")]
    unlock_block: u32,
    #[getset(get_copy = "pub")]
    para_id: u32,
    #[getset(get = "pub")]
    account: String,
    /// only contributions have one; shown but not part of identity
    #[getset(get = "pub")]
    fund_pot: Option<String>,
    /// raw planck amount, unscaled by decimals
    #[getset(get_copy = "pub")]
    balance: u128,
}

impl Entry {
    /// Creates a new Entry from parts
    pub fn from_parts(
        kind: EntryKind,
        unlock_block: u32,
        para_id: u32,
        account: String,
        fund_pot: Option<String>,
        balance: u128,
    ) -> Self {
        Entry {
            kind,
            unlock_block,
            para_id,
            account,
            fund_pot,
            balance,
        }
    }

    /// The identity of this entry
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            unlock_block: self.unlock_block,
            para_id: self.para_id,
            account: self.account.clone(),
        }
    }

    /// The identity of an unlock of this entry
    pub fn unlock_key(&self) -> UnlockKey {
        UnlockKey {
            kind: self.kind,
            natural_key: self.natural_key(),
        }
    }
}

/// Latest header of a chain, reduced to what the dashboard uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// block height
    pub number: u32,
}

/// Token metadata reported by the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainProperties {
    /// decimals of the native token
    pub decimals: u32,
    /// ticker of the native token
    pub symbol: String,
}

impl Default for ChainProperties {
    fn default() -> Self {
        ChainProperties {
            decimals: 10,
            symbol: "DOT".to_string(),
        }
    }
}

/// One raw key/value pair from a storage page. The value is `None` if the key vanished between
/// listing keys and reading them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    /// full storage key including the map prefix
    pub key: Vec<u8>,
    /// SCALE encoded value
    pub value: Option<Vec<u8>>,
}

/// Status updates for a submitted extrinsic, in the order the node reports them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxEvent {
    /// accepted into the pool
    Ready,
    /// gossiped to peers
    Broadcast,
    /// included in a block
    InBlock {
        /// hash of the including block
        block_hash: String,
        /// set if the call failed inside the runtime
        dispatch_error: Option<DispatchError>,
    },
    /// the including block is final
    Finalized {
        /// hash of the finalized block
        block_hash: String,
        /// set if the call failed inside the runtime
        dispatch_error: Option<DispatchError>,
    },
    /// invalid, dropped, usurped or timed out; carries the node's wording
    Rejected(String),
}
