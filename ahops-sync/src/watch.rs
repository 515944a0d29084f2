//! Accounts the user cares about. Watched accounts sort first and are counted per view.

use ahopsconfig::ACCOUNTS_QUERY_PARAM;

use crate::address::{normalize, AddressError};
use crate::primitives::Entry;

/// Why an identifier was not added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchListError {
    /// The identifier does not normalize
    #[error("{0} is not a valid account. {1}")]
    Invalid(String, AddressError),
    /// The normalized account is already watched
    #[error("{0} is already on the watch list")]
    Duplicate(String),
}

/// A watched identifier as the user typed it, and its canonical form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEntry {
    /// as supplied
    pub raw: String,
    /// canonical encoding, used for every comparison
    pub normalized: String,
}

/// Ordered, duplicate free set of watched accounts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchList {
    entries: Vec<WatchEntry>,
}

impl WatchList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Watched entries in insertion order
    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    /// True when nothing is watched
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of watched accounts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Adds a user supplied identifier. Rejects malformed identifiers and accounts already watched
    /// under any encoding.
    pub fn add(&mut self, raw: &str) -> Result<&WatchEntry, WatchListError> {
        let raw = raw.trim();
        let normalized =
            normalize(raw).map_err(|e| WatchListError::Invalid(raw.to_string(), e))?;
        if self.contains_normalized(&normalized) {
            return Err(WatchListError::Duplicate(raw.to_string()));
        }
        self.entries.push(WatchEntry {
            raw: raw.to_string(),
            normalized,
        });

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Adds the connected wallet's own account. Already watched or malformed accounts are ignored.
    /// Returns true if the list changed.
    pub fn include_account(&mut self, raw: &str) -> bool {
        match self.add(raw) {
            Ok(entry) => {
                tracing::info!("Watching connected account {}", entry.normalized);
                true
            }
            Err(WatchListError::Duplicate(_)) => false,
            Err(e) => {
                tracing::warn!("Not watching connected account. {}", e);
                false
            }
        }
    }

    /// Removes the account `raw` refers to, under whatever encoding. Returns the removed entry.
    pub fn remove(&mut self, raw: &str) -> Option<WatchEntry> {
        let normalized = normalize(raw.trim()).ok()?;
        let position = self
            .entries
            .iter()
            .position(|entry| entry.normalized.eq_ignore_ascii_case(&normalized))?;

        Some(self.entries.remove(position))
    }

    fn contains_normalized(&self, normalized: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.normalized.eq_ignore_ascii_case(normalized))
    }

    /// True if `account` normalizes to a watched account
    pub fn contains(&self, account: &str) -> bool {
        match normalize(account) {
            Ok(normalized) => self.contains_normalized(&normalized),
            Err(_) => false,
        }
    }

    /// Parses a query string such as `accounts=a,b`. Invalid and duplicate identifiers are dropped
    /// with a warning.
    pub fn from_query(query: &str) -> Self {
        let mut list = WatchList::new();
        let query = query.trim_start_matches('?');
        let values = query.split('&').filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == ACCOUNTS_QUERY_PARAM).then_some(value)
        });
        for raw in values.flat_map(|value| value.split(',')) {
            if raw.trim().is_empty() {
                continue;
            }
            if let Err(e) = list.add(raw) {
                tracing::warn!("Dropping watch list entry. {}", e);
            }
        }
        list
    }

    /// The raw identifiers as an `accounts=` query string, in insertion order.
    pub fn to_query(&self) -> String {
        let raws: Vec<&str> = self.entries.iter().map(|entry| entry.raw.as_str()).collect();
        format!("{}={}", ACCOUNTS_QUERY_PARAM, raws.join(","))
    }

    /// For each watched account, how many of `entries` belong to it.
    pub fn match_counts(&self, entries: &[Entry]) -> Vec<(WatchEntry, usize)> {
        let normalized: Vec<Option<String>> = entries
            .iter()
            .map(|entry| normalize(entry.account()).ok())
            .collect();
        self.entries
            .iter()
            .map(|watched| {
                let count = normalized
                    .iter()
                    .flatten()
                    .filter(|account| account.eq_ignore_ascii_case(&watched.normalized))
                    .count();
                (watched.clone(), count)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::EntryKind;

    const ALICE_POLKADOT: &str = "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5";
    const ALICE_GENERIC: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB_GENERIC: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
    const BOB_POLKADOT: &str = "14E5nqKAp3oAJcmzgZhUD2RcptBeUBScxKHgJKU4HPNcKVf3";

    fn entry(account: &str) -> Entry {
        Entry::from_parts(EntryKind::LeaseReserve, 1, 2000, account.to_string(), None, 1)
    }

    #[test]
    fn duplicates_are_detected_across_encodings() {
        let mut list = WatchList::new();
        list.add(ALICE_GENERIC).unwrap();

        assert_eq!(
            list.add(ALICE_POLKADOT),
            Err(WatchListError::Duplicate(ALICE_POLKADOT.to_string()))
        );
        assert!(matches!(
            list.add("nonsense"),
            Err(WatchListError::Invalid(..))
        ));
        assert_eq!(list.len(), 1);
        assert!(list.contains(ALICE_POLKADOT));
    }

    #[test]
    fn auto_inclusion_is_silent_on_duplicates() {
        let mut list = WatchList::new();
        assert!(list.include_account(BOB_GENERIC));
        assert!(!list.include_account(BOB_POLKADOT));
        assert!(!list.include_account("nonsense"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_accepts_any_encoding() {
        let mut list = WatchList::new();
        list.add(ALICE_GENERIC).unwrap();

        let removed = list.remove(ALICE_POLKADOT).unwrap();
        assert_eq!(removed.raw, ALICE_GENERIC);
        assert!(list.is_empty());
        assert_eq!(list.remove(ALICE_POLKADOT), None);
    }

    #[test]
    fn query_string_keeps_raw_identifiers() {
        let query = format!("?foo=bar&accounts={},,{},garbage", ALICE_GENERIC, BOB_POLKADOT);
        let list = WatchList::from_query(&query);

        assert_eq!(list.len(), 2);
        assert_eq!(
            list.to_query(),
            format!("accounts={},{}", ALICE_GENERIC, BOB_POLKADOT)
        );
        assert_eq!(WatchList::from_query(&list.to_query()), list);
    }

    #[test]
    fn counts_matches_per_account() {
        let mut list = WatchList::new();
        list.add(ALICE_GENERIC).unwrap();
        list.add(BOB_GENERIC).unwrap();
        let entries = vec![
            entry(ALICE_POLKADOT),
            entry(ALICE_POLKADOT),
            entry("not an account"),
        ];

        let counts: Vec<usize> = list
            .match_counts(&entries)
            .into_iter()
            .map(|(_, count)| count)
            .collect();
        assert_eq!(counts, vec![2, 0]);
    }
}
