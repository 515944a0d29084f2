//! Display order of a view.

use std::cmp::Ordering;

use crate::primitives::Entry;
use crate::watch::WatchList;

fn compare(a: &(bool, &Entry), b: &(bool, &Entry)) -> Ordering {
    let ((a_watched, a), (b_watched, b)) = (a, b);
    b_watched
        .cmp(a_watched)
        .then_with(|| a.para_id().cmp(&b.para_id()))
        .then_with(|| a.unlock_block().cmp(&b.unlock_block()))
        .then_with(|| a.account().cmp(b.account()))
        .then_with(|| a.balance().cmp(&b.balance()))
}

/// Watched accounts first, then ascending para id, unlock block, account and balance.
///
/// Pure function of its inputs. Ties on every key keep their input order.
pub fn sort_entries(entries: &[Entry], watch_list: &WatchList) -> Vec<Entry> {
    let mut keyed: Vec<(bool, &Entry)> = entries
        .iter()
        .map(|entry| (watch_list.contains(entry.account()), entry))
        .collect();
    keyed.sort_by(compare);

    keyed.into_iter().map(|(_, entry)| entry.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AccountId32;
    use crate::primitives::EntryKind;
    use proptest::prelude::*;

    fn entry(para_id: u32, unlock_block: u32, account: u8, balance: u128) -> Entry {
        Entry::from_parts(
            EntryKind::Contribution,
            unlock_block,
            para_id,
            AccountId32([account; 32]).to_canonical(),
            None,
            balance,
        )
    }

    #[test]
    fn watched_accounts_lead() {
        let mut watch_list = WatchList::new();
        watch_list
            .add(&AccountId32([9; 32]).to_ss58(42))
            .unwrap();
        let entries = vec![
            entry(2000, 10, 1, 5),
            entry(3000, 10, 9, 5),
            entry(1000, 10, 2, 5),
            entry(2000, 5, 9, 5),
        ];

        let sorted = sort_entries(&entries, &watch_list);

        assert_eq!(
            sorted,
            vec![
                entries[3].clone(),
                entries[1].clone(),
                entries[2].clone(),
                entries[0].clone(),
            ]
        );
    }

    #[test]
    fn para_id_sorts_numerically() {
        let entries = vec![entry(10_000, 1, 1, 1), entry(999, 1, 1, 1)];
        let sorted = sort_entries(&entries, &WatchList::new());
        assert_eq!(sorted[0].para_id(), 999);
    }

    #[test]
    fn balance_breaks_the_last_tie() {
        let entries = vec![entry(1, 1, 1, 20), entry(1, 1, 1, 3)];
        let sorted = sort_entries(&entries, &WatchList::new());
        assert_eq!(sorted[0].balance(), 3);
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        (0u32..5, 0u32..5, 0u8..4, 0u128..3)
            .prop_map(|(para_id, unlock_block, account, balance)| {
                entry(para_id, unlock_block, account, balance)
            })
    }

    proptest! {
        #[test]
        fn sort_is_idempotent(
            entries in prop::collection::vec(arb_entry(), 0..40),
            watched in prop::collection::vec(0u8..4, 0..3),
        ) {
            let mut watch_list = WatchList::new();
            for account in watched {
                let _ = watch_list.add(&AccountId32([account; 32]).to_canonical());
            }
            let once = sort_entries(&entries, &watch_list);
            let twice = sort_entries(&once, &watch_list);
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once.len(), entries.len());
        }

        #[test]
        fn order_ignores_input_order(
            mut entries in prop::collection::vec(arb_entry(), 0..40),
        ) {
            let watch_list = WatchList::new();
            let sorted = sort_entries(&entries, &watch_list);
            entries.reverse();
            prop_assert_eq!(sort_entries(&entries, &watch_list), sorted);
        }
    }
}
