//! These functions can be called by consumers to learn about the Dashboard.
use ahops_status::submission_status::SubmissionStatus;
use ahops_sync::{
    alias::{display_para_id, ParaIdDisplay},
    client::ChainClient,
    clock::UnlockCountdown,
    primitives::{Entry, EntryKind},
};
use json::{object, JsonValue};

use super::{Dashboard, Projection};
use crate::format::format_balance;

/// One row as the user sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct RowView {
    pub index: usize,
    pub para: ParaIdDisplay,
    pub unlock_block: u32,
    pub account: String,
    pub fund_pot: Option<String>,
    pub balance: String,
    pub countdown: UnlockCountdown,
    pub watched: bool,
    pub status: Option<SubmissionStatus>,
}

impl RowView {
    pub fn to_json(&self) -> JsonValue {
        object! {
            "row" => self.index,
            "para_id" => self.para.label.clone(),
            "para_note" => self.para.tooltip,
            "unlock_block" => self.unlock_block,
            "unlocks_in_days" => self.countdown.to_string(),
            "account" => self.account.clone(),
            "fund_pot" => self.fund_pot.clone(),
            "balance" => self.balance.clone(),
            "watched" => self.watched,
            "status" => self.status.as_ref().map(ToString::to_string),
        }
    }
}

impl<C: ChainClient> Dashboard<C> {
    fn row_view(&self, projection: &Projection, index: usize, entry: &Entry, watched: bool) -> RowView {
        RowView {
            index,
            para: display_para_id(&entry.para_id().to_string()),
            unlock_block: entry.unlock_block(),
            account: entry.account().clone(),
            fund_pot: entry.fund_pot().clone(),
            balance: format_balance(
                entry.balance(),
                self.properties.decimals,
                &self.properties.symbol,
            ),
            countdown: UnlockCountdown::from(projection.unlock_days_for(entry)),
            watched,
            status: self.submission_status(entry),
        }
    }

    /// Rows of `kind` in display order, ready to render.
    pub async fn rows(&self, kind: EntryKind) -> Vec<RowView> {
        let projection = self.projection(kind).await;
        let watch_list = self.watch_list.read().await;

        projection
            .rows
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                self.row_view(&projection, index, entry, watch_list.contains(entry.account()))
            })
            .collect()
    }

    pub async fn do_view(&self, kind: EntryKind) -> JsonValue {
        let projection = self.projection(kind).await;
        let rows: Vec<JsonValue> = self
            .rows(kind)
            .await
            .iter()
            .map(RowView::to_json)
            .collect();

        object! {
            "view" => kind.to_string(),
            "state" => projection.fetch_state.to_string(),
            "loading" => !projection.initial_content_ready && projection.fetch_state.is_fetching(),
            "current_block" => projection.current_block,
            "error" => projection.last_error.as_ref().map(ToString::to_string),
            "rows" => JsonValue::Array(rows),
        }
    }

    pub async fn do_info(&self) -> JsonValue {
        let mut views = JsonValue::new_object();
        for kind in EntryKind::ALL {
            let state = self.view(kind).read().await;
            // every key is a plain string, insert can not fail
            let _ = views.insert(&kind.to_string(), state.fetch_state().to_string());
        }

        object! {
            "version" => env!("CARGO_PKG_VERSION"),
            "primary" => self.primary_status().to_string(),
            "secondary" => self.secondary_status().to_string(),
            "current_block" => self.current_block(),
            "block_override" => self.config.block_override.is_some(),
            "token_symbol" => self.properties.symbol.clone(),
            "token_decimals" => self.properties.decimals,
            "wait_for_finalization" => self.config.wait_for_finalization,
            "views" => views,
        }
    }

    /// Every watched account with how many rows of each view belong to it.
    pub async fn do_watch_list(&self) -> JsonValue {
        let watch_list = self.watch_list.read().await;
        let mut counts: Vec<Vec<usize>> = vec![Vec::new(); watch_list.len()];
        for kind in EntryKind::ALL {
            let state = self.view(kind).read().await;
            for (position, (_, count)) in watch_list
                .match_counts(state.cache().entries())
                .into_iter()
                .enumerate()
            {
                counts[position].push(count);
            }
        }

        let accounts: Vec<JsonValue> = watch_list
            .entries()
            .iter()
            .zip(counts)
            .map(|(watched, counts)| {
                let mut matches = JsonValue::new_object();
                for (kind, count) in EntryKind::ALL.iter().zip(counts) {
                    let _ = matches.insert(&kind.to_string(), count);
                }
                object! {
                    "account" => watched.raw.clone(),
                    "normalized" => watched.normalized.clone(),
                    "matches" => matches,
                }
            })
            .collect();

        object! {
            "share" => watch_list.to_query(),
            "accounts" => JsonValue::Array(accounts),
        }
    }
}
