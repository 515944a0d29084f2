//! An interface that passes strings (e.g. from a cli, into ahopslib)

use std::collections::HashMap;

use ahops_netutils::RpcClient;
use ahops_sync::{alias::display_para_id, client::ChainClient, primitives::EntryKind};
use indoc::indoc;
use json::object;
use lazy_static::lazy_static;
use tokio::runtime::Runtime;

use crate::dashboard::Dashboard;

use self::utils::{parse_kind, parse_unlock_args};

/// Errors associated with the commands interface
mod error;
/// Utilities associated with the commands interface
mod utils;

lazy_static! {
    static ref RT: Runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
}

/// The runtime every command blocks on. Start the dashboard on it too.
pub fn runtime() -> &'static Runtime {
    &RT
}

pub trait Command<C: ChainClient = RpcClient> {
    fn help(&self) -> &'static str;

    fn short_help(&self) -> &'static str;

    fn exec(&self, args: &[&str], dashboard: &Dashboard<C>) -> String;
}

/// Commands that run before a dashboard exists.
pub trait ShortCircuitedCommand {
    fn exec_without_dashboard(args: Vec<String>) -> String;
}

fn error_json(e: impl ToString) -> String {
    object! { "error" => e.to_string() }.pretty(2)
}

pub struct HelpCommand {}

impl HelpCommand {
    fn list<C: ChainClient>(args: &[&str], usage: &str) -> String {
        let commands = get_commands::<C>();
        match args.len() {
            0 => {
                let mut responses = vec![];
                commands.iter().for_each(|(cmd, obj)| {
                    responses.push(format!("{} - {}", cmd, obj.short_help()));
                });

                responses.sort();
                responses.insert(0, "Available commands:".to_string());
                responses.join("\n")
            }
            1 => match commands.get(args[0]) {
                Some(cmd) => cmd.help().to_string(),
                None => format!("Command {} not found", args[0]),
            },
            _ => usage.to_string(),
        }
    }
}

impl<C: ChainClient> Command<C> for HelpCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            List all available commands
            Usage:
            help [command_name]

            If no "command_name" is specified, a list of all available commands is returned
            Example:
            help unlock

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Lists all available commands"
    }

    fn exec(&self, args: &[&str], _: &Dashboard<C>) -> String {
        Self::list::<C>(args, Command::<C>::help(self))
    }
}

impl ShortCircuitedCommand for HelpCommand {
    fn exec_without_dashboard(args: Vec<String>) -> String {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Self::list::<RpcClient>(&args, Command::<RpcClient>::help(&HelpCommand {}))
    }
}

struct InfoCommand {}
impl<C: ChainClient> Command<C> for InfoCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Get info about the chains the dashboard is connected to and the state of every view
            Usage:
            info

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Connections, token and view states"
    }

    fn exec(&self, _args: &[&str], dashboard: &Dashboard<C>) -> String {
        RT.block_on(async move { dashboard.do_info().await.pretty(2) })
    }
}

struct BlockCommand {}
impl<C: ChainClient> Command<C> for BlockCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Get the relay chain block unlock estimates are computed against.
            Either the configured override or the last header read from the relay chain.
            Usage:
            block

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Current relay chain block"
    }

    fn exec(&self, _args: &[&str], dashboard: &Dashboard<C>) -> String {
        object! {
            "current_block" => dashboard.current_block(),
            "source" => if dashboard.config().block_override.is_some() { "override" } else { "relay chain" },
        }
        .pretty(2)
    }
}

struct ViewCommand {
    kind: EntryKind,
}
impl<C: ChainClient> Command<C> for ViewCommand {
    fn help(&self) -> &'static str {
        match self.kind {
            EntryKind::Contribution => indoc! {r#"
                List crowdloan contributions held in fund pots, watched accounts first.
                Syncs first if the cached list is missing or older than a minute.
                Usage:
                contributions

            "#},
            EntryKind::LeaseReserve => indoc! {r#"
                List deposits reserved for parachain slot leases, watched accounts first.
                Syncs first if the cached list is missing or older than a minute.
                Usage:
                lease_reserves

            "#},
            EntryKind::CrowdloanReserve => indoc! {r#"
                List deposits reserved for creating crowdloans, watched accounts first.
                Syncs first if the cached list is missing or older than a minute.
                Usage:
                crowdloan_reserves

            "#},
        }
    }

    fn short_help(&self) -> &'static str {
        match self.kind {
            EntryKind::Contribution => "List crowdloan contributions",
            EntryKind::LeaseReserve => "List lease deposits",
            EntryKind::CrowdloanReserve => "List crowdloan deposits",
        }
    }

    fn exec(&self, args: &[&str], dashboard: &Dashboard<C>) -> String {
        if !args.is_empty() {
            return Command::<C>::help(self).to_string();
        }
        RT.block_on(async move {
            // a failure is recorded on the view and shows up in its output
            if let Err(e) = dashboard.sync_view(self.kind, false).await {
                log::warn!("{} view shown without a fresh sync. {}", self.kind, e);
            }
            dashboard.do_view(self.kind).await.pretty(2)
        })
    }
}

struct SyncCommand {}
impl<C: ChainClient> Command<C> for SyncCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Re-read one view, or all of them, from the chain regardless of the cache age
            Usage:
            sync [contributions|lease_reserves|crowdloan_reserves]

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Force a resync of the views"
    }

    fn exec(&self, args: &[&str], dashboard: &Dashboard<C>) -> String {
        let kinds = match args {
            [] => EntryKind::ALL.to_vec(),
            [kind] => match parse_kind(kind) {
                Ok(kind) => vec![kind],
                Err(e) => return error_json(e),
            },
            _ => return Command::<C>::help(self).to_string(),
        };
        RT.block_on(async move {
            let mut synced = json::JsonValue::new_object();
            for kind in kinds {
                let result = match dashboard.sync_view(kind, true).await {
                    Ok(total_count) => object! { "entries" => total_count },
                    Err(e) => object! { "error" => e.to_string() },
                };
                let _ = synced.insert(&kind.to_string(), result);
            }
            synced.pretty(2)
        })
    }
}

struct WatchCommand {}
impl<C: ChainClient> Command<C> for WatchCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Manage the accounts listed first in every view.
            Accounts are accepted in any SS58 encoding or as 0x prefixed hex.
            Usage:
            watch add <account>
            watch remove <account>
            watch list
            watch share

            "share" prints the list as an accounts= query string, which --accounts accepts.
            Example:
            watch add 15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Add, remove, list or share watched accounts"
    }

    fn exec(&self, args: &[&str], dashboard: &Dashboard<C>) -> String {
        RT.block_on(async move {
            match args {
                ["add", account] => match dashboard.add_watched(account).await {
                    Ok(entry) => object! {
                        "watching" => entry.raw,
                        "normalized" => entry.normalized,
                    }
                    .pretty(2),
                    Err(e) => error_json(e),
                },
                ["remove", account] => match dashboard.remove_watched(account).await {
                    Some(entry) => object! { "removed" => entry.raw }.pretty(2),
                    None => error_json(format!("{} is not on the watch list", account)),
                },
                ["list"] => dashboard.do_watch_list().await.pretty(2),
                ["share"] => dashboard.watch_list().await.to_query(),
                _ => Command::<C>::help(self).to_string(),
            }
        })
    }
}

struct ParaCommand {}
impl<C: ChainClient> Command<C> for ParaCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Show how a para id is labelled. Para ids that were swapped between projects share a label.
            Usage:
            para <para_id>

            Example:
            para 2043

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Label of a para id"
    }

    fn exec(&self, args: &[&str], _dashboard: &Dashboard<C>) -> String {
        match args {
            [para_id] => {
                let display = display_para_id(para_id);
                object! {
                    "label" => display.label,
                    "note" => display.tooltip,
                }
                .pretty(2)
            }
            _ => Command::<C>::help(self).to_string(),
        }
    }
}

struct UnlockCommand {}
impl<C: ChainClient> Command<C> for UnlockCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Unlock the funds of one row. The configured signer program signs the call, which is
            submitted to the asset hub and followed until it is finalized.
            Rows are numbered as the view command last listed them.
            Usage:
            unlock <contributions|lease_reserves|crowdloan_reserves> <row>

            Example:
            unlock lease_reserves 0

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Unlock the funds of one row"
    }

    fn exec(&self, args: &[&str], dashboard: &Dashboard<C>) -> String {
        let (kind, row) = match parse_unlock_args(args) {
            Ok(parsed) => parsed,
            Err(e) => return format!("Error: {}\n{}", e, Command::<C>::help(self)),
        };
        RT.block_on(async move {
            let entry = match dashboard.find_row(kind, row).await {
                Ok(entry) => entry,
                Err(e) => return error_json(e),
            };
            match dashboard.unlock(&entry).await {
                Some(status) => object! {
                    "call" => kind.unlock_call(),
                    "para_id" => entry.para_id(),
                    "unlock_block" => entry.unlock_block(),
                    "account" => entry.account().clone(),
                    "success" => status.is_success(),
                    "status" => status.to_string(),
                }
                .pretty(2),
                None => error_json("an unlock of this row is already in flight"),
            }
        })
    }
}

struct StatusCommand {}
impl<C: ChainClient> Command<C> for StatusCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            List unlock submissions that are in flight or resolved since the last sync
            Usage:
            status

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Unlock submission statuses"
    }

    fn exec(&self, _args: &[&str], dashboard: &Dashboard<C>) -> String {
        let statuses: Vec<json::JsonValue> = dashboard
            .submission_statuses()
            .into_iter()
            .map(|(key, status)| {
                object! {
                    "view" => key.kind.to_string(),
                    "unlock_block" => key.natural_key.unlock_block,
                    "para_id" => key.natural_key.para_id,
                    "account" => key.natural_key.account,
                    "status" => status.to_string(),
                }
            })
            .collect();
        json::JsonValue::Array(statuses).pretty(2)
    }
}

struct QuitCommand {}
impl<C: ChainClient> Command<C> for QuitCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            Disconnect from both chains and quit
            Usage:
            quit

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Quit the dashboard"
    }

    fn exec(&self, _args: &[&str], dashboard: &Dashboard<C>) -> String {
        dashboard.shutdown();
        "quitting".to_string()
    }
}

pub fn get_commands<C: ChainClient>() -> HashMap<&'static str, Box<dyn Command<C>>> {
    let entries: Vec<(&'static str, Box<dyn Command<C>>)> = vec![
        ("help", Box::new(HelpCommand {})),
        ("info", Box::new(InfoCommand {})),
        ("block", Box::new(BlockCommand {})),
        (
            "contributions",
            Box::new(ViewCommand {
                kind: EntryKind::Contribution,
            }),
        ),
        (
            "lease_reserves",
            Box::new(ViewCommand {
                kind: EntryKind::LeaseReserve,
            }),
        ),
        (
            "crowdloan_reserves",
            Box::new(ViewCommand {
                kind: EntryKind::CrowdloanReserve,
            }),
        ),
        ("sync", Box::new(SyncCommand {})),
        ("watch", Box::new(WatchCommand {})),
        ("para", Box::new(ParaCommand {})),
        ("unlock", Box::new(UnlockCommand {})),
        ("status", Box::new(StatusCommand {})),
        ("quit", Box::new(QuitCommand {})),
    ];
    entries.into_iter().collect()
}

pub fn do_user_command<C: ChainClient>(cmd: &str, args: &[&str], dashboard: &Dashboard<C>) -> String {
    match get_commands::<C>().get(cmd.to_ascii_lowercase().as_str()) {
        Some(cmd) => cmd.exec(args, dashboard),
        None => format!(
            "Unknown command : {}. Type 'help' for a list of commands",
            cmd
        ),
    }
}
