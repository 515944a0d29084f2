#![forbid(unsafe_code)]
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use log::{error, info};

use ahops_sync::{client::rpc::WsConnector, watch::WatchList};
use ahopsconfig::{construct_endpoint_uri, DashboardConfig, SettingsOverrides, ACCOUNTS_QUERY_PARAM};
use ahopslib::{commands, signer::signer_from_config, Dashboard};
use clap::{self, Arg};

pub mod version;

pub fn clap_command() -> clap::Command {
    clap::Command::new("AhOps CLI").version(version::VERSION)
            .arg(Arg::new("nosync")
                .help("By default, ahops-cli reads every view at startup. Pass --nosync to read views only when they are listed.")
                .long("nosync")
                .short('n')
                .action(clap::ArgAction::SetTrue))
            .arg(Arg::new("primary")
                .long("primary")
                .value_name("primary")
                .value_parser(parse_endpoint)
                .value_delimiter(',')
                .action(clap::ArgAction::Append)
                .help("Asset hub endpoints holding the AhOps pallet, tried in order. Comma separated or repeated."))
            .arg(Arg::new("secondary")
                .long("secondary")
                .value_name("secondary")
                .value_parser(parse_endpoint)
                .value_delimiter(',')
                .action(clap::ArgAction::Append)
                .help("Relay chain endpoints the current block is read from, tried in order."))
            .arg(Arg::new("block")
                .long("block")
                .short('b')
                .value_name("block")
                .value_parser(clap::value_parser!(u32))
                .help("Compute unlock estimates against this relay chain block instead of polling the relay chain."))
            .arg(Arg::new("accounts")
                .long("accounts")
                .short('a')
                .value_name("accounts")
                .help("Accounts to watch, comma separated, or a query string as printed by 'watch share'."))
            .arg(Arg::new("signer")
                .long("signer")
                .value_name("signer")
                .help("Program that signs unlock calls. It reads the call as json on stdin and prints the signed extrinsic as hex."))
            .arg(Arg::new("signer-account")
                .long("signer-account")
                .value_name("signer-account")
                .help("Account the signer signs for. It is always watched."))
            .arg(Arg::new("no-finalization")
                .long("no-finalization")
                .help("Report unlocks as done once they are in a block instead of waiting for finality.")
                .action(clap::ArgAction::SetTrue))
            .arg(Arg::new("data-dir")
                .long("data-dir")
                .value_name("data-dir")
                .help("Absolute path to use as data directory"))
            .arg(Arg::new("COMMAND")
                .help("Command to execute. If a command is not specified, ahops-cli will start in interactive mode.")
                .required(false)
                .index(1))
            .arg(Arg::new("extra_args")
                .help("Params to execute command with. Run the 'help' command to get usage help.")
                .required(false)
                .num_args(1..)
                .index(2)
                .action(clap::ArgAction::Append)
        )
}

pub fn build_clap_app() -> clap::ArgMatches {
    clap_command().get_matches()
}

fn parse_endpoint(s: &str) -> Result<String, String> {
    construct_endpoint_uri(s)
        .map(|_| s.trim().to_string())
        .map_err(|e| e.to_string())
}

fn start_interactive(
    command_transmitter: Sender<(String, Vec<String>)>,
    resp_receiver: Receiver<String>,
) {
    // `()` can be used when no completer is required
    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not start the line editor: {}", e);
            return;
        }
    };

    log::debug!("Ready!");

    let send_command = |cmd: String, args: Vec<String>| -> String {
        if let Err(e) = command_transmitter.send((cmd.clone(), args)) {
            let e = format!("Error sending command {}: {}", cmd, e);
            eprintln!("{}", e);
            error!("{}", e);
            return "".to_string();
        }
        match resp_receiver.recv() {
            Ok(s) => s,
            Err(e) => {
                let e = format!("Error executing command {}: {}", cmd, e);
                eprintln!("{}", e);
                error!("{}", e);
                "".to_string()
            }
        }
    };

    let mut symbol = "".to_string();

    loop {
        if symbol.is_empty() {
            let info = send_command("info".to_string(), vec![]);
            symbol = json::parse(&info)
                .map(|mut json_info| json_info.remove("token_symbol"))
                .ok()
                .and_then(|symbol| symbol.as_str().map(ToString::to_string))
                .unwrap_or("".to_string());
        }
        // Read the block first
        let block = json::parse(&send_command("block".to_string(), vec![]))
            .ok()
            .and_then(|block| block["current_block"].as_u32())
            .map(|block| block.to_string())
            .unwrap_or("unknown".to_string());

        let readline = rl.readline(&format!(
            "(AhOps {}) Block:{} (type 'help') >> ",
            symbol, block
        ));
        match readline {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    log::debug!("History entry not added: {}", e);
                }
                // Parse command line arguments
                let mut cmd_args = match shellwords::split(&line) {
                    Ok(args) => args,
                    Err(_) => {
                        println!("Mismatched Quotes");
                        continue;
                    }
                };

                if cmd_args.is_empty() {
                    continue;
                }

                let cmd = cmd_args.remove(0);
                let args: Vec<String> = cmd_args;

                println!("{}", send_command(cmd, args));

                // Special check for Quit command.
                if line == "quit" {
                    break;
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                info!("CTRL-C");
                send_command("quit".to_string(), vec![]);
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D");
                info!("CTRL-D");
                send_command("quit".to_string(), vec![]);
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
}

pub fn command_loop(dashboard: Arc<Dashboard>) -> (Sender<(String, Vec<String>)>, Receiver<String>) {
    let (command_transmitter, command_receiver) = channel::<(String, Vec<String>)>();
    let (resp_transmitter, resp_receiver) = channel::<String>();

    std::thread::spawn(move || {
        while let Ok((cmd, args)) = command_receiver.recv() {
            let args: Vec<_> = args.iter().map(|s| s.as_ref()).collect();

            let cmd_response = commands::do_user_command(&cmd, &args[..], dashboard.as_ref());
            if resp_transmitter.send(cmd_response).is_err() {
                break;
            }

            if cmd == "quit" {
                info!("Quit");
                break;
            }
        }
    });

    (command_transmitter, resp_receiver)
}

pub struct ConfigTemplate {
    params: Vec<String>,
    command: Option<String>,
    data_dir: Option<PathBuf>,
    /// session only, never persisted
    overrides: SettingsOverrides,
    accounts: Option<String>,
    sync: bool,
}
use commands::ShortCircuitedCommand;
fn short_circuit_on_help(params: Vec<String>) {
    for h in commands::HelpCommand::exec_without_dashboard(params).lines() {
        println!("{}", h);
    }
    std::process::exit(0x0100);
}
#[derive(Debug)]
pub enum TemplateFillError {
    MissingSignerProgram(PathBuf),
    SignerAccountWithoutSigner,
}

impl std::fmt::Display for TemplateFillError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSignerProgram(path) => {
                write!(f, "signer program {} does not exist", path.display())
            }
            Self::SignerAccountWithoutSigner => {
                write!(f, "--signer-account needs --signer")
            }
        }
    }
}

/// This type manages setup of the ahops-cli utility among its responsibilities:
///  * parse arguments with standard clap: <https://crates.io/crates/clap>
///  * turn them into settings overrides that last for this session only
///  * If a ShortCircuitCommand is specified, then the system should execute only logic necessary to
///    support that command, in other words "help" _MUST_ not connect to any chain
impl ConfigTemplate {
    pub fn fill(matches: clap::ArgMatches) -> Result<Self, TemplateFillError> {
        let params = if let Some(vals) = matches.get_many::<String>("extra_args") {
            vals.cloned().collect()
        } else {
            vec![]
        };
        let command = if let Some(refstr) = matches.get_one::<String>("COMMAND") {
            if refstr == &"help".to_string() {
                short_circuit_on_help(params.clone());
            }
            Some(refstr.to_string())
        } else {
            None
        };

        let signer_program = matches.get_one::<String>("signer").map(PathBuf::from);
        if let Some(program) = &signer_program {
            if !program.exists() {
                return Err(TemplateFillError::MissingSignerProgram(program.clone()));
            }
        }
        let signer_account = matches.get_one::<String>("signer-account").cloned();
        if signer_account.is_some() && signer_program.is_none() {
            return Err(TemplateFillError::SignerAccountWithoutSigner);
        }

        let endpoints = |id: &str| {
            matches
                .get_many::<String>(id)
                .map(|endpoints| endpoints.cloned().collect::<Vec<String>>())
        };
        let overrides = SettingsOverrides {
            primary_endpoints: endpoints("primary"),
            secondary_endpoints: endpoints("secondary"),
            block_override: matches.get_one::<u32>("block").copied(),
            wait_for_finalization: matches.get_flag("no-finalization").then_some(false),
            signer_program,
            signer_account,
            ..Default::default()
        };

        let data_dir = matches.get_one::<String>("data-dir").map(PathBuf::from);
        if let Some(dir) = &data_dir {
            log::info!("data_dir: {}", dir.display());
        }

        Ok(Self {
            params,
            command,
            data_dir,
            overrides,
            accounts: matches.get_one::<String>("accounts").cloned(),
            sync: !matches.get_flag("nosync"),
        })
    }

    /// The watch list given on the command line. Accepts a bare comma separated list or an
    /// `accounts=` query string.
    pub fn watch_list(&self) -> WatchList {
        match &self.accounts {
            Some(accounts) if accounts.contains('=') => WatchList::from_query(accounts),
            Some(accounts) => {
                WatchList::from_query(&format!("{}={}", ACCOUNTS_QUERY_PARAM, accounts))
            }
            None => WatchList::new(),
        }
    }
}

/// A (command, args) request
pub type CommandRequest = (String, Vec<String>);

/// Command responses are strings
pub type CommandResponse = String;

pub fn startup(
    filled_template: &ConfigTemplate,
) -> std::io::Result<(Sender<CommandRequest>, Receiver<CommandResponse>)> {
    let mut config =
        DashboardConfig::load(filled_template.data_dir.clone()).map_err(std::io::Error::other)?;
    filled_template.overrides.clone().apply(&mut config);
    config.validate().map_err(std::io::Error::other)?;

    if let Err(e) = ahopslib::init_logging(&config) {
        eprintln!("Could not initialize logging: {e}")
    };

    if filled_template.command.is_none() {
        // Print startup Messages
        info!(""); // Blank line
        info!("Starting AhOps-CLI");
        info!("Dashboard config {:?}", config);
    }

    let signer = signer_from_config(&config);
    let dashboard = commands::runtime()
        .block_on(Dashboard::start(
            config,
            &WsConnector,
            signer,
            filled_template.watch_list(),
        ))
        .map_err(std::io::Error::other)?;
    let dashboard = Arc::new(dashboard);

    // At startup, read every view.
    if filled_template.sync {
        let update = commands::do_user_command("sync", &[], dashboard.as_ref());
        println!("{}", update);
    }

    // Start the command loop
    let (command_transmitter, resp_receiver) = command_loop(dashboard);

    Ok((command_transmitter, resp_receiver))
}
fn start_cli_service(
    cli_config: &ConfigTemplate,
) -> Option<(Sender<(String, Vec<String>)>, Receiver<String>)> {
    match startup(cli_config) {
        Ok(c) => Some(c),
        Err(e) => {
            let emsg = format!("Error during startup:\n{}\n", e);
            eprintln!("{}", emsg);
            error!("{}", emsg);
            None
        }
    }
}
fn dispatch_command_or_start_interactive(cli_config: &ConfigTemplate) {
    let Some((command_transmitter, resp_receiver)) = start_cli_service(cli_config) else {
        std::process::exit(1);
    };
    match &cli_config.command {
        None => start_interactive(command_transmitter, resp_receiver),
        Some(command) => {
            if let Err(e) = command_transmitter.send((command.clone(), cli_config.params.clone())) {
                eprintln!("Error sending command {}: {}", command, e);
                return;
            }

            match resp_receiver.recv() {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    let e = format!("Error executing command {}: {}", command, e);
                    eprintln!("{}", e);
                    error!("{}", e);
                }
            }
        }
    }
}
pub fn run_cli() {
    let cli_config = match ConfigTemplate::fill(build_clap_app()) {
        Ok(cli_config) => cli_config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    dispatch_command_or_start_interactive(&cli_config);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_POLKADOT: &str = "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5";
    const BOB_GENERIC: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    fn fill(args: &[&str]) -> Result<ConfigTemplate, TemplateFillError> {
        let matches = clap_command()
            .try_get_matches_from(std::iter::once("ahops-cli").chain(args.iter().copied()))
            .unwrap();
        ConfigTemplate::fill(matches)
    }

    #[test]
    fn flags_become_session_overrides() {
        let template = fill(&[
            "--primary",
            "wss://a.example,wss://b.example",
            "--secondary",
            "rpc.polkadot.io",
            "--block",
            "22000000",
            "--no-finalization",
            "--nosync",
            "lease_reserves",
        ])
        .unwrap();

        assert_eq!(
            template.overrides.primary_endpoints,
            Some(vec!["wss://a.example".to_string(), "wss://b.example".to_string()])
        );
        assert_eq!(
            template.overrides.secondary_endpoints,
            Some(vec!["rpc.polkadot.io".to_string()])
        );
        assert_eq!(template.overrides.block_override, Some(22_000_000));
        assert_eq!(template.overrides.wait_for_finalization, Some(false));
        assert!(!template.sync);
        assert_eq!(template.command.as_deref(), Some("lease_reserves"));

        let mut config = DashboardConfig::default();
        template.overrides.clone().apply(&mut config);
        assert_eq!(config.block_override, Some(22_000_000));
        assert!(!config.wait_for_finalization);
    }

    #[test]
    fn absent_flags_keep_persisted_settings() {
        let template = fill(&[]).unwrap();
        assert_eq!(template.overrides, SettingsOverrides::default());
        assert!(template.sync);
        assert!(template.command.is_none());
        assert!(template.watch_list().is_empty());
    }

    #[test]
    fn bad_endpoints_are_rejected_by_clap() {
        assert!(clap_command()
            .try_get_matches_from(["ahops-cli", "--primary", "https://rpc.polkadot.io"])
            .is_err());
    }

    #[test]
    fn accounts_accept_both_forms() {
        let bare = fill(&["--accounts", &format!("{},{}", ALICE_POLKADOT, BOB_GENERIC)]).unwrap();
        let query = fill(&["--accounts", &format!("accounts={}", ALICE_POLKADOT)]).unwrap();

        assert_eq!(bare.watch_list().len(), 2);
        assert_eq!(query.watch_list().len(), 1);
    }

    #[test]
    fn signer_flags_are_checked() {
        assert!(matches!(
            fill(&["--signer", "/definitely/not/here"]),
            Err(TemplateFillError::MissingSignerProgram(_))
        ));
        assert!(matches!(
            fill(&["--signer-account", ALICE_POLKADOT]),
            Err(TemplateFillError::SignerAccountWithoutSigner)
        ));
    }
}
