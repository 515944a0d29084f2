#![forbid(unsafe_code)]
use std::{
    io::{self, Error, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use log::LevelFilter;
use log4rs::{
    append::rolling_file::{
        policy::compound::{
            roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
        },
        RollingFileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};

pub mod store;

pub use store::{SettingsOverrides, SettingsStore};

/// Asset Hub nodes holding the AhOps pallet, tried in order.
pub const DEFAULT_PRIMARY_ENDPOINTS: &[&str] = &[
    "wss://polkadot-asset-hub-rpc.polkadot.io",
    "wss://asset-hub-polkadot-rpc.n.dwellir.com",
    "wss://sys.ibp.network/asset-hub-polkadot",
];
/// Relay chain nodes, only used for the current block number.
pub const DEFAULT_SECONDARY_ENDPOINTS: &[&str] = &[
    "wss://rpc.polkadot.io",
    "wss://polkadot-rpc.n.dwellir.com",
    "wss://rpc.ibp.network/polkadot",
];

pub const HEADER_POLL_INTERVAL: Duration = Duration::from_millis(12_000);
pub const CACHE_TTL: Duration = Duration::from_millis(60_000);
pub const PAGE_SIZE: u32 = 500;
/// Records accumulated between two intermediate publishes of a running sync.
pub const UPDATE_BATCH_SIZE: usize = 10;
/// Relay chain block time. Unlock estimates are only as good as this number.
pub const SECONDS_PER_BLOCK: f64 = 6.06;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
/// Wait after a finalized unlock before trusting storage reads again.
pub const RESYNC_DELAY: Duration = Duration::from_millis(2_000);
/// Polkadot. Every account is compared in this encoding.
pub const CANONICAL_SS58_PREFIX: u16 = 0;
/// Query parameter carrying the watch list.
pub const ACCOUNTS_QUERY_PARAM: &str = "accounts";

pub const DEFAULT_SETTINGS_NAME: &str = "ahops-settings.json";
pub const DEFAULT_LOGFILE_NAME: &str = "ahops-dashboard.debug.log";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, String),
    #[error("settings io error. {0}")]
    Io(#[from] io::Error),
    #[error("settings are not valid json. {0}")]
    Json(#[from] serde_json::Error),
}

/// Accepts bare hosts, assuming `wss://`, and rejects anything that is not a websocket URI.
pub fn construct_endpoint_uri(endpoint: &str) -> Result<http::Uri, ConfigError> {
    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("wss://{}", endpoint)
    };
    let uri: http::Uri = with_scheme
        .parse()
        .map_err(|e: http::uri::InvalidUri| {
            ConfigError::InvalidEndpoint(endpoint.to_string(), e.to_string())
        })?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        other => {
            return Err(ConfigError::InvalidEndpoint(
                endpoint.to_string(),
                format!("unsupported scheme {:?}", other),
            ))
        }
    }
    if uri.host().is_none() {
        return Err(ConfigError::InvalidEndpoint(
            endpoint.to_string(),
            "missing host".to_string(),
        ));
    }
    Ok(uri)
}

/// Everything the dashboard needs to know before it connects anywhere.
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardConfig {
    pub primary_endpoints: Vec<String>,
    pub secondary_endpoints: Vec<String>,
    /// When set the block clock never polls and always reports this height.
    pub block_override: Option<u32>,
    pub page_size: u32,
    /// When false a submission resolves as soon as it is seen in a block.
    pub wait_for_finalization: bool,
    /// External program that signs unlock actions.
    pub signer_program: Option<PathBuf>,
    /// Account the signer signs for. Auto-included in the watch list.
    pub signer_account: Option<String>,
    /// The directory where settings and logfiles will be created.
    pub data_dir: Option<PathBuf>,
    /// The filename of the logfile. This will be created in the `data_dir`.
    pub logfile_name: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            primary_endpoints: DEFAULT_PRIMARY_ENDPOINTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            secondary_endpoints: DEFAULT_SECONDARY_ENDPOINTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            block_override: None,
            page_size: PAGE_SIZE,
            wait_for_finalization: true,
            signer_program: None,
            signer_account: None,
            data_dir: None,
            logfile_name: DEFAULT_LOGFILE_NAME.into(),
        }
    }
}

impl DashboardConfig {
    /// Defaults with persisted overrides merged on top.
    ///
    /// The store is reconciled against the current settings version first, so overrides written by
    /// an incompatible release are dropped rather than misread.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = DashboardConfig {
            data_dir,
            ..Default::default()
        };
        let mut store = SettingsStore::open(config.get_settings_path())?;
        if store.reconcile_version()? {
            log::info!("settings version changed, persisted state cleared");
        }
        store.load_overrides()?.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Checks every endpoint parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for endpoint in self
            .primary_endpoints
            .iter()
            .chain(self.secondary_endpoints.iter())
        {
            construct_endpoint_uri(endpoint)?;
        }
        Ok(())
    }

    pub fn set_data_dir(&mut self, dir_str: String) {
        self.data_dir = Some(PathBuf::from(dir_str));
    }

    /// Build the Logging config
    pub fn get_log_config(&self) -> io::Result<Config> {
        let window_size = 3; // log0, log1, log2
        let fixed_window_roller = FixedWindowRoller::builder()
            .build("ahops-dashboard-log{}", window_size)
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))?;
        let size_limit = 5 * 1024 * 1024; // 5MB as max log file size to roll
        let size_trigger = SizeTrigger::new(size_limit);
        let compound_policy =
            CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

        Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                    .build(
                        "logfile",
                        Box::new(
                            RollingFileAppender::builder()
                                .encoder(Box::new(PatternEncoder::new("{d} {l}::{m}{n}")))
                                .build(self.get_log_path()?, Box::new(compound_policy))?,
                        ),
                    ),
            )
            .build(
                Root::builder()
                    .appender("logfile")
                    .build(LevelFilter::Debug),
            )
            .map_err(|e| Error::new(ErrorKind::Other, format!("{}", e)))
    }

    /// Data directory, created if missing. Defaults to the platform data dir.
    pub fn get_dashboard_dir(&self) -> io::Result<Box<Path>> {
        let location = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => {
                let mut location = dirs::data_dir().ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, "Couldn't determine app data directory!")
                })?;
                location.push("ahops-dashboard");
                location
            }
        };
        std::fs::create_dir_all(&location)?;

        Ok(location.into_boxed_path())
    }

    pub fn get_settings_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.join(DEFAULT_SETTINGS_NAME),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ahops-dashboard")
                .join(DEFAULT_SETTINGS_NAME),
        }
    }

    pub fn get_log_path(&self) -> io::Result<Box<Path>> {
        let mut log_path = self.get_dashboard_dir()?.into_path_buf();
        log_path.push(&self.logfile_name);

        Ok(log_path.into_boxed_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("rpc.polkadot.io", "wss://rpc.polkadot.io/")]
    #[test_case("wss://rpc.ibp.network/polkadot", "wss://rpc.ibp.network/polkadot")]
    #[test_case("ws://127.0.0.1:9944", "ws://127.0.0.1:9944/")]
    fn endpoints_normalise(input: &str, expected: &str) {
        assert_eq!(
            construct_endpoint_uri(input).unwrap().to_string(),
            expected.to_string()
        );
    }

    #[test_case("https://rpc.polkadot.io")]
    #[test_case("wss://")]
    #[test_case("not a uri")]
    fn bad_endpoints_are_rejected(input: &str) {
        assert!(construct_endpoint_uri(input).is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let config = DashboardConfig::default();
        config.validate().unwrap();
        assert_eq!(config.page_size, 500);
        assert!(config.block_override.is_none());
        assert!(config.wait_for_finalization);
    }

    #[test]
    fn load_merges_overrides_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            SettingsStore::open(dir.path().join(DEFAULT_SETTINGS_NAME)).unwrap();
        store.reconcile_version().unwrap();
        store
            .save_overrides(&SettingsOverrides {
                block_override: Some(22_000_000),
                secondary_endpoints: Some(vec!["ws://127.0.0.1:9944".to_string()]),
                ..Default::default()
            })
            .unwrap();

        let config = DashboardConfig::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.block_override, Some(22_000_000));
        assert_eq!(config.secondary_endpoints, vec!["ws://127.0.0.1:9944"]);
        assert_eq!(
            config.primary_endpoints,
            DashboardConfig::default().primary_endpoints
        );
    }
}
