#![forbid(unsafe_code)]
//! The AhOps unlock dashboard: three projections over the AhOps storage maps, a watch list, and
//! unlock submission, driven through [`commands`].

use std::io::{self, ErrorKind};

use ahopsconfig::DashboardConfig;

pub mod commands;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod signer;

pub use dashboard::{Dashboard, Projection};

/// Routes `log` output, and with it the engine's `tracing` events, to the rolling logfile.
pub fn init_logging(config: &DashboardConfig) -> io::Result<()> {
    let log_config = config.get_log_config()?;
    log4rs::init_config(log_config).map_err(|e| io::Error::new(ErrorKind::Other, e))?;

    Ok(())
}
