//! Signing through an external program.
//!
//! The program is started once per signature. It receives one JSON object on stdin,
//! `{"signer": <account>, "action": <unlock action>}`, and answers with the signed extrinsic as
//! hex on stdout. A nonzero exit is a rejection and its stderr is the reason.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use ahops_sync::submit::{Signer, SignerError, SignerProvider, UnlockAction};
use ahopsconfig::DashboardConfig;
use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct ExternalSigner {
    program: PathBuf,
    account: String,
}

impl ExternalSigner {
    pub fn new(program: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        ExternalSigner {
            program: program.into(),
            account: account.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait::async_trait]
impl Signer for ExternalSigner {
    fn account(&self) -> Option<String> {
        Some(self.account.clone())
    }

    async fn sign(&self, action: &UnlockAction) -> Result<Vec<u8>, SignerError> {
        let unavailable =
            |e: std::io::Error| SignerError::Unavailable(format!("{}: {}", self.program.display(), e));
        let request = serde_json::json!({
            "signer": self.account,
            "action": action.to_json(),
        });
        debug!("Asking {} to sign {}", self.program.display(), request);

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(unavailable)?;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(request.to_string().as_bytes()).await {
                Ok(()) => {}
                // the program may answer without reading its input
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(unavailable(e)),
            }
        }
        let output = child.wait_with_output().await.map_err(unavailable)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(SignerError::Rejected(reason));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let signed = stdout.trim().trim_start_matches("0x");
        if signed.is_empty() {
            return Err(SignerError::Rejected("signer returned nothing".to_string()));
        }
        let extrinsic = hex::decode(signed).map_err(|e| {
            SignerError::Rejected(format!("signer returned invalid hex. {}", e))
        })?;
        info!(
            "{} signed {} for {}",
            self.program.display(),
            action.call_name(),
            self.account
        );

        Ok(extrinsic)
    }
}

/// Hands out an [`ExternalSigner`] running `program` for whatever account asks.
pub struct ExternalSignerProvider {
    program: PathBuf,
}

impl ExternalSignerProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ExternalSignerProvider {
            program: program.into(),
        }
    }
}

#[async_trait::async_trait]
impl SignerProvider for ExternalSignerProvider {
    async fn get_injector(&self, address: &str) -> Result<Arc<dyn Signer>, SignerError> {
        Ok(Arc::new(ExternalSigner::new(self.program.clone(), address)))
    }
}

/// Used when no signer program is configured. Every unlock fails as unavailable.
pub struct NoSigner;

#[async_trait::async_trait]
impl SignerProvider for NoSigner {
    async fn get_injector(&self, address: &str) -> Result<Arc<dyn Signer>, SignerError> {
        Err(SignerError::Unavailable(format!(
            "no signer program configured, can not sign for {}",
            address
        )))
    }
}

pub fn signer_from_config(config: &DashboardConfig) -> Arc<dyn SignerProvider> {
    match &config.signer_program {
        Some(program) => Arc::new(ExternalSignerProvider::new(program.clone())),
        None => Arc::new(NoSigner),
    }
}
