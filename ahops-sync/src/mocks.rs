//! In-memory stand-ins for chain nodes and signers.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use ahops_netutils::RpcError;
use tokio::sync::{mpsc, Notify};

use crate::address::AccountId32;
use crate::client::{ChainClient, Connector};
use crate::error::ClientError;
use crate::primitives::{ChainProperties, EntryKind, Header, RawRecord, TxEvent};
use crate::schema::StorageMap;
use crate::submit::{Signer, SignerError, SignerProvider, UnlockAction};

/// Deterministic account for tests
pub fn account(n: u8) -> AccountId32 {
    let mut bytes = [n; 32];
    bytes[0] = 0xee;
    AccountId32(bytes)
}

/// Storage key as the chain lays it out, with zeroed hashes.
pub fn storage_key(kind: EntryKind, unlock_block: u32, para_id: u32, account: &AccountId32) -> Vec<u8> {
    let mut key = StorageMap::new(kind).prefix().to_vec();
    key.extend_from_slice(&[0; 8]);
    key.extend_from_slice(&unlock_block.to_le_bytes());
    key.extend_from_slice(&[0; 8]);
    key.extend_from_slice(&para_id.to_le_bytes());
    key.extend_from_slice(&[0; 8]);
    key.extend_from_slice(&account.0);
    key
}

/// Storage value of `kind` holding `balance`. Contributions use `account(0)` as fund pot.
pub fn storage_value(kind: EntryKind, balance: u128) -> Vec<u8> {
    let mut value = Vec::new();
    if kind == EntryKind::Contribution {
        value.extend_from_slice(&account(0).0);
    }
    value.extend_from_slice(&balance.to_le_bytes());
    value
}

#[derive(Debug, Default)]
struct MockChainState {
    storage: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    header: Option<u32>,
    header_fails: bool,
    page_requests: usize,
    fail_on_page: Option<usize>,
    page_gate: Option<(usize, Arc<Notify>)>,
    properties: Option<ChainProperties>,
    tx_events: Vec<TxEvent>,
    submissions: Vec<Vec<u8>>,
    close_count: usize,
}

/// A chain node backed by a sorted map. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChain {
    fn lock(&self) -> MutexGuard<'_, MockChainState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts one decodable record.
    pub fn insert_entry(
        &self,
        kind: EntryKind,
        unlock_block: u32,
        para_id: u32,
        account: AccountId32,
        balance: u128,
    ) {
        self.lock().storage.insert(
            storage_key(kind, unlock_block, para_id, &account),
            Some(storage_value(kind, balance)),
        );
    }

    /// Inserts `count` distinct records of `kind`.
    pub fn fill(&self, kind: EntryKind, count: u32) {
        for i in 0..count {
            let mut bytes = [1u8; 32];
            bytes[..4].copy_from_slice(&i.to_be_bytes());
            self.insert_entry(
                kind,
                1_000 + i,
                2_000 + i % 7,
                AccountId32(bytes),
                u128::from(i) * 10_000_000_000,
            );
        }
    }

    /// Lists a key whose value is gone by the time it is read.
    pub fn insert_vanished(&self, kind: EntryKind, unlock_block: u32, para_id: u32, account: AccountId32) {
        self.lock()
            .storage
            .insert(storage_key(kind, unlock_block, para_id, &account), None);
    }

    /// Inserts a record whose value does not decode.
    pub fn insert_undecodable(
        &self,
        kind: EntryKind,
        unlock_block: u32,
        para_id: u32,
        account: AccountId32,
    ) {
        self.lock().storage.insert(
            storage_key(kind, unlock_block, para_id, &account),
            Some(vec![1, 2, 3]),
        );
    }

    /// Removes every record.
    pub fn clear_storage(&self) {
        self.lock().storage.clear();
    }

    /// Number of storage pages served or refused so far.
    pub fn page_requests(&self) -> usize {
        self.lock().page_requests
    }

    /// The `page`th storage page request (1 based) fails.
    pub fn fail_on_page(&self, page: usize) {
        self.lock().fail_on_page = Some(page);
    }

    /// The `page`th storage page request (1 based) is held until `gate` is notified.
    pub fn gate_page(&self, page: usize, gate: Arc<Notify>) {
        self.lock().page_gate = Some((page, gate));
    }

    /// Sets the latest header.
    pub fn set_header(&self, number: u32) {
        self.lock().header = Some(number);
    }

    /// Makes header reads fail while set.
    pub fn fail_header(&self, fails: bool) {
        self.lock().header_fails = fails;
    }

    /// Sets what `system_properties` reports. Unset means defaults.
    pub fn set_properties(&self, properties: ChainProperties) {
        self.lock().properties = Some(properties);
    }

    /// Status events replayed for the next submission.
    pub fn script_tx(&self, events: Vec<TxEvent>) {
        self.lock().tx_events = events;
    }

    /// Every extrinsic submitted so far.
    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.lock().submissions.clone()
    }

    /// How often a client was closed.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }
}

fn mock_failure(what: &str) -> ClientError {
    ClientError::Rpc(RpcError::Server {
        code: -32000,
        message: format!("mock {} failure", what),
    })
}

#[async_trait::async_trait]
impl ChainClient for MockChain {
    async fn header(&self) -> Result<Header, ClientError> {
        let state = self.lock();
        if state.header_fails {
            return Err(mock_failure("header"));
        }
        state
            .header
            .map(|number| Header { number })
            .ok_or_else(|| mock_failure("header"))
    }

    async fn storage_page(
        &self,
        prefix_hex: &str,
        page_size: u32,
        start_key: Option<String>,
    ) -> Result<Vec<RawRecord>, ClientError> {
        let gate = {
            let mut state = self.lock();
            state.page_requests += 1;
            if state.fail_on_page == Some(state.page_requests) {
                return Err(mock_failure("page"));
            }
            match &state.page_gate {
                Some((page, gate)) if *page == state.page_requests => Some(gate.clone()),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = self.lock();
        let decode = |value: &str| {
            hex::decode(value.trim_start_matches("0x"))
                .map_err(|e| ClientError::Malformed(e.to_string()))
        };
        let prefix = decode(prefix_hex)?;
        let lower = match start_key {
            Some(start_key) => Bound::Excluded(decode(&start_key)?),
            None => Bound::Included(prefix.clone()),
        };

        Ok(state
            .storage
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(&prefix))
            .take(page_size as usize)
            .map(|(key, value)| RawRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn properties(&self) -> Result<ChainProperties, ClientError> {
        Ok(self.lock().properties.clone().unwrap_or_default())
    }

    async fn submit(
        &self,
        extrinsic: &[u8],
    ) -> Result<mpsc::UnboundedReceiver<TxEvent>, ClientError> {
        let mut state = self.lock();
        state.submissions.push(extrinsic.to_vec());
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        for event in std::mem::take(&mut state.tx_events) {
            let _ = event_sender.send(event);
        }
        Ok(event_receiver)
    }

    fn close(&self) {
        self.lock().close_count += 1;
    }
}

/// Connects to a [`MockChain`] under any endpoint name, except those told to fail.
#[derive(Clone, Debug)]
pub struct MockConnector {
    chain: MockChain,
    failing: Vec<String>,
    gate: Option<Arc<Notify>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    /// Connector handing out `chain`
    pub fn new(chain: MockChain) -> Self {
        MockConnector {
            chain,
            failing: Vec::new(),
            gate: None,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connects to these endpoints fail
    pub fn failing(mut self, endpoints: &[&str]) -> Self {
        self.failing = endpoints.iter().map(|endpoint| endpoint.to_string()).collect();
        self
    }

    /// Every connect waits for a notification on `gate`
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Endpoints tried so far, in order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Client = MockChain;

    async fn connect(&self, endpoint: &str) -> Result<MockChain, ClientError> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(endpoint.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.iter().any(|failing| failing == endpoint) {
            return Err(ClientError::Rpc(RpcError::Connect(
                endpoint.to_string(),
                "refused".to_string(),
            )));
        }
        Ok(self.chain.clone())
    }
}

#[derive(Debug, Default)]
struct MockSignerState {
    sign_count: usize,
}

/// Signs anything with a fixed payload. Clones share their call counter.
#[derive(Clone, Debug, Default)]
pub struct MockSigner {
    account: Option<String>,
    gate: Option<Arc<Notify>>,
    rejects: bool,
    unavailable: bool,
    state: Arc<Mutex<MockSignerState>>,
}

impl MockSigner {
    /// A signer that signs immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `account` as its own
    pub fn for_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    /// Every signature waits for a notification on `gate`
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Declines every request
    pub fn rejecting(mut self) -> Self {
        self.rejects = true;
        self
    }

    /// Hands out no signer at all
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Signatures requested so far
    pub fn sign_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sign_count
    }
}

#[async_trait::async_trait]
impl Signer for MockSigner {
    fn account(&self) -> Option<String> {
        self.account.clone()
    }

    async fn sign(&self, action: &UnlockAction) -> Result<Vec<u8>, SignerError> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sign_count += 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.rejects {
            return Err(SignerError::Rejected("user cancelled".to_string()));
        }
        Ok(action.to_json().to_string().into_bytes())
    }
}

#[async_trait::async_trait]
impl SignerProvider for MockSigner {
    async fn get_injector(&self, address: &str) -> Result<Arc<dyn Signer>, SignerError> {
        if self.unavailable {
            return Err(SignerError::Unavailable(format!("no signer for {}", address)));
        }
        Ok(Arc::new(self.clone()))
    }
}
