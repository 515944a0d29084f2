//! Module for handling all connections to the chain nodes

use std::sync::Arc;

use tokio::sync::{
    mpsc::{UnboundedReceiver, UnboundedSender},
    oneshot,
};

use crate::{
    connection::ChainConnection,
    error::ClientError,
    primitives::{ChainProperties, Header, RawRecord, TxEvent},
};

pub mod fetch;
pub mod rpc;

/// Typed reads and writes against one chain node.
///
/// Implemented for [`ahops_netutils::RpcClient`] and, under `test-features`, for the in-memory mock chain.
#[async_trait::async_trait]
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// Latest header.
    async fn header(&self) -> Result<Header, ClientError>;

    /// Up to `page_size` records under `prefix_hex`, strictly after `start_key`, in key order.
    /// Records whose value vanished between listing and reading come back with `value: None`.
    async fn storage_page(
        &self,
        prefix_hex: &str,
        page_size: u32,
        start_key: Option<String>,
    ) -> Result<Vec<RawRecord>, ClientError>;

    /// Token decimals and symbol.
    async fn properties(&self) -> Result<ChainProperties, ClientError>;

    /// Submits a signed extrinsic and streams its status. The stream ends after a terminal event.
    async fn submit(&self, extrinsic: &[u8]) -> Result<UnboundedReceiver<TxEvent>, ClientError>;

    /// Releases the underlying transport.
    fn close(&self) {}
}

/// Opens clients. One connector is shared by every attempt against every endpoint of a chain.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Client produced on success
    type Client: ChainClient;

    /// Connects and waits until the node answers.
    async fn connect(&self, endpoint: &str) -> Result<Self::Client, ClientError>;
}

/// Fetch requests are created and sent to the [`crate::client::fetch::fetch`] task when a read from the primary chain is required.
///
/// Each variant includes a [`tokio::sync::oneshot::Sender`] for returning the fetched data to the requester.
#[derive(Debug)]
pub enum FetchRequest {
    /// Gets the latest header.
    Header(oneshot::Sender<Result<Header, ClientError>>),
    /// Gets one page of raw records: map prefix, page size and the key to continue after.
    StoragePage(
        oneshot::Sender<Result<Vec<RawRecord>, ClientError>>,
        String,
        u32,
        Option<String>,
    ),
    /// Gets the chain properties.
    Properties(oneshot::Sender<Result<ChainProperties, ClientError>>),
}

/// Spawns the fetch task for `connection` and returns the sender that feeds it.
/// The task stops once every clone of the sender is dropped.
pub fn spawn_fetcher<C: ChainClient>(
    connection: Arc<ChainConnection<C>>,
) -> UnboundedSender<FetchRequest> {
    let (fetch_request_sender, fetch_request_receiver) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(fetch::fetch(fetch_request_receiver, connection));

    fetch_request_sender
}

/// Gets the latest header of the chain.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently, connected via the `fetch_request` channel.
pub async fn get_header(
    fetch_request_sender: UnboundedSender<FetchRequest>,
) -> Result<Header, ClientError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::Header(sender))
        .map_err(|_| ClientError::FetcherStopped)?;

    receiver.await.map_err(|_| ClientError::FetcherStopped)?
}

/// Gets one page of raw records under a storage map prefix.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently, connected via the `fetch_request` channel.
pub async fn get_storage_page(
    fetch_request_sender: UnboundedSender<FetchRequest>,
    prefix_hex: String,
    page_size: u32,
    start_key: Option<String>,
) -> Result<Vec<RawRecord>, ClientError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::StoragePage(
            sender, prefix_hex, page_size, start_key,
        ))
        .map_err(|_| ClientError::FetcherStopped)?;

    receiver.await.map_err(|_| ClientError::FetcherStopped)?
}

/// Gets the token decimals and symbol of the chain.
///
/// Requires [`crate::client::fetch::fetch`] to be running concurrently, connected via the `fetch_request` channel.
pub async fn get_properties(
    fetch_request_sender: UnboundedSender<FetchRequest>,
) -> Result<ChainProperties, ClientError> {
    let (sender, receiver) = oneshot::channel();
    fetch_request_sender
        .send(FetchRequest::Properties(sender))
        .map_err(|_| ClientError::FetcherStopped)?;

    receiver.await.map_err(|_| ClientError::FetcherStopped)?
}
