//! Queue and prioritise fetch requests to fetch data from the primary chain

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    client::{ChainClient, FetchRequest},
    connection::ChainConnection,
};

/// Receives [`self::FetchRequest`]'s via an [`tokio::sync::mpsc::UnboundedReceiver`] for queueing,
/// prioritisation and fetching from the node.
/// Returns the data specified in the [`self::FetchRequest`] variant via the provided [`tokio::sync::oneshot::Sender`].
///
/// The client is looked up on the connection for every request, so a reconnect in between is picked
/// up and a torn down connection answers with [`crate::error::ClientError::NotConnected`].
pub async fn fetch<C: ChainClient>(
    mut fetch_request_receiver: UnboundedReceiver<FetchRequest>,
    connection: Arc<ChainConnection<C>>,
) {
    let mut fetch_request_queue: Vec<FetchRequest> = Vec::new();

    loop {
        // returns here once every sender is dropped and the queue is drained
        if receive_fetch_requests(&mut fetch_request_receiver, &mut fetch_request_queue).await {
            tracing::debug!("Fetch request channel closed. Stopping fetcher.");
            return;
        }

        if let Some(request) = select_fetch_request(&mut fetch_request_queue) {
            fetch_from_node(&connection, request).await;
        }
    }
}

// receives fetch requests and populates the fetch request queue
//
// returns `true` if the fetch request channel is closed and all fetch requests have been completed
async fn receive_fetch_requests(
    receiver: &mut UnboundedReceiver<FetchRequest>,
    fetch_request_queue: &mut Vec<FetchRequest>,
) -> bool {
    // if there are no fetch requests to process, sleep until the next fetch request is received
    // or channel is closed
    if fetch_request_queue.is_empty() {
        match receiver.recv().await {
            Some(fetch_request) => fetch_request_queue.push(fetch_request),
            None => return true,
        }
    }
    loop {
        match receiver.try_recv() {
            Ok(fetch_request) => fetch_request_queue.push(fetch_request),
            Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                if fetch_request_queue.is_empty() {
                    return true;
                } else {
                    break;
                }
            }
        }
    }

    false
}

// headers and properties are cheap and gate what the user sees, so they jump ahead of storage pages
fn select_fetch_request(fetch_request_queue: &mut Vec<FetchRequest>) -> Option<FetchRequest> {
    let position = fetch_request_queue
        .iter()
        .position(|request| !matches!(request, FetchRequest::StoragePage(..)))
        .unwrap_or(0);
    if position < fetch_request_queue.len() {
        Some(fetch_request_queue.remove(position))
    } else {
        None
    }
}

async fn fetch_from_node<C: ChainClient>(
    connection: &ChainConnection<C>,
    fetch_request: FetchRequest,
) {
    let client = connection.client();
    match fetch_request {
        FetchRequest::Header(sender) => {
            tracing::debug!("Fetching header from {}.", connection.name());
            let header = match client {
                Ok(client) => client.header().await,
                Err(e) => Err(e),
            };
            let _ = sender.send(header);
        }
        FetchRequest::StoragePage(sender, prefix_hex, page_size, start_key) => {
            tracing::debug!(
                "Fetching storage page. prefix {} after {:?}",
                &prefix_hex,
                &start_key
            );
            let page = match client {
                Ok(client) => client.storage_page(&prefix_hex, page_size, start_key).await,
                Err(e) => Err(e),
            };
            let _ = sender.send(page);
        }
        FetchRequest::Properties(sender) => {
            tracing::debug!("Fetching chain properties from {}.", connection.name());
            let properties = match client {
                Ok(client) => client.properties().await,
                Err(e) => Err(e),
            };
            let _ = sender.send(properties);
        }
    }
}
