//! Supervises the connection to one chain: endpoint fallback, status reporting and teardown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use ahops_status::connection_status::ConnectionStatus;
use tokio::sync::watch;

use crate::{
    client::{ChainClient, Connector},
    error::ClientError,
};

/// Why no endpoint could be adopted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The endpoint list was empty
    #[error("no endpoints configured")]
    NoEndpoints,
    /// Every endpoint failed; carries the last failure
    #[error("all endpoints failed. last error: {0}")]
    AllEndpointsFailed(ClientError),
    /// [`ChainConnection::teardown`] ran while connecting
    #[error("connection torn down")]
    TornDown,
}

/// Shared flag telling background work whether its owner is still interested.
#[derive(Clone, Debug)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Liveness(Arc::new(AtomicBool::new(true)))
    }

    /// False once the owning connection has been torn down.
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One logical connection to a chain. Holds at most one adopted client.
pub struct ChainConnection<C> {
    name: String,
    status_sender: watch::Sender<ConnectionStatus>,
    client: Mutex<Option<C>>,
    liveness: Liveness,
}

impl<C: ChainClient> ChainConnection<C> {
    /// A connection that has not been attempted yet.
    pub fn new(name: impl Into<String>) -> Self {
        let (status_sender, _) = watch::channel(ConnectionStatus::NotConnected);
        ChainConnection {
            name: name.into(),
            status_sender,
            client: Mutex::new(None),
            liveness: Liveness::new(),
        }
    }

    /// A connection that adopted `client` already. Used where the client is built elsewhere.
    pub fn with_client(name: impl Into<String>, endpoint: &str, client: C) -> Self {
        let connection = Self::new(name);
        *connection.lock_client() = Some(client);
        connection.set_status(ConnectionStatus::Connected {
            endpoint: endpoint.to_string(),
        });
        connection
    }

    /// Label used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<C>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, status: ConnectionStatus) {
        tracing::debug!("{} connection: {}", self.name, status);
        self.status_sender.send_replace(status);
    }

    /// Tries `endpoints` in order and adopts the first that answers. Ends in
    /// [`ConnectionStatus::Error`] with the last failure when none does.
    pub async fn connect<K>(&self, connector: &K, endpoints: &[String]) -> Result<(), ConnectionError>
    where
        K: Connector<Client = C>,
    {
        if endpoints.is_empty() {
            self.set_status(ConnectionStatus::Error(ConnectionError::NoEndpoints.to_string()));
            return Err(ConnectionError::NoEndpoints);
        }
        self.set_status(ConnectionStatus::Connecting);

        let mut last_error = ClientError::NotConnected;
        for endpoint in endpoints {
            if !self.liveness.is_alive() {
                return Err(ConnectionError::TornDown);
            }
            match connector.connect(endpoint).await {
                Ok(client) => {
                    if !self.liveness.is_alive() {
                        client.close();
                        return Err(ConnectionError::TornDown);
                    }
                    if let Some(previous) = self.lock_client().replace(client) {
                        previous.close();
                    }
                    tracing::info!("{} connected to {}", self.name, endpoint);
                    self.set_status(ConnectionStatus::Connected {
                        endpoint: endpoint.clone(),
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{} failed to connect to {}. {}", self.name, endpoint, e);
                    last_error = e;
                }
            }
        }

        self.set_status(ConnectionStatus::Error(last_error.to_string()));
        Err(ConnectionError::AllEndpointsFailed(last_error))
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.status_sender.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_sender.subscribe()
    }

    /// The adopted client.
    pub fn client(&self) -> Result<C, ClientError> {
        if !self.liveness.is_alive() {
            return Err(ClientError::NotConnected);
        }
        self.lock_client().clone().ok_or(ClientError::NotConnected)
    }

    /// Flag shared with background work started on behalf of this connection.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Closes the client and stops every task holding this connection's [`Liveness`].
    /// In-flight connects close whatever they open.
    pub fn teardown(&self) {
        self.liveness.kill();
        if let Some(client) = self.lock_client().take() {
            client.close();
        }
        self.set_status(ConnectionStatus::NotConnected);
        tracing::info!("{} connection torn down", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::mocks::{MockChain, MockConnector};

    fn endpoints(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn falls_back_to_the_next_endpoint() {
        let connector = MockConnector::new(MockChain::default()).failing(&["wss://a"]);
        let connection = ChainConnection::new("primary");

        connection
            .connect(&connector, &endpoints(&["wss://a", "wss://b"]))
            .await
            .unwrap();

        assert_eq!(
            connection.status(),
            ConnectionStatus::Connected {
                endpoint: "wss://b".to_string()
            }
        );
        assert_eq!(connector.attempts(), endpoints(&["wss://a", "wss://b"]));
        assert!(connection.client().is_ok());
    }

    #[tokio::test]
    async fn reports_last_error_when_every_endpoint_fails() {
        let connector = MockConnector::new(MockChain::default()).failing(&["wss://a", "wss://b"]);
        let connection = ChainConnection::new("primary");

        let result = connection
            .connect(&connector, &endpoints(&["wss://a", "wss://b"]))
            .await;

        assert!(matches!(result, Err(ConnectionError::AllEndpointsFailed(_))));
        assert!(connection.status().is_error());
        assert_eq!(connection.client().err(), Some(ClientError::NotConnected));
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_an_error() {
        let connector = MockConnector::new(MockChain::default());
        let connection = ChainConnection::new("primary");

        assert_eq!(
            connection.connect(&connector, &[]).await,
            Err(ConnectionError::NoEndpoints)
        );
        assert!(connection.status().is_error());
    }

    #[tokio::test]
    async fn teardown_during_connect_closes_the_late_client() {
        let chain = MockChain::default();
        let gate = Arc::new(Notify::new());
        let connector = MockConnector::new(chain.clone()).gated(gate.clone());
        let connection = Arc::new(ChainConnection::new("primary"));

        let connecting = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .connect(&connector, &endpoints(&["wss://a"]))
                    .await
            })
        };
        tokio::task::yield_now().await;
        connection.teardown();
        gate.notify_one();

        assert_eq!(connecting.await.unwrap(), Err(ConnectionError::TornDown));
        assert_eq!(chain.close_count(), 1);
        assert_eq!(connection.status(), ConnectionStatus::NotConnected);
        assert!(!connection.liveness().is_alive());
    }
}
