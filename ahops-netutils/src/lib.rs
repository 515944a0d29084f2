//! Ahops-Netutils
//!
//! This crate provides the `RpcConnector` struct,
//! used to open a JSON-RPC websocket to a Substrate node

#![warn(missing_docs)]
use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use http::Uri;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Errors from the websocket transport or the remote node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The websocket handshake failed.
    #[error("could not connect to {0}: {1}")]
    Connect(String, String),
    /// The socket task has gone away.
    #[error("connection closed")]
    Closed,
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Server {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },
    /// The node answered with something that does not have the expected shape.
    #[error("malformed response. {0}")]
    Malformed(String),
}

/// Result alias for the transport.
pub type RpcResult<T> = Result<T, RpcError>;

/// The connector, containing the URI to connect to.
#[derive(Clone, Debug)]
pub struct RpcConnector {
    uri: Uri,
}

impl RpcConnector {
    /// Takes a URI, and wraps in a RpcConnector
    pub fn new(uri: Uri) -> Self {
        Self { uri }
    }

    /// The URI to connect to
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Open the websocket and spawn the task that owns it. The returned client is a cheap handle;
    /// the socket is closed once every handle is dropped or [`RpcClient::close`] is called.
    pub async fn connect(&self) -> RpcResult<RpcClient> {
        let endpoint = self.uri.to_string();
        let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .map_err(|e| RpcError::Connect(endpoint.clone(), e.to_string()))?;

        let (outgoing_sender, outgoing_receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(ws_stream, outgoing_receiver, endpoint.clone()));

        Ok(RpcClient {
            endpoint,
            outgoing_sender,
        })
    }
}

/// Handle to a running socket task.
#[derive(Clone, Debug)]
pub struct RpcClient {
    endpoint: String,
    outgoing_sender: mpsc::UnboundedSender<Outgoing>,
}

impl RpcClient {
    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one request and waits for its response.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<T> {
        let (reply, receiver) = oneshot::channel();
        self.outgoing_sender
            .send(Outgoing::Call {
                method: method.to_string(),
                params,
                reply,
            })
            .map_err(|_| RpcError::Closed)?;
        let value = receiver.await.map_err(|_| RpcError::Closed)??;

        serde_json::from_value(value).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// Opens a subscription. Notifications are delivered in the order the node sends them.
    pub async fn subscribe(
        &self,
        method: &str,
        params: Value,
        unsubscribe_method: &str,
    ) -> RpcResult<Subscription> {
        let (reply, receiver) = oneshot::channel();
        let (notification_sender, notifications) = mpsc::unbounded_channel();
        self.outgoing_sender
            .send(Outgoing::Subscribe {
                method: method.to_string(),
                params,
                notifications: notification_sender,
                reply,
            })
            .map_err(|_| RpcError::Closed)?;
        let id = receiver.await.map_err(|_| RpcError::Closed)??;

        Ok(Subscription {
            id,
            notifications,
            unsubscribe_method: unsubscribe_method.to_string(),
            outgoing_sender: self.outgoing_sender.clone(),
        })
    }

    /// Closes the socket for every handle.
    pub fn close(&self) {
        let _ = self.outgoing_sender.send(Outgoing::Close);
    }

    /// Returns true once the socket task has stopped.
    pub fn is_closed(&self) -> bool {
        self.outgoing_sender.is_closed()
    }
}

/// Stream of notifications for one subscription. Unsubscribes when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    notifications: mpsc::UnboundedReceiver<Value>,
    unsubscribe_method: String,
    outgoing_sender: mpsc::UnboundedSender<Outgoing>,
}

impl Subscription {
    /// Subscription id assigned by the node.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next notification payload, `None` once the socket is gone.
    pub async fn next(&mut self) -> Option<Value> {
        self.notifications.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let (reply, _) = oneshot::channel();
        let _ = self.outgoing_sender.send(Outgoing::Call {
            method: self.unsubscribe_method.clone(),
            params: json!([self.id]),
            reply,
        });
        let _ = self.outgoing_sender.send(Outgoing::Unsubscribed(self.id.clone()));
    }
}

#[derive(Debug)]
enum Outgoing {
    Call {
        method: String,
        params: Value,
        reply: oneshot::Sender<RpcResult<Value>>,
    },
    Subscribe {
        method: String,
        params: Value,
        notifications: mpsc::UnboundedSender<Value>,
        reply: oneshot::Sender<RpcResult<String>>,
    },
    Unsubscribed(String),
    Close,
}

enum Pending {
    Call(oneshot::Sender<RpcResult<Value>>),
    Subscribe(oneshot::Sender<RpcResult<String>>, mpsc::UnboundedSender<Value>),
}

// matches responses to requests by id and notifications to subscriptions by subscription id
#[derive(Default)]
struct Router {
    next_id: u64,
    pending: HashMap<u64, Pending>,
    subscriptions: HashMap<String, mpsc::UnboundedSender<Value>>,
}

impl Router {
    // registers the outgoing message and returns the serialized request
    fn register(&mut self, outgoing: Outgoing) -> Option<String> {
        let (method, params, pending) = match outgoing {
            Outgoing::Call {
                method,
                params,
                reply,
            } => (method, params, Pending::Call(reply)),
            Outgoing::Subscribe {
                method,
                params,
                notifications,
                reply,
            } => (method, params, Pending::Subscribe(reply, notifications)),
            Outgoing::Unsubscribed(id) => {
                self.subscriptions.remove(&id);
                return None;
            }
            Outgoing::Close => return None,
        };
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert(id, pending);

        Some(
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            })
            .to_string(),
        )
    }

    fn route(&mut self, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping unparseable message. {}", e);
                return;
            }
        };

        if let Some(id) = message.get("id").and_then(Value::as_u64) {
            let Some(pending) = self.pending.remove(&id) else {
                tracing::debug!("Response for unknown request id {}", id);
                return;
            };
            let result = match message.get("error") {
                Some(error) => Err(RpcError::Server {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            match pending {
                Pending::Call(reply) => {
                    let _ = reply.send(result);
                }
                Pending::Subscribe(reply, notifications) => {
                    let subscription_id = result.and_then(|value| match value {
                        Value::String(id) => Ok(id),
                        Value::Number(id) => Ok(id.to_string()),
                        other => Err(RpcError::Malformed(format!(
                            "subscription id {}",
                            other
                        ))),
                    });
                    if let Ok(id) = &subscription_id {
                        self.subscriptions.insert(id.clone(), notifications);
                    }
                    let _ = reply.send(subscription_id);
                }
            }
        } else if let Some(params) = message.get("params") {
            let subscription_id = match params.get("subscription") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => return,
            };
            let result = params.get("result").cloned().unwrap_or(Value::Null);
            if let Some(sender) = self.subscriptions.get(&subscription_id) {
                if sender.send(result).is_err() {
                    self.subscriptions.remove(&subscription_id);
                }
            }
        }
    }

    fn close_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            match pending {
                Pending::Call(reply) => {
                    let _ = reply.send(Err(RpcError::Closed));
                }
                Pending::Subscribe(reply, _) => {
                    let _ = reply.send(Err(RpcError::Closed));
                }
            }
        }
        self.subscriptions.clear();
    }
}

async fn run_socket<S>(
    ws_stream: S,
    mut outgoing_receiver: mpsc::UnboundedReceiver<Outgoing>,
    endpoint: String,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    let (mut write, mut read) = ws_stream.split();
    let mut router = Router::default();

    loop {
        tokio::select! {
            outgoing = outgoing_receiver.recv() => {
                let outgoing = match outgoing {
                    None | Some(Outgoing::Close) => break,
                    Some(outgoing) => outgoing,
                };
                if let Some(request) = router.register(outgoing) {
                    if let Err(e) = write.send(Message::text(request)).await {
                        tracing::warn!("Failed to write to {}. {}", endpoint, e);
                        break;
                    }
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => router.route(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("{} closed the connection", endpoint);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Websocket error from {}. {}", endpoint, e);
                    break;
                }
            }
        }
    }

    router.close_all();
    let _ = write.close().await;
}
