//! Substrate JSON-RPC binding of [`ChainClient`].

use std::collections::HashMap;

use ahops_netutils::{RpcClient, RpcConnector};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::{
    client::{ChainClient, Connector},
    error::ClientError,
    primitives::{ChainProperties, Header, RawRecord, TxEvent},
};

#[derive(Deserialize)]
struct RpcHeader {
    number: String,
}

#[derive(Deserialize)]
struct StorageChangeSet {
    changes: Vec<(String, Option<String>)>,
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ClientError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ClientError::Malformed(format!("{}: {}", value, e)))
}

fn parse_block_number(number: &str) -> Result<u32, ClientError> {
    u32::from_str_radix(number.trim_start_matches("0x"), 16)
        .map_err(|e| ClientError::Malformed(format!("block number {}: {}", number, e)))
}

// nodes report either a scalar or one entry per token, the first being the native one
fn first_or_scalar(value: Option<&Value>) -> Option<&Value> {
    match value {
        Some(Value::Array(values)) => values.first(),
        Some(Value::Null) | None => None,
        other => other,
    }
}

/// Reads `system_properties`, falling back per field to [`ChainProperties::default`].
pub fn parse_properties(properties: &Value) -> ChainProperties {
    let fallback = ChainProperties::default();
    let decimals = first_or_scalar(properties.get("tokenDecimals"))
        .and_then(Value::as_u64)
        .and_then(|decimals| u32::try_from(decimals).ok())
        .unwrap_or(fallback.decimals);
    let symbol = first_or_scalar(properties.get("tokenSymbol"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(fallback.symbol);

    ChainProperties { decimals, symbol }
}

/// Maps one `author_submitAndWatchExtrinsic` notification to a [`TxEvent`].
pub fn parse_tx_status(status: &Value) -> Option<TxEvent> {
    match status {
        Value::String(status) => match status.as_str() {
            "future" | "ready" => Some(TxEvent::Ready),
            "dropped" | "invalid" => Some(TxEvent::Rejected(status.clone())),
            _ => None,
        },
        Value::Object(status) => {
            let (name, detail) = status.iter().next()?;
            let block_hash = detail.as_str().unwrap_or_default().to_string();
            match name.as_str() {
                "broadcast" => Some(TxEvent::Broadcast),
                "inBlock" => Some(TxEvent::InBlock {
                    block_hash,
                    dispatch_error: None,
                }),
                "finalized" => Some(TxEvent::Finalized {
                    block_hash,
                    dispatch_error: None,
                }),
                "usurped" | "finalityTimeout" | "retracted" => {
                    Some(TxEvent::Rejected(format!("{} {}", name, block_hash)))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[async_trait::async_trait]
impl ChainClient for RpcClient {
    async fn header(&self) -> Result<Header, ClientError> {
        let header: RpcHeader = self.request("chain_getHeader", json!([])).await?;

        Ok(Header {
            number: parse_block_number(&header.number)?,
        })
    }

    async fn storage_page(
        &self,
        prefix_hex: &str,
        page_size: u32,
        start_key: Option<String>,
    ) -> Result<Vec<RawRecord>, ClientError> {
        let keys: Vec<String> = self
            .request(
                "state_getKeysPaged",
                json!([prefix_hex, page_size, start_key]),
            )
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let change_sets: Vec<StorageChangeSet> = self
            .request("state_queryStorageAt", json!([keys]))
            .await?;
        let mut values: HashMap<String, Option<String>> = change_sets
            .into_iter()
            .flat_map(|change_set| change_set.changes)
            .collect();

        keys.into_iter()
            .map(|key| {
                let value = match values.remove(&key).flatten() {
                    Some(value) => Some(decode_hex(&value)?),
                    None => None,
                };
                Ok(RawRecord {
                    key: decode_hex(&key)?,
                    value,
                })
            })
            .collect()
    }

    async fn properties(&self) -> Result<ChainProperties, ClientError> {
        let properties: Value = self.request("system_properties", json!([])).await?;

        Ok(parse_properties(&properties))
    }

    async fn submit(&self, extrinsic: &[u8]) -> Result<UnboundedReceiver<TxEvent>, ClientError> {
        let mut subscription = self
            .subscribe(
                "author_submitAndWatchExtrinsic",
                json!([format!("0x{}", hex::encode(extrinsic))]),
                "author_unwatchExtrinsic",
            )
            .await?;
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(status) = subscription.next().await {
                let Some(event) = parse_tx_status(&status) else {
                    tracing::debug!("Ignoring transaction status {}", status);
                    continue;
                };
                let terminal = matches!(event, TxEvent::Finalized { .. } | TxEvent::Rejected(_));
                if event_sender.send(event).is_err() || terminal {
                    break;
                }
            }
        });

        Ok(event_receiver)
    }

    fn close(&self) {
        RpcClient::close(self);
    }
}

/// Opens websocket clients and probes them with `system_chain` before handing them out.
#[derive(Clone, Debug, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    type Client = RpcClient;

    async fn connect(&self, endpoint: &str) -> Result<RpcClient, ClientError> {
        let uri = ahopsconfig::construct_endpoint_uri(endpoint)
            .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
        let client = RpcConnector::new(uri).connect().await?;
        match client.request::<String>("system_chain", json!([])).await {
            Ok(chain) => {
                tracing::info!("{} is serving {}", client.endpoint(), chain);
                Ok(client)
            }
            Err(e) => {
                client.close();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn block_numbers_are_hex() {
        assert_eq!(parse_block_number("0x1a2b3c").unwrap(), 0x1a2b3c);
        assert!(parse_block_number("0xnothex").is_err());
    }

    #[test_case(json!({"tokenDecimals": 10, "tokenSymbol": "DOT"}), 10, "DOT" ; "scalar")]
    #[test_case(json!({"tokenDecimals": [12, 18], "tokenSymbol": ["KSM", "USDT"]}), 12, "KSM" ; "array")]
    #[test_case(json!({}), 10, "DOT" ; "missing")]
    #[test_case(json!({"tokenDecimals": null, "tokenSymbol": []}), 10, "DOT" ; "empty")]
    fn properties_fall_back_per_field(properties: Value, decimals: u32, symbol: &str) {
        assert_eq!(
            parse_properties(&properties),
            ChainProperties {
                decimals,
                symbol: symbol.to_string()
            }
        );
    }

    #[test]
    fn transaction_statuses() {
        assert_eq!(parse_tx_status(&json!("ready")), Some(TxEvent::Ready));
        assert_eq!(
            parse_tx_status(&json!({"broadcast": ["peer"]})),
            Some(TxEvent::Broadcast)
        );
        assert_eq!(
            parse_tx_status(&json!({"inBlock": "0xabc"})),
            Some(TxEvent::InBlock {
                block_hash: "0xabc".to_string(),
                dispatch_error: None
            })
        );
        assert_eq!(
            parse_tx_status(&json!({"finalized": "0xabc"})),
            Some(TxEvent::Finalized {
                block_hash: "0xabc".to_string(),
                dispatch_error: None
            })
        );
        assert_eq!(
            parse_tx_status(&json!("invalid")),
            Some(TxEvent::Rejected("invalid".to_string()))
        );
        assert!(matches!(
            parse_tx_status(&json!({"usurped": "0xdef"})),
            Some(TxEvent::Rejected(_))
        ));
        assert_eq!(parse_tx_status(&json!(42)), None);
    }
}
