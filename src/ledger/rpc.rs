//! Ethereum JSON-RPC transport for the SeersLeague contract.
//!
//! Reads go through `eth_call`, `eth_blockNumber` and `eth_getLogs`. One
//! `query_events` call issues exactly one `eth_getLogs`; callers split wide
//! ranges themselves.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::core::abi::Token;
use ethers::types::{Bytes, Filter, Log, H256, U64};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{abi, EventFilter, EventKind, LedgerEvent, LedgerReader, LoggedEvent};
use crate::models::{Address, AggregateStats, LogPosition};

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

/// Shared JSON-RPC client; one per endpoint.
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .error_for_status()
            .with_context(|| format!("{method} returned error status"))?;

        let rpc: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("failed to parse {method} response"))?;

        if let Some(err) = rpc.error {
            bail!(
                "{method} RPC error {}: {}",
                err.code.unwrap_or_default(),
                err.message.unwrap_or_else(|| "unknown".to_string())
            );
        }

        rpc.result
            .ok_or_else(|| anyhow!("no result in {method} response"))
    }

    /// `eth_call` against `latest`, returning the raw return data.
    pub async fn eth_call(&self, to: &Address, data: Bytes) -> Result<Bytes> {
        self.call("eth_call", json!([{ "to": to.to_h160(), "data": data }, "latest"]))
            .await
    }
}

fn log_position(log: &Log) -> Result<LogPosition> {
    let block = log
        .block_number
        .ok_or_else(|| anyhow!("log without block number"))?;
    let index = log
        .log_index
        .ok_or_else(|| anyhow!("log without log index"))?;
    Ok(LogPosition {
        block_number: block.as_u64(),
        log_index: abi::u256_to_u64(index, "logIndex")?,
    })
}

fn decode_log(kind: EventKind, log: &Log) -> Result<LedgerEvent> {
    let event = match kind {
        EventKind::PredictionsSubmitted => {
            LedgerEvent::PredictionsSubmitted(abi::decode_predictions_submitted(log)?)
        }
        EventKind::PredictionResult => LedgerEvent::PredictionResult(abi::decode_prediction_result(log)?),
        EventKind::MatchAdded => LedgerEvent::MatchAdded(abi::decode_match_added(log)?),
    };
    Ok(event)
}

/// [`LedgerReader`] backed by a JSON-RPC endpoint.
pub struct RpcLedger {
    rpc: JsonRpcClient,
    contract: Address,
    topic_predictions_submitted: H256,
    topic_prediction_result: H256,
    topic_match_added: H256,
}

impl RpcLedger {
    pub fn new(rpc: JsonRpcClient, contract: Address) -> Self {
        Self {
            rpc,
            contract,
            topic_predictions_submitted: abi::event_topic(abi::PREDICTIONS_SUBMITTED),
            topic_prediction_result: abi::event_topic(abi::PREDICTION_RESULT),
            topic_match_added: abi::event_topic(abi::MATCH_ADDED),
        }
    }

    fn topic_for(&self, kind: EventKind) -> H256 {
        match kind {
            EventKind::PredictionsSubmitted => self.topic_predictions_submitted,
            EventKind::PredictionResult => self.topic_prediction_result,
            EventKind::MatchAdded => self.topic_match_added,
        }
    }

    fn log_filter(&self, kind: EventKind, filter: &EventFilter, from: u64, to: u64) -> Result<Filter> {
        let base = Filter::new()
            .address(self.contract.to_h160())
            .from_block(from)
            .to_block(to)
            .topic0(self.topic_for(kind));
        match filter.user {
            None => Ok(base),
            Some(_) if !kind.has_user_topic() => bail!("{:?} cannot be filtered by user", kind),
            Some(user) => Ok(base.topic1(user.to_topic())),
        }
    }
}

#[async_trait]
impl LedgerReader for RpcLedger {
    async fn read_aggregate_stats(&self, user: &Address) -> Result<AggregateStats> {
        let data = abi::encode_call(abi::GET_USER_STATS, &[Token::Address(user.to_h160())]);
        let ret = self
            .rpc
            .eth_call(&self.contract, data)
            .await
            .context("getUserStats call failed")?;
        abi::decode_aggregate_stats(&ret)
    }

    async fn current_height(&self) -> Result<u64> {
        let height: U64 = self.rpc.call("eth_blockNumber", json!([])).await?;
        Ok(height.as_u64())
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: &EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<LoggedEvent>> {
        let log_filter = self.log_filter(kind, filter, from_height, to_height)?;
        let logs: Vec<Log> = self
            .rpc
            .call("eth_getLogs", json!([log_filter]))
            .await
            .with_context(|| format!("eth_getLogs {from_height}..={to_height}"))?;
        debug!(event = ?kind, from = from_height, to = to_height, logs = logs.len(), "fetched logs");

        let mut events = Vec::with_capacity(logs.len());
        for log in logs.iter().filter(|l| l.removed != Some(true)) {
            let position = log_position(log)?;
            let event = decode_log(kind, log)
                .with_context(|| format!("malformed {:?} log at {:?}", kind, position))?;
            if filter.matches(&event) {
                events.push(LoggedEvent { position, event });
            }
        }

        events.sort_by_key(|e| e.position);
        Ok(events)
    }
}
