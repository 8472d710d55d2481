//! JSON-RPC 2.0 client for one ledger node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ballotguard_types::{
    Ballot, CandidateTally, ChainInfo, ElectionResults, LedgerNodeDescriptor, LedgerReceipt,
    LedgerVote, NodeId, Quantity, ReceiptStatus, Selection, Timestamp,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{LedgerNode, LedgerNodeError};

/// JSON-RPC "method not found"; the contract gateway has no such entry point.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Contract-level rejection of an already recorded ballot id.
pub const DUPLICATE_BALLOT: i64 = 4090;

/// Timeouts applied to every request a node client sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpcTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for RpcTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            connect: Duration::from_secs(5),
        }
    }
}

/// HTTP client for one ledger node and its voting contract gateway.
pub struct RpcLedgerNode {
    descriptor: LedgerNodeDescriptor,
    http: reqwest::Client,
    timeouts: RpcTimeouts,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcLedgerNode {
    pub fn new(
        descriptor: LedgerNodeDescriptor,
        timeouts: RpcTimeouts,
    ) -> Result<Self, LedgerNodeError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request)
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| LedgerNodeError::Unreachable {
                node: descriptor.id.clone(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            descriptor,
            http,
            timeouts,
            next_id: AtomicU64::new(1),
        })
    }

    fn node(&self) -> NodeId {
        self.descriptor.id.clone()
    }

    /// Send one request; the inner `Err` is a JSON-RPC error object.
    async fn call_raw(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Result<Value, RpcErrorObject>, LedgerNodeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.descriptor.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerNodeError::Timeout {
                        node: self.node(),
                        after_ms: self.timeouts.request.as_millis() as u64,
                    }
                } else if e.is_connect() {
                    LedgerNodeError::Unreachable {
                        node: self.node(),
                        reason: format!("connection failed: {e}"),
                    }
                } else {
                    LedgerNodeError::Unreachable {
                        node: self.node(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(LedgerNodeError::Unreachable {
                node: self.node(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        let parsed: RpcResponse =
            response
                .json()
                .await
                .map_err(|e| LedgerNodeError::InvalidResponse {
                    node: self.node(),
                    reason: format!("invalid JSON-RPC body: {e}"),
                })?;

        match parsed.error {
            Some(err) => Ok(Err(err)),
            None => Ok(Ok(parsed.result.unwrap_or(Value::Null))),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerNodeError> {
        self.call_raw(method, params)
            .await?
            .map_err(|err| self.map_rpc_error(method, err))
    }

    /// Contract calls carry this node's contract address as first parameter.
    async fn contract_call(&self, method: &str, args: Vec<Value>) -> Result<Value, LedgerNodeError> {
        let mut params = vec![json!(self.descriptor.contract_address)];
        params.extend(args);
        self.call(method, Value::Array(params)).await
    }

    fn map_rpc_error(&self, method: &str, err: RpcErrorObject) -> LedgerNodeError {
        if err.code == METHOD_NOT_FOUND {
            LedgerNodeError::Unsupported {
                node: self.node(),
                method: method.to_string(),
            }
        } else {
            LedgerNodeError::Rpc {
                node: self.node(),
                code: err.code,
                message: err.message,
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> LedgerNodeError {
        LedgerNodeError::InvalidResponse {
            node: self.node(),
            reason: reason.into(),
        }
    }

    fn quantity(&self, field: &str, raw: &str) -> Result<Quantity, LedgerNodeError> {
        Quantity::from_hex(raw).map_err(|e| self.invalid(format!("{field}: {e}")))
    }

    fn quantity_value(&self, field: &str, value: Value) -> Result<Quantity, LedgerNodeError> {
        let raw = value
            .as_str()
            .ok_or_else(|| self.invalid(format!("{field}: expected hex string, got {value}")))?;
        self.quantity(field, raw)
    }

    fn optional_quantity(
        &self,
        field: &str,
        raw: Option<String>,
    ) -> Result<Option<Quantity>, LedgerNodeError> {
        raw.map(|r| self.quantity(field, &r)).transpose()
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCastResult {
    tx_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSelection {
    candidate_id: String,
    position: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTally {
    position: String,
    candidate_id: String,
    votes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResults {
    total_votes: String,
    #[serde(default)]
    tallies: Vec<WireTally>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVote {
    ballot_id: String,
    voter_hash: String,
    #[serde(default)]
    selections: Vec<WireSelection>,
    #[serde(default)]
    empty_positions: Vec<String>,
    timestamp: u64,
    tx_hash: String,
    #[serde(default)]
    block_number: Option<String>,
}

fn parse_status(raw: Option<&str>) -> Option<ReceiptStatus> {
    match raw {
        None | Some("0x1") => Some(ReceiptStatus::Success),
        Some("0x0") => Some(ReceiptStatus::Reverted),
        Some(_) => None,
    }
}

fn cast_vote_params(ballot: &Ballot) -> Value {
    json!({
        "ballotId": ballot.ballot_id,
        "voterHash": ballot.voter_hash,
        "selections": ballot
            .selections
            .iter()
            .map(|s| json!({ "candidateId": s.candidate_id, "position": s.position }))
            .collect::<Vec<_>>(),
        "emptyPositions": ballot.empty_positions,
        "timestamp": ballot.timestamp.as_millis(),
    })
}

#[async_trait]
impl LedgerNode for RpcLedgerNode {
    fn descriptor(&self) -> &LedgerNodeDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<Quantity, LedgerNodeError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        self.quantity_value("blockNumber", result)
    }

    async fn submit_vote(&self, ballot: &Ballot) -> Result<LedgerReceipt, LedgerNodeError> {
        let params = json!([self.descriptor.contract_address, cast_vote_params(ballot)]);
        let result = match self.call_raw("voting_castVote", params).await? {
            Ok(value) => value,
            Err(err) if err.code == DUPLICATE_BALLOT => {
                let tx_hash = err
                    .data
                    .as_ref()
                    .and_then(|d| d.get("txHash"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Err(LedgerNodeError::DuplicateBallot {
                    node: self.node(),
                    ballot_id: ballot.ballot_id.clone(),
                    tx_hash,
                });
            }
            Err(err) => return Err(self.map_rpc_error("voting_castVote", err)),
        };

        let wire: WireCastResult = serde_json::from_value(result)
            .map_err(|e| self.invalid(format!("castVote result: {e}")))?;
        let status = parse_status(wire.status.as_deref())
            .ok_or_else(|| self.invalid(format!("unknown status {:?}", wire.status)))?;
        if status == ReceiptStatus::Reverted {
            return Err(LedgerNodeError::Rejected {
                node: self.node(),
                reason: format!("transaction {} reverted", wire.tx_hash),
            });
        }

        Ok(LedgerReceipt {
            node_id: self.node(),
            tx_hash: wire.tx_hash,
            block_number: self.optional_quantity("blockNumber", wire.block_number)?,
            gas_used: self.optional_quantity("gasUsed", wire.gas_used)?,
            status,
        })
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<LedgerReceipt>, LedgerNodeError> {
        let result = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let wire: WireReceipt = serde_json::from_value(result)
            .map_err(|e| self.invalid(format!("receipt: {e}")))?;
        let Some(block_number) = self.optional_quantity("blockNumber", wire.block_number)? else {
            return Ok(None);
        };
        let status = parse_status(wire.status.as_deref())
            .ok_or_else(|| self.invalid(format!("unknown status {:?}", wire.status)))?;

        Ok(Some(LedgerReceipt {
            node_id: self.node(),
            tx_hash: wire.transaction_hash,
            block_number: Some(block_number),
            gas_used: self.optional_quantity("gasUsed", wire.gas_used)?,
            status,
        }))
    }

    async fn chain_info(&self) -> Result<ChainInfo, LedgerNodeError> {
        let chain_id = self.call("eth_chainId", json!([])).await?;
        let latest = self.call("eth_blockNumber", json!([])).await?;
        let peer_count = match self.call("net_peerCount", json!([])).await {
            Ok(v) => self.quantity_value("peerCount", v)?,
            Err(LedgerNodeError::Unsupported { .. }) => Quantity::from_u128(0),
            Err(e) => return Err(e),
        };
        Ok(ChainInfo {
            node_id: self.node(),
            chain_id: self.quantity_value("chainId", chain_id)?,
            latest_block: self.quantity_value("blockNumber", latest)?,
            peer_count,
            contract_address: self.descriptor.contract_address.clone(),
        })
    }

    async fn election_results(&self) -> Result<ElectionResults, LedgerNodeError> {
        let result = self.contract_call("voting_getResults", vec![]).await?;
        let wire: WireResults = serde_json::from_value(result)
            .map_err(|e| self.invalid(format!("getResults: {e}")))?;
        let tallies = wire
            .tallies
            .into_iter()
            .map(|t| {
                Ok(CandidateTally {
                    votes: self.quantity("votes", &t.votes)?,
                    position: t.position,
                    candidate_id: t.candidate_id,
                })
            })
            .collect::<Result<Vec<_>, LedgerNodeError>>()?;
        Ok(ElectionResults {
            node_id: self.node(),
            total_votes: self.quantity("totalVotes", &wire.total_votes)?,
            tallies,
        })
    }

    async fn recorded_votes(&self) -> Result<Vec<LedgerVote>, LedgerNodeError> {
        let result = self.contract_call("voting_getAllVotes", vec![]).await?;
        let wire: Vec<WireVote> = serde_json::from_value(result)
            .map_err(|e| self.invalid(format!("getAllVotes: {e}")))?;
        wire.into_iter()
            .map(|v| {
                Ok(LedgerVote {
                    block_number: self.optional_quantity("blockNumber", v.block_number)?,
                    ballot_id: v.ballot_id,
                    voter_hash: v.voter_hash,
                    selections: v
                        .selections
                        .into_iter()
                        .map(|s| Selection {
                            candidate_id: s.candidate_id,
                            position: s.position,
                        })
                        .collect(),
                    empty_positions: v.empty_positions,
                    timestamp: Timestamp::from_millis(v.timestamp),
                    tx_hash: v.tx_hash,
                })
            })
            .collect()
    }

    async fn reset_votes(&self) -> Result<(), LedgerNodeError> {
        self.contract_call("voting_resetVotes", vec![]).await?;
        Ok(())
    }
}
