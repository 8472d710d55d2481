//! Nullable ledger node: an in-memory voting contract.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ballotguard_ledger_client::{LedgerNode, LedgerNodeError};
use ballotguard_types::{
    Ballot, CandidateTally, ChainInfo, ElectionResults, LedgerNodeDescriptor, LedgerReceipt,
    LedgerVote, NodeId, Quantity, ReceiptStatus,
};

/// How many times each entry point was called.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeCalls {
    pub probes: u32,
    pub submits: u32,
    pub receipts: u32,
    pub chain_info: u32,
    pub results: u32,
    pub votes: u32,
    pub resets: u32,
}

impl NodeCalls {
    pub fn total(&self) -> u32 {
        self.probes
            + self.submits
            + self.receipts
            + self.chain_info
            + self.results
            + self.votes
            + self.resets
    }
}

struct State {
    reachable: bool,
    /// `Some(None)` hangs forever; `Some(Some(d))` delays by `d`.
    probe_delay: Option<Option<Duration>>,
    supports_reset: bool,
    reject_reason: Option<String>,
    /// Polls answered "not yet mined" before a receipt appears.
    mining_polls: u32,
    receipt_queue: VecDeque<Result<Option<LedgerReceipt>, LedgerNodeError>>,
    recorded: Vec<LedgerVote>,
    block: u64,
    calls: NodeCalls,
    polls_seen: u32,
}

/// A scriptable ledger node. Reachable, mining instantly, with a reset
/// entry point unless told otherwise.
pub struct NullLedgerNode {
    descriptor: LedgerNodeDescriptor,
    state: Mutex<State>,
}

impl NullLedgerNode {
    pub fn new(id: &str, priority: u32) -> Self {
        Self::with_descriptor(LedgerNodeDescriptor {
            id: NodeId::new(id),
            rpc_url: format!("null://{id}"),
            contract_address: format!("0x{:040x}", priority + 1),
            priority,
            enabled: true,
        })
    }

    pub fn with_descriptor(descriptor: LedgerNodeDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(State {
                reachable: true,
                probe_delay: None,
                supports_reset: true,
                reject_reason: None,
                mining_polls: 0,
                receipt_queue: VecDeque::new(),
                recorded: Vec::new(),
                block: 100,
                calls: NodeCalls::default(),
                polls_seen: 0,
            }),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.descriptor.enabled = false;
        self
    }

    /// An unreachable node fails every call with `Unreachable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    /// Make the next probes never answer.
    pub fn hang_probes(&self) {
        self.state.lock().unwrap().probe_delay = Some(None);
    }

    pub fn delay_probes(&self, delay: Duration) {
        self.state.lock().unwrap().probe_delay = Some(Some(delay));
    }

    pub fn answer_probes_promptly(&self) {
        self.state.lock().unwrap().probe_delay = None;
    }

    /// Simulate a contract without a reset entry point.
    pub fn without_reset(self) -> Self {
        self.state.lock().unwrap().supports_reset = false;
        self
    }

    /// Make the contract revert every vote submission.
    pub fn reject_submissions(&self, reason: &str) {
        self.state.lock().unwrap().reject_reason = Some(reason.to_string());
    }

    /// Report transactions as not yet mined for `polls` polls.
    pub fn set_mining_polls(&self, polls: u32) {
        self.state.lock().unwrap().mining_polls = polls;
    }

    /// Answer the next receipt poll with `response` instead of looking the
    /// transaction up.
    pub fn queue_receipt(&self, response: Result<Option<LedgerReceipt>, LedgerNodeError>) {
        self.state.lock().unwrap().receipt_queue.push_back(response);
    }

    /// Pretend the contract already recorded `vote`.
    pub fn seed_vote(&self, vote: LedgerVote) {
        self.state.lock().unwrap().recorded.push(vote);
    }

    pub fn recorded_ballots(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .recorded
            .iter()
            .map(|v| v.ballot_id.clone())
            .collect()
    }

    pub fn calls(&self) -> NodeCalls {
        self.state.lock().unwrap().calls
    }

    pub fn tx_hash_for(&self, ballot_id: &str) -> String {
        format!("0x{}{}", self.descriptor.id, ballot_id)
    }

    fn unreachable(&self) -> LedgerNodeError {
        LedgerNodeError::Unreachable {
            node: self.descriptor.id.clone(),
            reason: "connection refused".into(),
        }
    }

    /// Count the call and fail if unreachable.
    fn enter(&self, count: impl FnOnce(&mut NodeCalls)) -> Result<(), LedgerNodeError> {
        let mut state = self.state.lock().unwrap();
        count(&mut state.calls);
        if state.reachable {
            Ok(())
        } else {
            Err(self.unreachable())
        }
    }
}

#[async_trait]
impl LedgerNode for NullLedgerNode {
    fn descriptor(&self) -> &LedgerNodeDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<Quantity, LedgerNodeError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.probes += 1;
            state.probe_delay
        };
        match delay {
            Some(None) => std::future::pending::<()>().await,
            Some(Some(d)) => tokio::time::sleep(d).await,
            None => {}
        }
        let state = self.state.lock().unwrap();
        if !state.reachable {
            return Err(self.unreachable());
        }
        Ok(Quantity::from_u128(state.block as u128))
    }

    async fn submit_vote(&self, ballot: &Ballot) -> Result<LedgerReceipt, LedgerNodeError> {
        self.enter(|c| c.submits += 1)?;
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.recorded.iter().find(|v| v.ballot_id == ballot.ballot_id) {
            return Err(LedgerNodeError::DuplicateBallot {
                node: self.descriptor.id.clone(),
                ballot_id: ballot.ballot_id.clone(),
                tx_hash: Some(existing.tx_hash.clone()),
            });
        }
        if let Some(reason) = &state.reject_reason {
            return Err(LedgerNodeError::Rejected {
                node: self.descriptor.id.clone(),
                reason: reason.clone(),
            });
        }
        state.block += 1;
        let tx_hash = self.tx_hash_for(&ballot.ballot_id);
        let block = Quantity::from_u128(state.block as u128);
        state.recorded.push(LedgerVote {
            ballot_id: ballot.ballot_id.clone(),
            voter_hash: ballot.voter_hash.clone(),
            selections: ballot.selections.clone(),
            empty_positions: ballot.empty_positions.clone(),
            timestamp: ballot.timestamp,
            tx_hash: tx_hash.clone(),
            block_number: Some(block),
        });
        Ok(LedgerReceipt {
            node_id: self.descriptor.id.clone(),
            tx_hash,
            block_number: None,
            gas_used: None,
            status: ReceiptStatus::Success,
        })
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<LedgerReceipt>, LedgerNodeError> {
        self.enter(|c| c.receipts += 1)?;
        let mut state = self.state.lock().unwrap();
        if let Some(response) = state.receipt_queue.pop_front() {
            return response;
        }
        state.polls_seen += 1;
        if state.polls_seen <= state.mining_polls {
            return Ok(None);
        }
        Ok(state
            .recorded
            .iter()
            .find(|v| v.tx_hash == tx_hash)
            .map(|v| LedgerReceipt {
                node_id: self.descriptor.id.clone(),
                tx_hash: v.tx_hash.clone(),
                block_number: v.block_number.clone(),
                gas_used: Some(Quantity::from_u128(21_000)),
                status: ReceiptStatus::Success,
            }))
    }

    async fn chain_info(&self) -> Result<ChainInfo, LedgerNodeError> {
        self.enter(|c| c.chain_info += 1)?;
        let state = self.state.lock().unwrap();
        Ok(ChainInfo {
            node_id: self.descriptor.id.clone(),
            chain_id: Quantity::from_u128(1337),
            latest_block: Quantity::from_u128(state.block as u128),
            peer_count: Quantity::from_u128(1),
            contract_address: self.descriptor.contract_address.clone(),
        })
    }

    async fn election_results(&self) -> Result<ElectionResults, LedgerNodeError> {
        self.enter(|c| c.results += 1)?;
        let state = self.state.lock().unwrap();
        let mut tallies: Vec<CandidateTally> = Vec::new();
        for selection in state.recorded.iter().flat_map(|v| &v.selections) {
            match tallies.iter_mut().find(|t| {
                t.position == selection.position && t.candidate_id == selection.candidate_id
            }) {
                Some(t) => {
                    let n = t.votes.as_u128().unwrap_or(0);
                    t.votes = Quantity::from_u128(n + 1);
                }
                None => tallies.push(CandidateTally {
                    position: selection.position.clone(),
                    candidate_id: selection.candidate_id.clone(),
                    votes: Quantity::from_u128(1),
                }),
            }
        }
        Ok(ElectionResults {
            node_id: self.descriptor.id.clone(),
            total_votes: Quantity::from_u128(state.recorded.len() as u128),
            tallies,
        })
    }

    async fn recorded_votes(&self) -> Result<Vec<LedgerVote>, LedgerNodeError> {
        self.enter(|c| c.votes += 1)?;
        Ok(self.state.lock().unwrap().recorded.clone())
    }

    async fn reset_votes(&self) -> Result<(), LedgerNodeError> {
        self.enter(|c| c.resets += 1)?;
        let mut state = self.state.lock().unwrap();
        if !state.supports_reset {
            return Err(LedgerNodeError::Unsupported {
                node: self.descriptor.id.clone(),
                method: "voting_resetVotes".into(),
            });
        }
        state.recorded.clear();
        Ok(())
    }
}
