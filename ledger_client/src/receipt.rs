//! Polling a node until a submitted transaction is mined.
//!
//! Wall-clock time against `timeout` is the primary guard and cancels an
//! in-flight poll; `max_attempts` is a secondary guard against interval
//! drift. Consecutive polls are always at least `interval` apart.

use std::time::Duration;

use ballotguard_types::LedgerReceipt;
use tokio::time::Instant;

use crate::{LedgerNode, ReceiptError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiptWaitOptions {
    pub max_attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReceiptWaitOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(45_000),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReceiptWaiter {
    options: ReceiptWaitOptions,
}

impl ReceiptWaiter {
    pub fn new(options: ReceiptWaitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ReceiptWaitOptions {
        self.options
    }

    /// Poll `node` for the receipt of `tx_hash`.
    ///
    /// A receipt without a block number counts as absent. A failed poll is
    /// logged and also counts as absent.
    pub async fn wait_for_receipt(
        &self,
        node: &dyn LedgerNode,
        tx_hash: &str,
    ) -> Result<LedgerReceipt, ReceiptError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        let poll = async {
            loop {
                attempts += 1;
                match node.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) if receipt.is_mined() => return Some(receipt),
                    Ok(_) => {
                        tracing::debug!(node = %node.id(), tx = %tx_hash, attempt = attempts, "receipt not yet available");
                    }
                    Err(e) => {
                        tracing::warn!(node = %node.id(), tx = %tx_hash, attempt = attempts, "receipt poll failed: {e}");
                    }
                }
                if attempts >= self.options.max_attempts {
                    return None;
                }
                tokio::time::sleep(self.options.interval).await;
            }
        };

        let outcome = tokio::time::timeout(self.options.timeout, poll).await;

        match outcome {
            Ok(Some(receipt)) => {
                tracing::info!(
                    node = %node.id(),
                    tx = %tx_hash,
                    block = ?receipt.block_number,
                    attempts,
                    "transaction mined"
                );
                Ok(receipt)
            }
            Ok(None) | Err(_) => Err(ReceiptError::TransactionNotMined {
                tx_hash: tx_hash.to_string(),
                node: node.id().clone(),
                attempts,
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerNodeError;
    use async_trait::async_trait;
    use ballotguard_types::{
        Ballot, ChainInfo, ElectionResults, LedgerNodeDescriptor, LedgerVote, NodeId, Quantity,
        ReceiptStatus,
    };
    use std::sync::Mutex;

    /// Reports the receipt absent until `mined_on_poll`, recording when each
    /// poll happened.
    struct SlowMiner {
        descriptor: LedgerNodeDescriptor,
        mined_on_poll: Option<u32>,
        polls: Mutex<Vec<Instant>>,
        hang: bool,
    }

    impl SlowMiner {
        fn new(mined_on_poll: Option<u32>) -> Self {
            Self {
                descriptor: LedgerNodeDescriptor {
                    id: NodeId::new("primary"),
                    rpc_url: "http://unused".into(),
                    contract_address: "0xc0".into(),
                    priority: 0,
                    enabled: true,
                },
                mined_on_poll,
                polls: Mutex::new(Vec::new()),
                hang: false,
            }
        }

        fn poll_count(&self) -> u32 {
            self.polls.lock().unwrap().len() as u32
        }
    }

    #[async_trait]
    impl LedgerNode for SlowMiner {
        fn descriptor(&self) -> &LedgerNodeDescriptor {
            &self.descriptor
        }

        async fn probe(&self) -> Result<Quantity, LedgerNodeError> {
            Ok(Quantity::from_u128(1))
        }

        async fn submit_vote(&self, _ballot: &Ballot) -> Result<LedgerReceipt, LedgerNodeError> {
            unreachable!("not used by the waiter")
        }

        async fn transaction_receipt(
            &self,
            tx_hash: &str,
        ) -> Result<Option<LedgerReceipt>, LedgerNodeError> {
            let poll = {
                let mut polls = self.polls.lock().unwrap();
                polls.push(Instant::now());
                polls.len() as u32
            };
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.mined_on_poll {
                Some(k) if poll >= k => Ok(Some(LedgerReceipt {
                    node_id: self.descriptor.id.clone(),
                    tx_hash: tx_hash.to_string(),
                    block_number: Some(Quantity::from_u128(42)),
                    gas_used: Some(Quantity::from_u128(21_000)),
                    status: ReceiptStatus::Success,
                })),
                _ => Ok(None),
            }
        }

        async fn chain_info(&self) -> Result<ChainInfo, LedgerNodeError> {
            unreachable!()
        }

        async fn election_results(&self) -> Result<ElectionResults, LedgerNodeError> {
            unreachable!()
        }

        async fn recorded_votes(&self) -> Result<Vec<LedgerVote>, LedgerNodeError> {
            unreachable!()
        }

        async fn reset_votes(&self) -> Result<(), LedgerNodeError> {
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_receipt_on_kth_poll() {
        let node = SlowMiner::new(Some(4));
        let waiter = ReceiptWaiter::default();

        let receipt = waiter.wait_for_receipt(&node, "0xfeed").await.unwrap();

        assert_eq!(node.poll_count(), 4);
        assert_eq!(receipt.block_number, Some(Quantity::from_u128(42)));
        assert_eq!(receipt.status, ReceiptStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_never_faster_than_interval() {
        let node = SlowMiner::new(Some(5));
        let waiter = ReceiptWaiter::new(ReceiptWaitOptions {
            interval: Duration::from_millis(250),
            ..Default::default()
        });

        waiter.wait_for_receipt(&node, "0xfeed").await.unwrap();

        let polls = node.polls.lock().unwrap();
        for pair in polls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_mined() {
        let node = SlowMiner::new(None);
        let waiter = ReceiptWaiter::new(ReceiptWaitOptions {
            max_attempts: 1_000,
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(5_500),
        });

        let err = waiter.wait_for_receipt(&node, "0xdead").await.unwrap_err();

        let ReceiptError::TransactionNotMined { tx_hash, attempts, waited_ms, .. } = &err;
        assert_eq!(tx_hash, "0xdead");
        assert_eq!(*attempts, 6);
        assert!(*waited_ms >= 5_500);
        let message = err.to_string();
        assert!(message.contains("0xdead"));
        assert!(message.contains("pending"));
        assert!(message.contains("low fee"));
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_is_a_secondary_guard() {
        let node = SlowMiner::new(None);
        let waiter = ReceiptWaiter::new(ReceiptWaitOptions {
            max_attempts: 3,
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(60),
        });

        let err = waiter.wait_for_receipt(&node, "0xdead").await.unwrap_err();

        let ReceiptError::TransactionNotMined { attempts, .. } = err;
        assert_eq!(attempts, 3);
        assert_eq!(node.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_poll_is_cancelled_at_timeout() {
        let mut node = SlowMiner::new(Some(1));
        node.hang = true;
        let waiter = ReceiptWaiter::new(ReceiptWaitOptions {
            timeout: Duration::from_secs(2),
            ..Default::default()
        });

        let err = waiter.wait_for_receipt(&node, "0xdead").await.unwrap_err();

        let ReceiptError::TransactionNotMined { waited_ms, .. } = err;
        assert!(waited_ms >= 2_000);
        assert!(waited_ms < 3_000);
    }
}
