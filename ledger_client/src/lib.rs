//! Access to one ledger node.
//!
//! [`LedgerNode`] is the seam every other crate programs against. The
//! production implementation, [`RpcLedgerNode`], speaks JSON-RPC 2.0 over
//! HTTP: chain-level calls use the standard `eth_*`/`net_*` namespace and
//! contract calls go through the node's `voting_*` gateway with the node's
//! own contract address. [`ReceiptWaiter`] polls a node until a submitted
//! transaction is mined.

pub mod error;
pub mod node;
pub mod receipt;
pub mod rpc;

pub use error::{LedgerNodeError, ReceiptError};
pub use node::LedgerNode;
pub use receipt::{ReceiptWaitOptions, ReceiptWaiter};
pub use rpc::{RpcLedgerNode, RpcTimeouts};
