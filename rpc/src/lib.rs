//! HTTP API for the surrounding voting application.
//!
//! Provides endpoints for:
//! - Vote submission (`POST /votes`)
//! - Ledger queries: chain info, results, transaction lookup and receipt waits
//! - Node status and emergency ledger statistics
//! - Election lifecycle transitions and administrative resets
//! - Prometheus metrics
//!
//! Authorization of administrative routes is left to whatever sits in
//! front of this router.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use handlers::{ApiState, TransactionLookup, VoteRequest};
pub use server::{router, RpcServer};
