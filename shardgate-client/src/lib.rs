//! RPC client for the shardgate wire protocol.
//!
//! The same transport serves two callers: end clients talking to a gate, and
//! the gate talking to its tablets. Retry, backoff and bearer auth live here;
//! message semantics live in the `protocol` crate.

pub mod gate;
pub mod rpc;

pub use gate::{GateClient, GateTransaction};
pub use rpc::{ClientConfig, ClientError, RpcClient};
