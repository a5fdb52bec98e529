//! SimTrace RPC Proxy Server Library
//!
//! A JSON-RPC proxy that sits between any Ethereum tooling and a real node.
//! Every `eth_call` passing through it is rewritten to carry a fixed set of
//! state overrides, so unmodified clients simulate calls against a
//! hypothetical world state. All other traffic is relayed byte for byte.

pub mod health;
pub mod proxy;
pub mod rpc;

pub use proxy::{ProxyServer, ProxyServerBuilder};
pub use rpc::{RpcHandler, UpstreamReply};
