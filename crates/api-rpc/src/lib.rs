//! JSON-RPC API Layer
//!
//! Admin surface of the Herald daemon: scheduled job management, on-demand
//! retry sweeps and delivery statistics. Served over TCP on localhost.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
