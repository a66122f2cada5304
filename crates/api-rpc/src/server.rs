//! JSON-RPC Server
//!
//! Serves the admin methods over TCP bound to localhost.

use crate::handler::RpcHandler;
use crate::types::{JobIdRequest, JobRequest, ListJobsRequest, StatsRequest, SweepRequest};
use herald_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9528;

/// RPC Server Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    DEFAULT_RPC_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_RPC_PORT
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

/// Register `$method` so that its params are parsed as `$req` and passed to `RpcHandler::$call`
macro_rules! register {
    ($module:expr, $handler:expr, $method:literal, $req:ty, $call:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $req = params.parse()?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }};
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    fn build_module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        register!(module, self.handler, "jobs.add.v1", JobRequest, add_job);
        register!(module, self.handler, "jobs.update.v1", JobRequest, update_job);
        register!(module, self.handler, "jobs.get.v1", JobIdRequest, get_job);
        register!(module, self.handler, "jobs.list.v1", ListJobsRequest, list_jobs);
        register!(module, self.handler, "jobs.delete.v1", JobIdRequest, delete_job);
        register!(module, self.handler, "jobs.run.v1", JobIdRequest, run_job);
        register!(module, self.handler, "notifications.sweep.v1", SweepRequest, sweep);
        register!(module, self.handler, "admin.stats.v1", StatsRequest, stats);

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server.local_addr()?;

        let module = self.build_module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}
