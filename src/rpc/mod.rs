//! RPC server for client communication.
//!
//! Provides a JSON-RPC 2.0 interface over TCP for submitting workflows,
//! querying and aborting jobs, and watching a job's progress live.
//!
//! ## Architecture
//!
//! - `protocol`: JSON-RPC 2.0 request/response/notification types
//! - `transport`: TCP listener with newline-delimited JSON framing
//! - `methods`: Method dispatcher and handlers
//! - `client`: Client for connecting to the daemon
//!
//! `jobs.watch` is the one streaming method: the server pushes
//! `jobs.progress` notifications on the same connection and answers the
//! request with the terminal job snapshot.

pub mod client;
pub mod methods;
mod protocol;
mod transport;

use std::net::SocketAddr;
use tokio::sync::broadcast;

use crate::context::AppContext;
use transport::Transport;

pub use client::{ClientError, RpcClient};
pub use methods::MethodHandler;
pub use protocol::{JOB_NOT_FOUND, Notification, Request, Response, RpcError};
pub use transport::PROGRESS_NOTIFICATION;

/// RPC server that exposes daemon functionality to clients.
pub struct RpcServer {
    transport: Transport,
    shutdown_tx: broadcast::Sender<()>,
}

impl RpcServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(ctx: AppContext, bind_addr: SocketAddr) -> anyhow::Result<Self> {
        let handler = MethodHandler::new(ctx);
        let transport = Transport::bind(bind_addr, handler).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            transport,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Serve requests. Runs until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.transport.listen(shutdown_rx).await
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
