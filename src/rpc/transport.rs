//! TCP transport layer for the RPC server.
//!
//! Handles TCP connections with newline-delimited JSON framing.
//! Each connection is handled in its own task. A streaming method holds its
//! connection until the stream ends; requests on other connections are
//! unaffected.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::core::ProgressEvent;

use super::methods::{MethodHandler, Reply};
use super::protocol::{JOB_NOT_FOUND, Notification, Request, Response};

pub const PROGRESS_NOTIFICATION: &str = "jobs.progress";

/// Manages the TCP transport layer.
pub struct Transport {
    listener: TcpListener,
    handler: Arc<MethodHandler>,
}

impl Transport {
    pub async fn bind(bind_addr: SocketAddr, handler: MethodHandler) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind RPC server to {}", bind_addr))?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until a shutdown signal is received.
    pub async fn listen(&self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "RPC server listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection error");
                                }
                                debug!(peer = %peer_addr, "Client disconnected");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &impl Serialize) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}

/// Forward progress events until the final one, which answers the request.
async fn stream_events<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: Value,
    mut events: mpsc::Receiver<ProgressEvent>,
) -> anyhow::Result<()> {
    while let Some(event) = events.recv().await {
        if !event.is_final() {
            write_line(writer, &Notification::new(PROGRESS_NOTIFICATION, &event)).await?;
            continue;
        }

        let response = match event {
            ProgressEvent::Snapshot(job) => Response::success(id, job),
            ProgressEvent::Error { error } => Response::error(id, JOB_NOT_FOUND, error),
        };
        return write_line(writer, &response).await;
    }

    write_line(writer, &Response::internal_error(id, "Progress stream ended unexpectedly")).await
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<MethodHandler>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => {
                if let Err(msg) = request.validate() {
                    warn!(peer = %peer_addr, error = msg, "Invalid request");
                    let id = request.id.clone().unwrap_or(Value::Null);
                    Reply::Unary(Response::invalid_request(id))
                } else if request.is_notification() {
                    // Notifications don't get responses, and never open a stream
                    debug!(peer = %peer_addr, method = %request.method, "Notification received");
                    let _ = handler.handle(request).await;
                    continue;
                } else {
                    debug!(peer = %peer_addr, method = %request.method, "Request received");
                    handler.handle(request).await
                }
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "Parse error");
                Reply::Unary(Response::parse_error())
            }
        };

        match reply {
            Reply::Unary(response) => write_line(&mut writer, &response).await?,
            Reply::Stream { id, events } => stream_events(&mut writer, id, events).await?,
        }
    }

    Ok(())
}
