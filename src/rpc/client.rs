//! RPC client for connecting to the daemon.
//!
//! One TCP connection per call. `watch` keeps its connection open and
//! forwards progress notifications until the server sends the final answer.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

use crate::core::JobState;

use super::protocol::{Request, RpcError, ServerMessage};
use super::transport::PROGRESS_NOTIFICATION;

/// RPC client for communicating with the daemon.
pub struct RpcClient {
    addr: SocketAddr,
}

/// Error returned by RPC client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to daemon: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Communication error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Connection closed before a response arrived")]
    Closed,

    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
}

impl ClientError {
    /// The JSON-RPC error code, when the server answered with an error.
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Rpc(e) => Some(e.code),
            _ => None,
        }
    }
}

impl RpcClient {
    /// Create a new client that will connect to the given address.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn send(&self, method: &str, params: Option<Value>) -> Result<BufReader<OwnedReadHalf>, ClientError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(ClientError::Connect)?;
        let (reader, mut writer) = stream.into_split();

        let request = Request {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(Value::Number(1.into())),
        };

        let mut request_json = serde_json::to_string(&request).map_err(ClientError::Serialize)?;
        request_json.push('\n');
        writer.write_all(request_json.as_bytes()).await?;

        Ok(BufReader::new(reader))
    }

    /// Read server lines until the response, handing notifications to
    /// `on_notification`.
    async fn read_response<T: DeserializeOwned>(
        reader: &mut BufReader<OwnedReadHalf>,
        mut on_notification: impl FnMut(&str, Value),
    ) -> Result<T, ClientError> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(ClientError::Closed);
            }

            match serde_json::from_str::<ServerMessage>(&line).map_err(ClientError::Parse)? {
                ServerMessage::Notification(note) => on_notification(&note.method, note.params),
                ServerMessage::Response(response) => {
                    if let Some(error) = response.error {
                        return Err(ClientError::Rpc(error));
                    }
                    let result = response.result.unwrap_or(Value::Null);
                    return serde_json::from_value(result).map_err(ClientError::Parse);
                }
            }
        }
    }

    /// Call an RPC method and return the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let mut reader = self.send(method, params).await?;
        Self::read_response(&mut reader, |_, _| {}).await
    }

    /// Call an RPC method with no parameters.
    pub async fn call_no_params<T: DeserializeOwned>(
        &self,
        method: &str,
    ) -> Result<T, ClientError> {
        self.call(method, None).await
    }

    /// Follow a job until it reaches a terminal state, calling `on_progress`
    /// for each intermediate snapshot. Returns the terminal snapshot.
    pub async fn watch(
        &self,
        job_id: &str,
        mut on_progress: impl FnMut(JobState),
    ) -> Result<JobState, ClientError> {
        let params = serde_json::json!({ "id": job_id });
        let mut reader = self.send("jobs.watch", Some(params)).await?;

        Self::read_response(&mut reader, |method, params| {
            if method != PROGRESS_NOTIFICATION {
                return;
            }
            if let Ok(job) = serde_json::from_value::<JobState>(params) {
                on_progress(job);
            }
        })
        .await
    }
}
