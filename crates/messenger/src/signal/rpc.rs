use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::listener::{SignalTransport, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("signal-cli daemon unreachable: {0}")]
    Io(String),
    #[error("signal-cli request timed out")]
    Timeout,
    #[error("signal-cli returned error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("invalid signal-cli response: {0}")]
    Decode(String),
}

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

async fn open(address: &str) -> Result<Connection, String> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
        .await
        .map_err(|_| format!("connect to {address} timed out"))?
        .map_err(|error| format!("connect to {address}: {error}"))?;
    let (reader, writer) = stream.into_split();
    Ok(Connection { lines: BufReader::new(reader).lines(), writer })
}

/// Receive side of the `signal-cli daemon --tcp` socket.
pub struct TcpSignalTransport {
    address: String,
    connection: Mutex<Option<Connection>>,
}

impl TcpSignalTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), connection: Mutex::new(None) }
    }
}

#[async_trait]
impl SignalTransport for TcpSignalTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let connection = open(&self.address).await.map_err(TransportError::Connect)?;
        *self.connection.lock().await = Some(connection);
        Ok(())
    }

    async fn next_line(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            return Err(TransportError::Receive("not connected".to_string()));
        };
        connection
            .lines
            .next_line()
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(mut connection) = self.connection.lock().await.take() {
            connection
                .writer
                .shutdown()
                .await
                .map_err(|error| TransportError::Disconnect(error.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Request side: one short-lived connection per call.
pub struct SignalRpcClient {
    address: String,
    next_id: AtomicU64,
}

impl SignalRpcClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), next_id: AtomicU64::new(1) }
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut line = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
            .to_string();
        line.push('\n');

        timeout(REQUEST_TIMEOUT, async {
            let mut connection = open(&self.address).await.map_err(RpcError::Io)?;
            connection
                .writer
                .write_all(line.as_bytes())
                .await
                .map_err(|error| RpcError::Io(error.to_string()))?;

            loop {
                let Some(reply) = connection
                    .lines
                    .next_line()
                    .await
                    .map_err(|error| RpcError::Io(error.to_string()))?
                else {
                    return Err(RpcError::Io("connection closed before response".to_string()));
                };
                if let Some(result) = match_response(&reply, &id)? {
                    return result;
                }
            }
        })
        .await
        .map_err(|_| RpcError::Timeout)?
    }
}

/// `None` for notifications and responses to other requests.
fn match_response(line: &str, id: &str) -> Result<Option<Result<Value, RpcError>>, RpcError> {
    let response: RpcResponse =
        serde_json::from_str(line).map_err(|error| RpcError::Decode(error.to_string()))?;
    let matches = match &response.id {
        Some(Value::String(value)) => value == id,
        Some(Value::Number(value)) => value.to_string() == id,
        _ => false,
    };
    if !matches {
        return Ok(None);
    }
    if let Some(error) = response.error {
        return Ok(Some(Err(RpcError::Remote { code: error.code, message: error.message })));
    }
    Ok(Some(Ok(response.result.unwrap_or(Value::Null))))
}
