use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected to {current}; refusing to connect to {requested}")]
    Conflict { current: String, requested: String },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("websocket transport failed: {0}")]
    Transport(#[source] Box<tungstenite::Error>),
    #[error("connection is closing")]
    Closing,
    #[error("connection is no longer usable: {cause}")]
    Closed { cause: String },
    #[error("connection lost while waiting for `{method}` (id {id})")]
    ConnectionLost { method: String, id: u64 },
    #[error("request id {0} is already in flight")]
    DuplicateRequestId(u64),
    #[error("`{method}` (id {id}) got no response within {timeout:?}")]
    Timeout {
        method: String,
        id: u64,
        timeout: Duration,
    },
    #[error("`{method}` (id {id}) failed with code {code}: {message}")]
    Application {
        method: String,
        id: u64,
        code: i64,
        message: String,
    },
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("query statement failed: {0}")]
    Query(String),
    #[error("statement index {index} is out of range ({len} results)")]
    OutOfRange { index: usize, len: usize },
    #[error("errors while closing the connection: {}", .0.join("; "))]
    Close(Vec<String>),
}

impl From<tungstenite::Error> for RpcError {
    fn from(err: tungstenite::Error) -> Self {
        RpcError::Transport(Box::new(err))
    }
}
