use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use ciborium::Value;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Serialize;
use tokio::{
    net::TcpStream,
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        error::ProtocolError,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    pending::PendingRequests,
    protocol::{self, Request, Response},
    results::QueryResults,
    sequence::RequestSequence,
    RpcError,
};

/// How long a call waits for its response by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Websocket subprotocol requested on connect.
pub const SUBPROTOCOL: &str = "cbor";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closing,
    /// Closed locally, or dropped by the peer. Either way
    /// [`connect`](SurrealClient::connect) opens a fresh connection.
    Closed,
}

/// One live websocket plus everything scoped to its lifetime.
struct Connection {
    endpoint: Url,
    sink: Mutex<WsSink>,
    pending: Arc<PendingRequests>,
    shutdown: CancellationToken,
    reader: StdMutex<Option<JoinHandle<()>>>,
    cause: Arc<StdMutex<Option<String>>>,
}

impl Connection {
    fn failure(&self) -> Option<String> {
        self.cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Releases a connection whose reader already saw the transport fail.
    async fn retire(&self) {
        self.shutdown.cancel();
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            let _ = handle.await;
        }
        let _ = self.sink.lock().await.close().await;
        self.pending.clear();
    }
}

/// Client for the SurrealDB websocket RPC endpoint.
///
/// Many calls may be in flight at once over the single connection; each is
/// matched to its response by id. The client holds at most one connection at
/// a time.
pub struct SurrealClient {
    connection: RwLock<Option<Arc<Connection>>>,
    sequence: RequestSequence,
    call_timeout: Duration,
    closed: AtomicBool,
}

impl Default for SurrealClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SurrealClient {
    pub fn new() -> Self {
        Self {
            connection: RwLock::new(None),
            sequence: RequestSequence::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn state(&self) -> ConnectionState {
        match self.connection.read().await.as_ref() {
            Some(connection) if connection.shutdown.is_cancelled() => ConnectionState::Closing,
            Some(connection) if connection.failure().is_some() => ConnectionState::Closed,
            Some(_) => ConnectionState::Connected,
            None if self.closed.load(Ordering::SeqCst) => ConnectionState::Closed,
            None => ConnectionState::Disconnected,
        }
    }

    /// Number of calls currently waiting for a response.
    pub async fn in_flight(&self) -> usize {
        self.connection
            .read()
            .await
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }

    /// Opens the websocket to `endpoint`.
    ///
    /// Connecting again to the endpoint already in use is a no-op; any other
    /// endpoint is a [`RpcError::Conflict`] until [`close`](Self::close). A
    /// connection the peer already dropped is replaced.
    pub async fn connect(&self, endpoint: &Url) -> Result<(), RpcError> {
        let mut slot = self.connection.write().await;
        let failed = match slot.as_ref() {
            None => None,
            Some(existing) if existing.shutdown.is_cancelled() => return Err(RpcError::Closing),
            Some(existing) => match existing.failure() {
                Some(cause) => Some((Arc::clone(existing), cause)),
                None if existing.endpoint == *endpoint => return Ok(()),
                None => {
                    return Err(RpcError::Conflict {
                        current: existing.endpoint.to_string(),
                        requested: endpoint.to_string(),
                    })
                }
            },
        };
        if let Some((dead, cause)) = failed {
            *slot = None;
            self.closed.store(true, Ordering::SeqCst);
            dead.retire().await;
            debug!(endpoint = %dead.endpoint, %cause, "discarded failed rpc connection");
        }

        let connect_error = |source: tungstenite::Error| RpcError::Connect {
            endpoint: endpoint.to_string(),
            source: Box::new(source),
        };
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(connect_error)?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        let (stream, _response) = connect_async(request).await.map_err(connect_error)?;
        let (sink, source) = stream.split();

        let pending = Arc::new(PendingRequests::default());
        let shutdown = CancellationToken::new();
        let cause = Arc::new(StdMutex::new(None));
        let reader = tokio::spawn(read_responses(
            source,
            Arc::clone(&pending),
            shutdown.clone(),
            Arc::clone(&cause),
        ));

        self.sequence.reset();
        self.closed.store(false, Ordering::SeqCst);
        *slot = Some(Arc::new(Connection {
            endpoint: endpoint.clone(),
            sink: Mutex::new(sink),
            pending,
            shutdown,
            reader: StdMutex::new(Some(reader)),
            cause,
        }));
        debug!(%endpoint, "rpc connection established");
        Ok(())
    }

    /// Sends `method` with `params` and waits for the matching response.
    ///
    /// Returns the raw `result` payload ([`Value::Null`] when absent).
    pub async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<Value, RpcError> {
        let connection = self.live_connection().await?;

        let id = self.sequence.next();
        let mut slot = connection.pending.register(id)?;
        let frame = protocol::encode(&Request {
            id,
            method,
            params,
        })?;
        connection
            .sink
            .lock()
            .await
            .send(Message::binary(frame))
            .await?;

        let response: Response = tokio::select! {
            biased;
            received = time::timeout(self.call_timeout, slot.receiver()) => match received {
                Ok(Ok(response)) => response,
                Ok(Err(_)) => {
                    return Err(RpcError::ConnectionLost {
                        method: method.to_string(),
                        id,
                    })
                }
                Err(_) => {
                    return Err(RpcError::Timeout {
                        method: method.to_string(),
                        id,
                        timeout: self.call_timeout,
                    })
                }
            },
            _ = connection.shutdown.cancelled() => return Err(RpcError::Closing),
        };

        if let Some(error) = response.error {
            return Err(RpcError::Application {
                method: method.to_string(),
                id,
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn signin(&self, user: &str, pass: &str) -> Result<Value, RpcError> {
        #[derive(Serialize)]
        struct Credentials<'a> {
            user: &'a str,
            pass: &'a str,
        }

        self.call("signin", [Credentials { user, pass }]).await
    }

    /// Selects the namespace and database for subsequent queries.
    pub async fn use_namespace(&self, namespace: &str, database: &str) -> Result<(), RpcError> {
        self.call("use", [namespace, database]).await.map(drop)
    }

    pub async fn query<V: Serialize>(&self, sql: &str, vars: V) -> Result<QueryResults, RpcError> {
        let value = self.call("query", (sql, vars)).await?;
        QueryResults::from_value(value)
    }

    /// Shuts the connection down.
    ///
    /// The shutdown signal fires first, so in-flight calls and the reader task
    /// stop waiting before the socket goes away. The sequence and correlation
    /// table are reset, after which [`connect`](Self::connect) may be used
    /// again. Closing an already closed client is a no-op.
    pub async fn close(&self) -> Result<(), RpcError> {
        let connection = {
            let slot = self.connection.read().await;
            match slot.as_ref() {
                Some(connection) if !connection.shutdown.is_cancelled() => Arc::clone(connection),
                _ => return Ok(()),
            }
        };
        connection.shutdown.cancel();

        let mut errors = Vec::new();
        {
            let mut sink = connection.sink.lock().await;
            let frame = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
            if let Err(err) = sink.send(frame).await {
                if !is_expected_close_error(&err) {
                    errors.push(format!("close frame: {err}"));
                }
            }
            if let Err(err) = sink.close().await {
                if !is_expected_close_error(&err) {
                    errors.push(format!("close socket: {err}"));
                }
            }
        }

        let reader = connection
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            if let Err(err) = handle.await {
                errors.push(format!("reader task: {err}"));
            }
        }

        let abandoned = connection.pending.clear();
        if abandoned > 0 {
            debug!(abandoned, "dropped pending calls on close");
        }
        *self.connection.write().await = None;
        self.sequence.reset();
        self.closed.store(true, Ordering::SeqCst);
        debug!(endpoint = %connection.endpoint, "rpc connection closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RpcError::Close(errors))
        }
    }

    async fn live_connection(&self) -> Result<Arc<Connection>, RpcError> {
        let connection = self
            .connection
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(RpcError::NotConnected)?;
        if connection.shutdown.is_cancelled() {
            return Err(RpcError::Closing);
        }
        if let Some(cause) = connection.failure() {
            return Err(RpcError::Closed { cause });
        }
        Ok(connection)
    }
}

async fn read_responses(
    mut source: WsSource,
    pending: Arc<PendingRequests>,
    shutdown: CancellationToken,
    cause: Arc<StdMutex<Option<String>>>,
) {
    let failure = loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break "connection closed".to_string(),
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(Message::Binary(bytes))) => match protocol::decode::<Response>(&bytes) {
                Ok(response) => {
                    let id = response.id;
                    if !pending.deliver(response) {
                        debug!(id, "dropping response with no waiting call");
                    }
                }
                Err(err) => warn!("failed to decode rpc response: {err}"),
            },
            Some(Ok(Message::Text(_))) => warn!("ignoring unexpected text frame"),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!("server closed the connection ({})", frame.code),
                    None => "server closed the connection".to_string(),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => break err.to_string(),
            None => break "connection closed by peer".to_string(),
        }
    };

    *cause.lock().unwrap_or_else(PoisonError::into_inner) = Some(failure.clone());
    let abandoned = pending.clear();
    if shutdown.is_cancelled() {
        return;
    }
    warn!(abandoned, "rpc connection failed: {failure}");
    shutdown.cancelled().await;
}

fn is_expected_close_error(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake | ProtocolError::SendAfterClosing,
        ) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
