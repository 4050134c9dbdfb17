use super::*;

pub(super) mod prelude {
    pub(crate) use std::{collections::HashSet, sync::Arc, time::Duration};

    pub(crate) use ciborium::Value;
    pub(crate) use tokio::time;
    pub(crate) use url::Url;
}

use prelude::*;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request as Handshake, Response as HandshakeReply},
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        Message,
    },
};

use crate::protocol::{ErrorBody, Response};

#[derive(Debug, Deserialize)]
struct IncomingRequest {
    id: u64,
    method: String,
    params: Value,
}

/// Websocket server speaking just enough of the RPC to exercise the client.
///
/// Methods: `echo` returns its params, `whoami` returns the request id,
/// `fail` answers with an application error, `silent` never answers, `late`
/// answers after 300ms, `garbage` and `stray` send an undecodable frame or a
/// response for an unknown id before answering, `die` closes the socket, and
/// `signin`/`use`/`query` mimic the database.
pub(crate) struct FakeServer {
    pub(crate) url: Url,
    handle: JoinHandle<()>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn start_fake_server() -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_connection(stream));
        }
    });
    FakeServer {
        url: Url::parse(&format!("ws://{addr}/rpc")).expect("url"),
        handle,
    }
}

fn negotiate_cbor(
    _request: &Handshake,
    mut response: HandshakeReply,
) -> Result<HandshakeReply, ErrorResponse> {
    response
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    Ok(response)
}

async fn serve_connection(stream: TcpStream) {
    let Ok(ws) = accept_hdr_async(stream, negotiate_cbor).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        let Message::Binary(bytes) = message else {
            continue;
        };
        let Ok(request) = protocol::decode::<IncomingRequest>(&bytes) else {
            continue;
        };
        tokio::spawn(respond(request, tx.clone()));
    }

    drop(tx);
    let _ = writer.await;
}

fn ok(id: u64, result: Value) -> Response {
    Response {
        id,
        error: None,
        result: Some(result),
    }
}

fn frame(response: &Response) -> Message {
    Message::binary(protocol::encode(response).expect("encode response"))
}

async fn respond(request: IncomingRequest, tx: mpsc::UnboundedSender<Message>) {
    let id = request.id;
    let response = match request.method.as_str() {
        "echo" => ok(id, request.params),
        "whoami" => ok(id, Value::Integer(id.into())),
        "fail" => Response {
            id,
            error: Some(ErrorBody {
                code: -32000,
                message: "There was a problem with the database".into(),
            }),
            result: None,
        },
        "silent" => return,
        "late" => {
            time::sleep(Duration::from_millis(300)).await;
            ok(id, Value::Text("late".into()))
        }
        "garbage" => {
            let _ = tx.send(Message::binary(b"\xff\x00not cbor".to_vec()));
            ok(id, Value::Text("after garbage".into()))
        }
        "stray" => {
            let _ = tx.send(frame(&ok(id + 1_000_000, Value::Null)));
            ok(id, Value::Text("after stray".into()))
        }
        "die" => {
            let _ = tx.send(Message::Close(None));
            return;
        }
        "signin" => ok(id, Value::Text("token".into())),
        "use" => ok(id, Value::Null),
        "query" => ok(id, query_results(request.params)),
        other => Response {
            id,
            error: Some(ErrorBody {
                code: -32601,
                message: format!("Method not found: {other}"),
            }),
            result: None,
        },
    };
    let _ = tx.send(frame(&response));
}

/// One result per `;`-separated statement; statements containing `THROW`
/// fail, the rest return the query variables.
fn query_results(params: Value) -> Value {
    let mut params = params.into_array().unwrap_or_default().into_iter();
    let sql = params
        .next()
        .and_then(|sql| sql.into_text().ok())
        .unwrap_or_default();
    let vars = params.next().unwrap_or(Value::Null);

    let statements = sql
        .split(';')
        .filter(|statement| !statement.trim().is_empty())
        .map(|statement| {
            let result = if statement.contains("THROW") {
                QueryResult {
                    status: "ERR".into(),
                    result: Value::Text("An error occurred: boom".into()),
                }
            } else {
                QueryResult {
                    status: "OK".into(),
                    result: vars.clone(),
                }
            };
            Value::serialized(&result).expect("serialize query result")
        })
        .collect();
    Value::Array(statements)
}
