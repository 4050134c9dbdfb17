use super::test_support::{prelude::*, *};
use super::*;

fn client() -> SurrealClient {
    SurrealClient::new().with_call_timeout(Duration::from_millis(500))
}

async fn connected(server: &FakeServer) -> SurrealClient {
    let client = client();
    client.connect(&server.url).await.expect("connect");
    client
}

#[tokio::test]
async fn connect_twice_to_same_endpoint_is_a_no_op() {
    let server = start_fake_server().await;
    let client = client();
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    client.connect(&server.url).await.expect("first connect");
    client.connect(&server.url).await.expect("second connect");
    assert_eq!(client.state().await, ConnectionState::Connected);

    let elsewhere = start_fake_server().await;
    match client.connect(&elsewhere.url).await {
        Err(RpcError::Conflict { current, requested }) => {
            assert_eq!(current, server.url.to_string());
            assert_eq!(requested, elsewhere.url.to_string());
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    client.close().await.expect("close");
}

#[tokio::test]
async fn call_without_connection_fails() {
    let client = client();
    assert!(matches!(
        client.call("echo", ()).await,
        Err(RpcError::NotConnected)
    ));
}

#[tokio::test]
async fn connect_to_nothing_is_a_connect_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/rpc")).expect("url");
    assert!(matches!(
        client().connect(&url).await,
        Err(RpcError::Connect { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_correlated_by_distinct_ids() {
    let server = start_fake_server().await;
    let client = Arc::new(connected(&server).await);

    let mut calls = tokio::task::JoinSet::new();
    for _ in 0..64 {
        let client = Arc::clone(&client);
        calls.spawn(async move { client.call("whoami", ()).await });
    }

    let mut ids = HashSet::new();
    while let Some(joined) = calls.join_next().await {
        let value = joined.expect("join").expect("call");
        let id: u64 = protocol::from_value(value).expect("id");
        assert!(ids.insert(id), "id {id} handed out twice");
    }
    assert_eq!(ids.len(), 64);
    assert_eq!(client.in_flight().await, 0);

    client.close().await.expect("close");
}

#[tokio::test]
async fn unanswered_call_times_out_and_late_reply_is_dropped() {
    let server = start_fake_server().await;
    let client = SurrealClient::new().with_call_timeout(Duration::from_millis(100));
    client.connect(&server.url).await.expect("connect");

    match client.call("late", ()).await {
        Err(RpcError::Timeout {
            method,
            id,
            timeout,
        }) => {
            assert_eq!(method, "late");
            assert_eq!(id, 1);
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(client.in_flight().await, 0);

    time::sleep(Duration::from_millis(400)).await;
    let value = client
        .call("echo", "still alive")
        .await
        .expect("echo after late reply");
    assert_eq!(value, Value::Text("still alive".into()));

    client.close().await.expect("close");
}

#[tokio::test]
async fn application_errors_carry_code_and_message() {
    let server = start_fake_server().await;
    let client = connected(&server).await;

    match client.call("fail", ()).await {
        Err(RpcError::Application {
            method,
            code,
            message,
            ..
        }) => {
            assert_eq!(method, "fail");
            assert_eq!(code, -32000);
            assert!(message.contains("problem"));
        }
        other => panic!("expected application error, got {other:?}"),
    }
    assert_eq!(client.in_flight().await, 0);

    client.close().await.expect("close");
}

#[tokio::test]
async fn undecodable_and_unknown_frames_do_not_stop_the_reader() {
    let server = start_fake_server().await;
    let client = connected(&server).await;

    let after_garbage = client.call("garbage", ()).await.expect("garbage");
    assert_eq!(after_garbage, Value::Text("after garbage".into()));
    let after_stray = client.call("stray", ()).await.expect("stray");
    assert_eq!(after_stray, Value::Text("after stray".into()));

    client.close().await.expect("close");
}

#[tokio::test]
async fn close_resets_ids_and_allows_reconnect() {
    let server = start_fake_server().await;
    let client = connected(&server).await;

    let first: u64 = protocol::from_value(client.call("whoami", ()).await.expect("call"))
        .expect("id");
    let second: u64 = protocol::from_value(client.call("whoami", ()).await.expect("call"))
        .expect("id");
    assert_eq!((first, second), (1, 2));

    client.close().await.expect("close");
    assert_eq!(client.state().await, ConnectionState::Closed);
    assert!(matches!(
        client.call("whoami", ()).await,
        Err(RpcError::NotConnected)
    ));
    client.close().await.expect("second close is a no-op");

    client.connect(&server.url).await.expect("reconnect");
    let again: u64 = protocol::from_value(client.call("whoami", ()).await.expect("call"))
        .expect("id");
    assert_eq!(again, 1);

    client.close().await.expect("close");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_releases_in_flight_calls_promptly() {
    let server = start_fake_server().await;
    let client = Arc::new(SurrealClient::new());
    client.connect(&server.url).await.expect("connect");

    let waiting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.call("silent", ()).await })
    };
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.in_flight().await, 1);

    client.close().await.expect("close");
    let outcome = time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("call returned before its own timeout")
        .expect("join");
    assert!(
        matches!(
            outcome,
            Err(RpcError::Closing | RpcError::ConnectionLost { .. })
        ),
        "unexpected outcome {outcome:?}"
    );
}

#[tokio::test]
async fn peer_disconnect_fails_waiters_and_later_calls() {
    let server = start_fake_server().await;
    let client = connected(&server).await;

    assert!(matches!(
        client.call("die", ()).await,
        Err(RpcError::ConnectionLost { .. })
    ));
    assert!(matches!(
        client.call("echo", 1).await,
        Err(RpcError::Closed { .. })
    ));
    assert_eq!(client.state().await, ConnectionState::Closed);

    let _ = client.close().await;
    assert_eq!(client.state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn connect_replaces_a_connection_the_peer_dropped() {
    let server = start_fake_server().await;
    let client = connected(&server).await;
    let _ = client.call("whoami", ()).await.expect("first call");

    assert!(matches!(
        client.call("die", ()).await,
        Err(RpcError::ConnectionLost { .. })
    ));
    assert_eq!(client.state().await, ConnectionState::Closed);

    client.connect(&server.url).await.expect("reconnect");
    assert_eq!(client.state().await, ConnectionState::Connected);
    let id: u64 = protocol::from_value(client.call("whoami", ()).await.expect("call"))
        .expect("id");
    assert_eq!(id, 1);

    client.close().await.expect("close");
}

#[tokio::test]
async fn dropped_connection_does_not_conflict_with_another_endpoint() {
    let server = start_fake_server().await;
    let client = connected(&server).await;
    let _ = client.call("die", ()).await;

    let elsewhere = start_fake_server().await;
    client.connect(&elsewhere.url).await.expect("connect elsewhere");
    let value = client.call("echo", "hi").await.expect("echo");
    assert_eq!(value, Value::Text("hi".into()));

    client.close().await.expect("close");
}

#[tokio::test]
async fn database_helpers() {
    let server = start_fake_server().await;
    let client = connected(&server).await;

    client.signin("root", "secret").await.expect("signin");
    client.use_namespace("logs", "ci").await.expect("use");

    let vars = Value::Map(vec![(Value::Text("n".into()), Value::Integer(3.into()))]);
    let results = client
        .query("DEFINE TABLE t; SELECT * FROM t WHERE n = $n", &vars)
        .await
        .expect("query");
    assert_eq!(results.len(), 2);
    results.ensure_ok().expect("statements ok");
    assert_eq!(results.at::<Value>(1).expect("second"), vars);

    let failed = client
        .query("THROW 'boom'", Value::Null)
        .await
        .expect("query call");
    assert!(matches!(failed.ensure_ok(), Err(RpcError::Query(_))));

    client.close().await.expect("close");
}
