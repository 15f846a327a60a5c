use super::Connection;
use crate::{
    ErrorKind, SessionState, SubscriptionConn, SubscriptionDiagnostic, WebsocketConnectionError,
};
use async_tungstenite::{
    tokio::accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderMap},
        protocol::frame::{
            coding::{Data, OpCode},
            Frame,
        },
        Message,
    },
};
use futures::{SinkExt, StreamExt};
use gql_client_protocol::socket::HandshakeError;
use graphql_client::{GraphQLQuery, QueryBody};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::{
    net::TcpListener,
    select,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

struct TodoAdded;

#[derive(Debug, Serialize)]
struct TodoAddedVariables {
    done: Option<bool>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Todo {
    id: String,
    text: String,
    done: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct TodoAddedData {
    todo_added: Todo,
}

impl GraphQLQuery for TodoAdded {
    type Variables = TodoAddedVariables;
    type ResponseData = TodoAddedData;

    fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
        QueryBody {
            variables,
            query: "subscription TodoAdded($done: Boolean) { todoAdded(done: $done) { id text done } }",
            operation_name: "TodoAdded",
        }
    }
}

fn todo(id: &str) -> Value {
    json!({ "todoAdded": { "id": id, "text": "write tests", "done": false } })
}

fn added(id: &str) -> TodoAddedData {
    TodoAddedData {
        todo_added: Todo {
            id: id.into(),
            text: "write tests".into(),
            done: false,
        },
    }
}

#[derive(Debug)]
enum ServerEvent {
    Connected(HeaderMap),
    Frame(Value),
    /// The client completed the close handshake.
    Closed,
    /// The connection went away without a close frame.
    Disconnected,
}

/// A single-connection graphql-ws server, driven by the test through channels.
struct TestServer {
    url: String,
    events: UnboundedReceiver<ServerEvent>,
    outgoing: UnboundedSender<Message>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/graphql", listener.local_addr().unwrap());
        let (events_sender, events) = unbounded_channel();
        let (outgoing, outgoing_receiver) = unbounded_channel();
        tokio::spawn(serve(listener, events_sender, outgoing_receiver));

        Self {
            url,
            events,
            outgoing,
        }
    }

    fn connection(&self) -> Connection {
        Connection::builder()
            .api_url(&self.url)
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer token"))
            .build()
    }

    fn send(&self, frame: Value) {
        self.outgoing.send(Message::Text(frame.to_string())).unwrap();
    }

    fn accept(&self) {
        self.send(json!({ "type": "connection_ack" }));
        self.send(json!({ "type": "ka" }));
    }

    async fn next_event(&mut self) -> ServerEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for the client")
            .expect("server task ended")
    }

    async fn next_frame(&mut self) -> Value {
        match self.next_event().await {
            ServerEvent::Frame(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    /// Wait for the connection, the init and the start frame. Returns the subscription id.
    async fn expect_started(&mut self) -> String {
        assert!(matches!(self.next_event().await, ServerEvent::Connected(_)));
        assert_eq!(
            self.next_frame().await,
            json!({ "type": "connection_init", "payload": {} })
        );
        let start = self.next_frame().await;
        assert_eq!(start["type"], "start");
        start["id"].as_str().unwrap().to_owned()
    }
}

async fn serve(
    listener: TcpListener,
    events: UnboundedSender<ServerEvent>,
    mut outgoing: UnboundedReceiver<Message>,
) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut headers = HeaderMap::new();
    let socket = accept_hdr_async(stream, |request: &Request, mut response: Response| {
        headers = request.headers().clone();
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, "graphql-ws".parse().unwrap());
        Ok::<_, ErrorResponse>(response)
    })
    .await
    .unwrap();
    let _ = events.send(ServerEvent::Connected(headers));

    let (mut write, mut read) = socket.split();
    loop {
        select! {
            msg = outgoing.recv() => match msg {
                Some(msg) => {
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ServerEvent::Frame(serde_json::from_str(&text).unwrap()));
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = events.send(ServerEvent::Closed);
                    break;
                }
                Some(Err(_)) | None => {
                    let _ = events.send(ServerEvent::Disconnected);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn next<S>(stream: &mut S) -> Option<S::Item>
where
    S: futures::Stream + Unpin,
{
    timeout(WAIT, stream.next())
        .await
        .expect("timed out waiting for a subscription result")
}

#[tokio::test]
async fn delivers_decoded_data() {
    let mut server = TestServer::start().await;
    server.accept();

    let connection = server.connection();
    let mut subscription = connection
        .subscribe::<TodoAdded>(TodoAddedVariables { done: Some(false) })
        .await
        .unwrap();
    assert_eq!(subscription.state(), SessionState::Active);

    match server.next_event().await {
        ServerEvent::Connected(headers) => {
            assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
            assert_eq!(headers.get(SEC_WEBSOCKET_PROTOCOL).unwrap(), "graphql-ws");
        }
        other => panic!("expected a connection, got {:?}", other),
    }
    assert_eq!(
        server.next_frame().await,
        json!({ "type": "connection_init", "payload": {} })
    );
    let start = server.next_frame().await;
    assert_eq!(start["type"], "start");
    assert_eq!(start["payload"]["operationName"], "TodoAdded");
    assert_eq!(start["payload"]["variables"], json!({ "done": false }));
    let id = start["id"].as_str().unwrap().to_owned();

    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("1") } }));
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("2") } }));

    assert_eq!(next(&mut subscription).await, Some(added("1")));
    assert_eq!(next(&mut subscription).await, Some(added("2")));
}

#[tokio::test]
async fn skips_data_that_fails_to_decode() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let mut diagnostics = subscription.handle().diagnostics();
    let id = server.expect_started().await;

    server.send(json!({ "id": id, "type": "data", "payload": { "data": { "todoAdded": "nope" } } }));
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("2") } }));

    assert_eq!(next(&mut subscription).await, Some(added("2")));
    assert!(matches!(
        next(&mut diagnostics).await,
        Some(SubscriptionDiagnostic::Decode { .. })
    ));
}

#[tokio::test]
async fn delivers_data_alongside_graphql_errors() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let mut diagnostics = subscription.handle().diagnostics();
    let id = server.expect_started().await;

    server.send(json!({
        "id": id,
        "type": "data",
        "payload": {
            "data": todo("1"),
            "errors": [{ "message": "text was truncated" }]
        }
    }));

    assert_eq!(next(&mut subscription).await, Some(added("1")));
    match next(&mut diagnostics).await {
        Some(SubscriptionDiagnostic::GraphqlErrors(errors)) => {
            assert_eq!(errors[0].message, "text was truncated");
        }
        other => panic!("expected graphql errors, got {:?}", other),
    }
}

#[tokio::test]
async fn ignores_frames_for_other_subscriptions() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let id = server.expect_started().await;

    server.send(json!({ "type": "data", "payload": { "data": todo("no id") } }));
    server.send(json!({ "id": "", "type": "data", "payload": { "data": todo("empty id") } }));
    server.send(json!({
        "id": "5f1c1d2e-0000-4000-8000-000000000000",
        "type": "data",
        "payload": { "data": todo("foreign") }
    }));
    server.send(json!({ "type": "ka" }));
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("mine") } }));

    assert_eq!(next(&mut subscription).await, Some(added("mine")));
}

#[tokio::test]
async fn complete_ends_the_stream() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let id = server.expect_started().await;

    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("1") } }));
    server.send(json!({ "id": id, "type": "complete" }));
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("2") } }));

    assert_eq!(next(&mut subscription).await, Some(added("1")));
    assert_eq!(next(&mut subscription).await, None);
    assert_eq!(next(&mut subscription).await, None);
    assert_eq!(subscription.state(), SessionState::Closed);
    assert!(matches!(server.next_event().await, ServerEvent::Closed));
}

#[tokio::test]
async fn keep_alive_before_ack_fails_the_handshake() {
    let mut server = TestServer::start().await;
    server.send(json!({ "type": "ka" }));
    server.send(json!({ "type": "connection_ack" }));

    let err = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handshake);
    assert!(matches!(
        err,
        WebsocketConnectionError::Handshake(HandshakeError::UnexpectedFrame { .. })
    ));

    assert!(matches!(server.next_event().await, ServerEvent::Connected(_)));
    assert_eq!(server.next_frame().await["type"], "connection_init");
    assert!(matches!(server.next_event().await, ServerEvent::Closed));
}

#[tokio::test]
async fn connection_error_fails_the_handshake() {
    let server = TestServer::start().await;
    server.send(json!({ "type": "connection_error", "payload": { "message": "unauthorized" } }));

    let err = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handshake);
    match err {
        WebsocketConnectionError::Handshake(HandshakeError::Rejected { payload }) => {
            assert_eq!(payload, json!({ "message": "unauthorized" }));
        }
        other => panic!("expected a rejected handshake, got {:?}", other),
    }
}

#[tokio::test]
async fn close_during_handshake() {
    let server = TestServer::start().await;
    server.send(json!({ "type": "connection_ack" }));
    server.outgoing.send(Message::Close(None)).unwrap();

    let err = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap_err();
    assert!(matches!(err, WebsocketConnectionError::SocketClosed));
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() {
    let err = Connection::new("ws://127.0.0.1:1/graphql")
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn cancel_stops_then_closes() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let id = server.expect_started().await;

    let handle = subscription.handle();
    timeout(WAIT, handle.cancel()).await.unwrap();
    assert_eq!(handle.state(), SessionState::Closed);
    assert!(handle.is_cancelled());

    assert_eq!(
        server.next_frame().await,
        json!({ "id": id, "type": "stop" })
    );
    assert!(matches!(server.next_event().await, ServerEvent::Closed));
    assert_eq!(next(&mut subscription).await, None);
}

#[tokio::test]
async fn dropping_the_subscription_stops_it() {
    let mut server = TestServer::start().await;
    server.accept();

    let subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let id = server.expect_started().await;
    let handle = subscription.handle();

    drop(subscription);

    assert_eq!(
        server.next_frame().await,
        json!({ "id": id, "type": "stop" })
    );
    assert!(matches!(server.next_event().await, ServerEvent::Closed));
    timeout(WAIT, handle.closed()).await.unwrap();
}

#[tokio::test]
async fn replies_to_a_server_close() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    server.expect_started().await;

    server.outgoing.send(Message::Close(None)).unwrap();

    assert!(matches!(server.next_event().await, ServerEvent::Closed));
    assert_eq!(next(&mut subscription).await, None);
    assert_eq!(subscription.state(), SessionState::Closed);
}

#[tokio::test]
async fn invalid_utf8_ends_the_subscription() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let mut diagnostics = subscription.handle().diagnostics();
    let id = server.expect_started().await;

    server
        .outgoing
        .send(Message::Frame(Frame::message(
            vec![0xff, 0xfe],
            OpCode::Data(Data::Text),
            true,
        )))
        .unwrap();
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("after") } }));

    assert_eq!(next(&mut subscription).await, None);
    assert_eq!(subscription.state(), SessionState::Closed);
    assert!(matches!(
        next(&mut diagnostics).await,
        Some(SubscriptionDiagnostic::Socket { .. })
    ));
}

#[tokio::test]
async fn buffers_at_most_one_result() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let mut diagnostics = subscription.handle().diagnostics();
    let id = server.expect_started().await;

    for n in ["1", "2", "3"] {
        server.send(json!({ "id": id, "type": "data", "payload": { "data": todo(n) } }));
    }
    server.send(json!({ "id": id, "type": "error", "payload": { "message": "boom" } }));

    // the task is blocked handing over the second result, so it hasn't read the error yet
    assert!(timeout(Duration::from_millis(200), diagnostics.next())
        .await
        .is_err());

    assert_eq!(next(&mut subscription).await, Some(added("1")));
    assert_eq!(next(&mut subscription).await, Some(added("2")));
    assert_eq!(next(&mut subscription).await, Some(added("3")));
    match next(&mut diagnostics).await {
        Some(SubscriptionDiagnostic::ServerError(payload)) => {
            assert_eq!(payload, json!({ "message": "boom" }));
        }
        other => panic!("expected a server error, got {:?}", other),
    }
}

#[tokio::test]
async fn reports_malformed_and_unexpected_frames() {
    let mut server = TestServer::start().await;
    server.accept();

    let mut subscription = server
        .connection()
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let mut diagnostics = subscription.handle().diagnostics();
    let id = server.expect_started().await;

    server
        .outgoing
        .send(Message::Text("not json".into()))
        .unwrap();
    server.send(json!({ "id": id, "type": "start" }));
    server.send(json!({ "id": id, "type": "data", "payload": { "data": todo("1") } }));

    assert_eq!(next(&mut subscription).await, Some(added("1")));
    assert!(matches!(
        next(&mut diagnostics).await,
        Some(SubscriptionDiagnostic::MalformedFrame { .. })
    ));
    assert!(matches!(
        next(&mut diagnostics).await,
        Some(SubscriptionDiagnostic::UnexpectedFrame(kind)) if kind.as_str() == "start"
    ));
}

#[cfg(feature = "http")]
#[tokio::test]
async fn graphql_client_routes_operations() {
    use crate::GraphqlClient;
    use httpmock::prelude::*;

    struct TodoCount;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct TodoCountData {
        todo_count: i64,
    }

    impl GraphQLQuery for TodoCount {
        type Variables = ();
        type ResponseData = TodoCountData;

        fn build_query(variables: Self::Variables) -> QueryBody<Self::Variables> {
            QueryBody {
                variables,
                query: "query TodoCount { todoCount }",
                operation_name: "TodoCount",
            }
        }
    }

    let http = MockServer::start_async().await;
    let mut ws = TestServer::start().await;
    ws.accept();

    let mock = http
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql")
                .header("authorization", "Bearer token")
                .json_body_partial(r#"{ "operationName": "TodoCount" }"#);
            then.status(200)
                .json_body(json!({ "data": { "todoCount": 3 } }));
        })
        .await;

    let client = GraphqlClient::builder(http.url("/graphql"))
        .header(AUTHORIZATION, HeaderValue::from_static("Bearer token"))
        .build()
        .unwrap();
    assert_eq!(
        client.query::<TodoCount>(()).await.unwrap(),
        TodoCountData { todo_count: 3 }
    );
    mock.assert_async().await;

    // the test socket server listens on its own port
    let client = crate::hybrid::Connection::new(
        client.into_connection(),
        ws.connection(),
    )
    .into_client();
    let mut subscription = client
        .subscribe::<TodoAdded>(TodoAddedVariables { done: None })
        .await
        .unwrap();
    let id = ws.expect_started().await;
    ws.send(json!({ "id": id, "type": "data", "payload": { "data": todo("1") } }));
    assert_eq!(next(&mut subscription).await, Some(added("1")));
}
