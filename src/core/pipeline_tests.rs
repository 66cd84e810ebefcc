//! End-to-end tests driving the transport against a canned local HTTP server.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::api::GenerateRequest;
use crate::core::chat_stream::{run_stream, ChatStreamService, StreamEvent, StreamParams};
use crate::core::config::ConnectionSettings;
use crate::core::relay::Subscription;
use crate::core::turn::{follow_turn, Presentation, TurnView};

struct CapturedRequest {
    head: String,
    body: String,
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

/// Serve one connection: read the request, write `head`, then each body
/// chunk with a short pause so they arrive as separate reads. When `hold` is
/// set the connection stays open after the last chunk until it fires.
async fn serve_once(
    head: &'static str,
    chunks: Vec<&'static [u8]>,
    hold: Option<oneshot::Receiver<()>>,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (captured_tx, captured_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");

        let mut buffer = Vec::new();
        let mut read_buf = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut read_buf).await.expect("read");
            buffer.extend_from_slice(&read_buf[..n]);
            if let Some(end) = find_header_end(&buffer) {
                break end;
            }
            if n == 0 {
                return;
            }
        };
        let request_head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
        let body_start = header_end + 4;
        let expected = content_length(&request_head);
        while buffer.len() < body_start + expected {
            let n = socket.read(&mut read_buf).await.expect("read body");
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&read_buf[..n]);
        }
        let _ = captured_tx.send(CapturedRequest {
            head: request_head,
            body: String::from_utf8_lossy(&buffer[body_start..]).into_owned(),
        });

        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for chunk in chunks {
            if socket.write_all(chunk).await.is_err() || socket.flush().await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let _ = socket.shutdown().await;
    });

    (format!("http://{addr}"), captured_rx)
}

const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n";

async fn collect_events(endpoint: String) -> Vec<StreamEvent> {
    let params = StreamParams::new(
        ConnectionSettings::new(endpoint, "llama3"),
        GenerateRequest::streaming("llama3", "hello"),
        CancellationToken::new(),
    );
    let mut events = Vec::new();
    run_stream(params, |event| events.push(event)).await;
    events
}

async fn next_event(subscription: &mut Subscription) -> Option<StreamEvent> {
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("timed out waiting for event")
        .map(|(event, _)| event)
}

fn token(text: &str, is_final: bool) -> StreamEvent {
    StreamEvent::Token {
        text: text.to_string(),
        is_final,
    }
}

#[tokio::test]
async fn posts_json_body_to_generate_endpoint() {
    let (endpoint, captured) = serve_once(
        STREAM_HEAD,
        vec![&b"{\"response\":\"ok\",\"done\":true}\n"[..]],
        None,
    )
    .await;

    let events = collect_events(format!("{endpoint}/")).await;
    assert_eq!(events, vec![token("ok", true), StreamEvent::End]);

    let request = captured.await.expect("captured request");
    assert!(
        request.head.starts_with("POST /api/generate HTTP/1.1"),
        "{}",
        request.head
    );
    assert!(request
        .head
        .to_ascii_lowercase()
        .contains("content-type: application/json"));
    let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(
        body,
        serde_json::json!({"model": "llama3", "prompt": "hello", "stream": true})
    );
}

#[tokio::test]
async fn records_split_across_chunks_arrive_in_order() {
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![
            &b"{\"response\":\"a\",\"done\":false}\n{\"resp"[..],
            &b"onse\":\"b\",\"done\":false}\n"[..],
            &b"{\"response\":\"c\",\"done\":true}\n"[..],
        ],
        None,
    )
    .await;

    let events = collect_events(endpoint).await;
    assert_eq!(
        events,
        vec![
            token("a", false),
            token("b", false),
            token("c", true),
            StreamEvent::End
        ]
    );
}

#[tokio::test]
async fn empty_body_yields_only_end() {
    let (endpoint, _captured) = serve_once(STREAM_HEAD, Vec::new(), None).await;
    assert_eq!(collect_events(endpoint).await, vec![StreamEvent::End]);
}

#[tokio::test]
async fn trailing_fragment_is_swallowed_before_end() {
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![&b"{\"response\":\"a\",\"done\":false}\n{\"resp"[..]],
        None,
    )
    .await;

    assert_eq!(
        collect_events(endpoint).await,
        vec![token("a", false), StreamEvent::End]
    );
}

#[tokio::test]
async fn error_record_ends_the_turn_without_end_event() {
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![&b"{\"error\":\"x\"}\n{\"response\":\"y\",\"done\":true}\n"[..]],
        None,
    )
    .await;

    assert_eq!(
        collect_events(endpoint).await,
        vec![StreamEvent::Error {
            message: "x".to_string()
        }]
    );
}

#[tokio::test]
async fn non_success_status_is_reported_without_reading_body() {
    let (endpoint, _captured) = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: 35\r\nConnection: close\r\n\r\n",
        vec![&b"{\"response\":\"ignored\",\"done\":true}\n"[..]],
        None,
    )
    .await;

    assert_eq!(
        collect_events(endpoint).await,
        vec![StreamEvent::Error {
            message: "HTTP 404 Not Found".to_string()
        }]
    );
}

#[tokio::test]
async fn refused_connection_is_a_single_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let events = collect_events(format!("http://{addr}")).await;
    assert_eq!(events.len(), 1, "{events:?}");
    match &events[0] {
        StreamEvent::Error { message } => {
            assert!(message.starts_with("Connection failed"), "{message}")
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn endpoint_without_scheme_fails_as_connection_error() {
    let events = collect_events("localhost:1".to_string()).await;
    assert!(
        matches!(events.as_slice(), [StreamEvent::Error { .. }]),
        "{events:?}"
    );
}

#[tokio::test]
async fn dispatched_turn_renders_in_every_attached_view() {
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![
            &b"{\"response\":\"# Hi\",\"done\":false}\n"[..],
            &b"{\"response\":\"\\n\\nthere\",\"done\":true}\n"[..],
        ],
        None,
    )
    .await;

    let service = ChatStreamService::new();
    let mut main_sub = service.subscribe();
    let mut side_sub = service.subscribe();

    let (turn_id, _cancel) = service
        .dispatch_turn(&ConnectionSettings::new(endpoint, "llama3"), "hello", "", "")
        .expect("dispatch");

    let mut main_view = TurnView::new();
    let mut side_view = TurnView::new();
    main_view.watch(turn_id);
    side_view.watch(turn_id);

    let mut streamed = Vec::new();
    follow_turn(&mut main_sub, &mut main_view, |view, _| {
        streamed.push(view.presentation().clone());
    })
    .await;
    follow_turn(&mut side_sub, &mut side_view, |_, _| {}).await;

    let expected = "<h1>Hi</h1>\n<p>there</p>\n".to_string();
    assert_eq!(
        streamed,
        vec![
            Presentation::Streaming {
                markup: "<h1>Hi</h1>\n".to_string()
            },
            Presentation::Streaming {
                markup: expected.clone()
            },
            Presentation::Complete {
                markup: expected.clone()
            },
        ]
    );
    assert_eq!(
        side_view.presentation(),
        &Presentation::Complete { markup: expected }
    );
}

#[tokio::test]
async fn cancelled_turn_stops_forwarding_events() {
    let (release_tx, release_rx) = oneshot::channel();
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![&b"{\"response\":\"first\",\"done\":false}\n"[..]],
        Some(release_rx),
    )
    .await;

    let service = ChatStreamService::new();
    let mut subscription = service.subscribe();
    let (_turn_id, cancel) = service
        .dispatch_turn(&ConnectionSettings::new(endpoint, "llama3"), "hello", "", "")
        .expect("dispatch");

    assert_eq!(next_event(&mut subscription).await, Some(token("first", false)));
    cancel.cancel();
    let _ = release_tx.send(());

    let after = tokio::time::timeout(Duration::from_millis(300), subscription.recv()).await;
    assert!(after.is_err(), "no event expected after cancel, got {after:?}");
}

#[tokio::test]
async fn oversized_record_is_a_protocol_error() {
    let (endpoint, _captured) = serve_once(
        STREAM_HEAD,
        vec![&b"{\"response\":\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"[..]],
        None,
    )
    .await;

    let mut params = StreamParams::new(
        ConnectionSettings::new(endpoint, "llama3"),
        GenerateRequest::streaming("llama3", "hello"),
        CancellationToken::new(),
    );
    params.max_buffered_bytes = 16;

    let mut events = Vec::new();
    run_stream(params, |event| events.push(event)).await;
    assert_eq!(
        events,
        vec![StreamEvent::Error {
            message: "Stream record exceeded 16 bytes without a newline".to_string()
        }]
    );
}

#[tokio::test]
async fn connection_lost_mid_body_is_a_single_error() {
    let (endpoint, _captured) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\n\r\n",
        vec![
            &b"1e\r\n{\"response\":\"a\",\"done\":false}\n\r\n"[..],
            &b"40\r\n{\"resp"[..],
        ],
        None,
    )
    .await;

    let events = collect_events(endpoint).await;
    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0], token("a", false));
    match &events[1] {
        StreamEvent::Error { message } => {
            assert!(message.starts_with("Connection failed"), "{message}")
        }
        other => panic!("expected error, got {other:?}"),
    }
}
