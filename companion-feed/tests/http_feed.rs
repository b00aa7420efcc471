//! End-to-end feed tests against a throwaway local HTTP server.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use companion_core::config::FeedConfig;
use companion_core::source::InformationSource;
use companion_core::{NewsTopic, SourceError, Topic};
use companion_feed::{FeedError, HttpFeedSource};

/// Serve one canned `(status, body)` response per connection, in order, and
/// record each raw request head.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            log.lock().await.push(String::from_utf8_lossy(&head).to_string());

            let reason = if status == 200 { "OK" } else { "Service Unavailable" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), seen)
}

fn config(url: String, max_retries: u32) -> FeedConfig {
    FeedConfig {
        url,
        api_key: Some("secret-token".into()),
        max_retries,
        timeout_ms: 2000,
    }
}

const WEATHER: Topic = Topic::News(NewsTopic::Weather);

#[tokio::test]
async fn fetches_items_with_auth_and_topic_path() {
    let (base, seen) = serve(vec![(
        200,
        r#"{"source":"気象庁","items":[{"title":"台風情報","summary":"進路に注意"}]}"#,
    )])
    .await;
    let source = HttpFeedSource::new("news", &config(format!("{base}/news/{{topic}}"), 0)).expect("source");

    let items = source.fetch(WEATHER).await.expect("fetch");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, "気象庁");
    assert_eq!(items[0].topic, WEATHER);

    let requests = seen.lock().await;
    let head = requests[0].to_lowercase();
    assert!(head.starts_with("get /news/weather "), "{head}");
    assert!(head.contains("authorization: bearer secret-token"));
}

#[tokio::test]
async fn server_error_is_retried() {
    let (base, seen) = serve(vec![
        (503, r#"{"error":"busy"}"#),
        (200, r#"[{"title":"晴れ","summary":"全国的に晴れ","source":"NHK"}]"#),
    ])
    .await;
    let source = HttpFeedSource::new("news", &config(base, 1)).expect("source");

    let items = source.fetch_items(WEATHER).await.expect("second attempt succeeds");
    assert_eq!(items[0].title, "晴れ");
    assert_eq!(seen.lock().await.len(), 2);
}

#[tokio::test]
async fn persistent_failure_maps_to_request_error() {
    let (base, _seen) = serve(vec![(503, "{}"), (503, "{}")]).await;
    let source = HttpFeedSource::new("news", &config(base, 1)).expect("source");

    match source.fetch(WEATHER).await {
        Err(SourceError::Request(msg)) => assert!(msg.contains("503"), "{msg}"),
        other => panic!("expected request error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let (base, seen) = serve(vec![(200, r#"{"status":"ok"}"#), (200, "[]")]).await;
    let source = HttpFeedSource::new("news", &config(base, 1)).expect("source");

    assert!(matches!(source.fetch_items(WEATHER).await, Err(FeedError::ParseError(_))));
    assert_eq!(seen.lock().await.len(), 1, "parse failures are not retried");
}
