//! Transform client against a local stand-in for the proxy endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use readeasy::config::TransformConfig;
use readeasy::transform::{TextTransformClient, TransformKind, TransformRequest};
use readeasy::ReadEasyError;

type Reply = (StatusCode, Value);

#[derive(Clone)]
struct Proxy {
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Value>>>,
    replies: Arc<Mutex<Vec<Reply>>>,
    delay: Duration,
}

impl Proxy {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            hits: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(replies)),
            delay: Duration::ZERO,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn handle(State(proxy): State<Proxy>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    proxy.hits.fetch_add(1, Ordering::SeqCst);
    proxy.received.lock().push(body.clone());
    if !proxy.delay.is_zero() {
        tokio::time::sleep(proxy.delay).await;
    }
    let reply = {
        let mut replies = proxy.replies.lock();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies
                .first()
                .cloned()
                .unwrap_or((StatusCode::OK, json!({"result": body["text"].clone()})))
        }
    };
    (reply.0, Json(reply.1))
}

async fn serve(proxy: Proxy) -> String {
    let app = Router::new().route("/proxy", post(handle)).with_state(proxy);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/proxy")
}

fn client(endpoint: String, timeout_ms: u64) -> TextTransformClient {
    TextTransformClient::new(&TransformConfig {
        endpoint,
        timeout_ms,
        loading_retry_delay_ms: 20,
        ..TransformConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_loading_then_generated_text() {
    let proxy = Proxy::new(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({"loading": true})),
        (StatusCode::OK, json!([{"generated_text": "Hello"}])),
    ]);
    let endpoint = serve(proxy.clone()).await;

    let result = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Summarize, "Some long text."))
        .await
        .unwrap();

    assert_eq!(result.text, "Hello");
    assert!(!result.truncated);
    assert_eq!(proxy.hits(), 2);
}

#[tokio::test]
async fn test_loading_error_message_then_object_reply() {
    let proxy = Proxy::new(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "model is loading"})),
        (StatusCode::OK, json!({"generated_text": "ok"})),
    ]);
    let endpoint = serve(proxy.clone()).await;

    let result = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Simplify, "Some text."))
        .await
        .unwrap();

    assert_eq!(result.text, "ok");
    assert_eq!(proxy.hits(), 2);
}

#[tokio::test]
async fn test_plain_outage_is_not_retried() {
    let proxy = Proxy::new(vec![(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({"error": "Service unavailable"}),
    )]);
    let endpoint = serve(proxy.clone()).await;

    let err = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Summarize, "Text"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "upstream_error");
    assert_eq!(proxy.hits(), 1);
}

#[tokio::test]
async fn test_loading_twice_gives_up() {
    let proxy = Proxy::new(vec![(StatusCode::SERVICE_UNAVAILABLE, json!({"loading": true}))]);
    let endpoint = serve(proxy.clone()).await;

    let err = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Simplify, "Text"))
        .await
        .unwrap_err();

    assert_eq!(err, ReadEasyError::UpstreamLoading);
    assert_eq!(proxy.hits(), 2);
}

#[tokio::test]
async fn test_translate_truncates_to_limit() {
    let proxy = Proxy::new(vec![(StatusCode::OK, json!({"result": "Traduit"}))]);
    let endpoint = serve(proxy.clone()).await;

    let text = "a".repeat(5000);
    let result = client(endpoint, 2000)
        .transform(&TransformRequest::translate(text, "fr"))
        .await
        .unwrap();

    assert_eq!(result.text, "Traduit");
    assert!(result.truncated);

    let received = proxy.received.lock().clone();
    assert_eq!(received.len(), 1);
    let sent = received[0]["text"].as_str().unwrap();
    assert_eq!(sent.chars().count(), 3003);
    assert!(sent.ends_with("..."));
    assert_eq!(received[0]["type"], "translate");
    assert_eq!(received[0]["langModel"], "French");
}

#[tokio::test]
async fn test_summarize_limit_is_larger() {
    let proxy = Proxy::new(Vec::new());
    let endpoint = serve(proxy.clone()).await;

    let result = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Summarize, "b".repeat(3500)))
        .await
        .unwrap();

    assert!(!result.truncated);
    assert_eq!(result.text.len(), 3500);
    assert!(proxy.received.lock()[0].get("langModel").is_none());
}

#[tokio::test]
async fn test_translate_without_target_is_rejected_locally() {
    let proxy = Proxy::new(Vec::new());
    let endpoint = serve(proxy.clone()).await;
    let client = client(endpoint, 2000);

    let request = TransformRequest::new(TransformKind::Translate, "Hello");
    let err = client.transform(&request).await.unwrap_err();
    assert_eq!(err.kind(), "input_invalid");

    let err = client
        .transform(&TransformRequest::translate("Hello", "klingon"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "input_invalid");
    assert_eq!(proxy.hits(), 0);
}

#[tokio::test]
async fn test_timeout() {
    let mut proxy = Proxy::new(vec![(StatusCode::OK, json!({"result": "late"}))]);
    proxy.delay = Duration::from_millis(500);
    let endpoint = serve(proxy.clone()).await;

    let err = client(endpoint, 50)
        .transform(&TransformRequest::new(TransformKind::Summarize, "Text"))
        .await
        .unwrap_err();

    assert_eq!(err, ReadEasyError::UpstreamTimeout(50));
    assert!(err.user_message().contains("shorter"));
    assert_eq!(proxy.hits(), 1);
}

#[tokio::test]
async fn test_upstream_error_detail() {
    let proxy = Proxy::new(vec![(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "Gemini API error", "details": "quota exceeded"}),
    )]);
    let endpoint = serve(proxy.clone()).await;

    let err = client(endpoint, 2000)
        .transform(&TransformRequest::new(TransformKind::Simplify, "Text"))
        .await
        .unwrap_err();

    match &err {
        ReadEasyError::Upstream {
            status,
            message,
            detail,
        } => {
            assert_eq!(*status, 500);
            assert_eq!(message, "Gemini API error");
            assert_eq!(detail.as_deref(), Some("quota exceeded"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.is_recoverable());
    assert_eq!(proxy.hits(), 1);
}

#[tokio::test]
async fn test_unreachable_proxy() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{addr}/proxy"), 2000)
        .transform(&TransformRequest::new(TransformKind::Summarize, "Text"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upstream_error");
}
