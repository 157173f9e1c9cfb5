//! Answer stream client tests against an in-process HTTP server.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;

use aula_core::{ChatRequest, HistoryEntry, StreamChunk};
use aula_stream::{AnswerContext, AnswerSource, AnswerStreamClient, StreamError};

// =============================================================================
// Helpers
// =============================================================================

fn ndjson(pieces: Vec<&'static str>) -> Response {
    let stream = futures::stream::iter(
        pieces
            .into_iter()
            .map(|p| Ok::<_, Infallible>(Bytes::from_static(p.as_bytes()))),
    );
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn chunked_ok() -> Response {
    ndjson(vec![
        "{\"text\":\"Para \"}\n{\"te",
        "xt\":\"subir...\",\"candidates\":[{\"groundingMetadata\":{\"groundingChunks\":[{\"web\":{\"uri\":\"https://docs.moodle.org/x\",\"title\":\"Moodle Docs\"}}]}}]}\n",
        "{\"text\":\" fin\"}",
    ])
}

async fn with_bad_line() -> Response {
    ndjson(vec!["{\"text\":\"valid1\"}\n{bad json\n{\"text\":\"valid2\"}\n"])
}

async fn upstream_down() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "upstream down"})),
    )
        .into_response()
}

async fn bad_gateway_without_detail() -> Response {
    (StatusCode::BAD_GATEWAY, Json(serde_json::json!({}))).into_response()
}

async fn plain_text_error() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response()
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Echo the decoded request back as a single chunk.
async fn echo(Json(req): Json<ChatRequest>) -> Response {
    let chunk = StreamChunk::text(serde_json::to_string(&req).unwrap());
    let line = format!("{}\n", serde_json::to_string(&chunk).unwrap());
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from(line),
    )
        .into_response()
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/ok", post(chunked_ok))
        .route("/bad-line", post(with_bad_line))
        .route("/down", post(upstream_down))
        .route("/bad-gateway", post(bad_gateway_without_detail))
        .route("/plain", post(plain_text_error))
        .route("/empty", post(no_content))
        .route("/echo", post(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn collect_texts(client: &AnswerStreamClient) -> Vec<String> {
    client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .unwrap()
        .map(|r| r.unwrap().text)
        .collect()
        .await
}

// =============================================================================
// Success paths
// =============================================================================

#[tokio::test]
async fn test_chunks_arrive_in_order_with_unterminated_tail() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/ok", base));

    let chunks: Vec<StreamChunk> = client
        .open_answer_stream("¿Cómo subo una tarea?", AnswerContext::Flat("ctx".into()))
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "Para ");
    assert_eq!(chunks[1].text, "subir...");
    assert_eq!(chunks[2].text, " fin");
    let uris: Vec<_> = chunks[1].web_sources().map(|w| w.uri.clone()).collect();
    assert_eq!(uris, vec!["https://docs.moodle.org/x".to_string()]);
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/bad-line", base));
    assert_eq!(collect_texts(&client).await, vec!["valid1", "valid2"]);
}

#[tokio::test]
async fn test_flat_request_body_shape() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/echo", base));

    let texts: Vec<String> = client
        .open_answer_stream("q", AnswerContext::Flat("docs".into()))
        .await
        .unwrap()
        .map(|r| r.unwrap().text)
        .collect()
        .await;

    let echoed: serde_json::Value = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(echoed, serde_json::json!({"query": "q", "context": "docs"}));
}

#[tokio::test]
async fn test_history_request_body_shape() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/echo", base));

    let history = vec![HistoryEntry::user("hola"), HistoryEntry::model("¡hola!")];
    let texts: Vec<String> = client
        .open_answer_stream("q", AnswerContext::History(history))
        .await
        .unwrap()
        .map(|r| r.unwrap().text)
        .collect()
        .await;

    let echoed: ChatRequest = serde_json::from_str(&texts[0]).unwrap();
    assert!(echoed.context.is_none());
    assert_eq!(echoed.history.unwrap().len(), 2);
}

#[tokio::test]
async fn test_each_call_opens_a_new_request() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/bad-line", base));
    assert_eq!(collect_texts(&client).await.len(), 2);
    assert_eq!(collect_texts(&client).await.len(), 2);
}

// =============================================================================
// Error paths
// =============================================================================

#[tokio::test]
async fn test_error_status_surfaces_server_message() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/down", base));
    let err = client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .err()
        .unwrap();
    assert_eq!(
        err,
        StreamError::Transport {
            status: 500,
            message: "upstream down".to_string()
        }
    );
}

#[tokio::test]
async fn test_error_status_without_detail_uses_status_message() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/bad-gateway", base));
    let err = client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Error del servidor: 502");
}

#[tokio::test]
async fn test_error_status_with_non_json_body() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/plain", base));
    let err = client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .err()
        .unwrap();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "Error de red o respuesta no válida.");
}

#[tokio::test]
async fn test_no_content_is_stream_unavailable() {
    let base = spawn_server().await;
    let client = AnswerStreamClient::new(format!("{}/empty", base));
    let err = client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .err()
        .unwrap();
    assert_eq!(err, StreamError::Unavailable);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    // Bind and drop to obtain a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AnswerStreamClient::new(format!("http://{}/api/chat", addr));
    let err = client
        .open_answer_stream("q", AnswerContext::Flat(String::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::Network(_)));
}
