mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::{eventually, pdf_bytes, stack_with, test_config, FakeEmbedder, StalledEmbedder};
use pdf_qa::types::NO_MATCH_ANSWER;

const BOUNDARY: &str = "pdfqa-test-boundary";

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart(uri: &str, files: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (filename, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"documents\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_index_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(FakeEmbedder));
    let router = stack.router();

    let (status, body) = send(&router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "Hello": "World" }));

    let (status, _) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submit_then_get_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(StalledEmbedder));
    let router = stack.router();

    let (status, submitted) = send(
        &router,
        post_json("/users/alice/queries", json!({ "query_text": "what is rust?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["user_id"], "alice");
    assert_eq!(submitted["is_complete"], false);
    assert!(submitted.get("answer_text").is_none());

    let query_id = submitted["query_id"].as_str().unwrap();
    assert_eq!(query_id.len(), 32);

    let (status, fetched) = send(&router, get(&format!("/users/alice/queries/{}", query_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["query_id"], query_id);
    assert_eq!(fetched["query_text"], "what is rust?");
    assert_eq!(fetched["is_complete"], false);
    assert!(fetched.get("answer_text").is_none());
}

#[tokio::test]
async fn test_worker_completes_query() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(FakeEmbedder));
    let router = stack.router();

    let (_, submitted) = send(
        &router,
        post_json("/users/alice/queries", json!({ "query_text": "rust code" })),
    )
    .await;
    let uri = format!("/users/alice/queries/{}", submitted["query_id"].as_str().unwrap());

    let done = eventually(|| {
        let router = router.clone();
        let uri = uri.clone();
        async move { send(&router, get(&uri)).await.1["is_complete"] == true }
    })
    .await;
    assert!(done);

    let (_, fetched) = send(&router, get(&uri)).await;
    assert_eq!(fetched["answer_text"], NO_MATCH_ANSWER);
    assert_eq!(fetched["sources"], json!([]));
}

#[tokio::test]
async fn test_foreign_and_unknown_queries_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(StalledEmbedder));
    let router = stack.router();

    let (_, submitted) = send(
        &router,
        post_json("/users/alice/queries", json!({ "query_text": "mine" })),
    )
    .await;
    let query_id = submitted["query_id"].as_str().unwrap();

    let (status, body) = send(&router, get(&format!("/users/bob/queries/{}", query_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _) = send(&router, get("/users/alice/queries/doesnotexist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_blank_query_and_bad_user() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(StalledEmbedder));
    let router = stack.router();

    let (status, _) = send(
        &router,
        post_json("/users/alice/queries", json!({ "query_text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        post_json("/users/bad%20user/queries", json!({ "query_text": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_is_per_user_and_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(StalledEmbedder));
    let router = stack.router();

    for text in ["first", "second", "third"] {
        send(
            &router,
            post_json("/users/alice/queries", json!({ "query_text": text })),
        )
        .await;
    }
    send(
        &router,
        post_json("/users/bob/queries", json!({ "query_text": "bob's" })),
    )
    .await;

    let (status, body) = send(&router, get("/users/alice/queries")).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["query_text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["third", "second", "first"]);

    let (_, body) = send(&router, get("/users/alice/queries?count=2")).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(&router, get("/users/carol/queries")).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_legacy_query_routes() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(StalledEmbedder));
    let router = stack.router();

    let (status, submitted) = send(&router, post_json("/query", json!({ "query_text": "rvalue" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["user_id"], "nobody");

    let query_id = submitted["query_id"].as_str().unwrap();
    let (status, fetched) = send(&router, get(&format!("/query?query_id={}", query_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["query_text"], "rvalue");

    let (status, _) = send(&router, get("/query")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_stores_and_serves_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(FakeEmbedder));
    let router = stack.router();

    let data = b"%PDF-1.4 not really a pdf".to_vec();
    let (status, body) = send(
        &router,
        multipart(
            "/users/alice/documents",
            &[("my notes.pdf", "application/pdf", data.clone())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"]
        .as_str()
        .unwrap()
        .ends_with("/files/source/alice/my%20notes.pdf"));
    assert_eq!(body["urls"].as_array().unwrap().len(), 1);
    assert!(dir.path().join("bucket/source/alice/my notes.pdf").exists());

    let (status, listed) = send(&router, get("/users/alice/documents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["filename"], "my notes.pdf");
    assert_eq!(listed[0]["key"], "source/alice/my notes.pdf");

    let response = router
        .clone()
        .oneshot(get("/files/source/alice/my%20notes.pdf"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(served.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_uploaded_pdf_answers_with_page_sources() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(FakeEmbedder));
    let router = stack.router();

    let (status, body) = send(
        &router,
        multipart(
            "/users/alice/documents",
            &[("guide.pdf", "application/pdf", pdf_bytes(&["rust alpha", "ocean beta"]))],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["ingest_id"].is_string());

    let ingested = eventually(|| {
        let router = router.clone();
        async move { send(&router, get("/stats")).await.1["completed"] == 1 }
    })
    .await;
    assert!(ingested);

    let (_, submitted) = send(
        &router,
        post_json("/users/alice/queries", json!({ "query_text": "ocean" })),
    )
    .await;
    let uri = format!("/users/alice/queries/{}", submitted["query_id"].as_str().unwrap());

    let done = eventually(|| {
        let router = router.clone();
        let uri = uri.clone();
        async move { send(&router, get(&uri)).await.1["is_complete"] == true }
    })
    .await;
    assert!(done);

    let (_, fetched) = send(&router, get(&uri)).await;
    assert_eq!(fetched["answer_text"], "generated answer");
    assert_eq!(
        fetched["sources"],
        json!([
            { "filename": "guide.pdf", "page": 2 },
            { "filename": "guide.pdf", "page": 1 }
        ])
    );

    let (_, stats) = send(&router, get("/stats")).await;
    assert_eq!(stats["failed"], 0);
}

#[tokio::test]
async fn test_upload_limits() {
    let dir = tempfile::tempdir().unwrap();
    let stack = stack_with(test_config(dir.path()), Arc::new(FakeEmbedder));
    let router = stack.router();

    let (status, _) = send(
        &router,
        multipart(
            "/users/alice/documents",
            &[("notes.txt", "text/plain", b"hello".to_vec())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send(
        &router,
        multipart(
            "/users/alice/documents",
            &[("big.pdf", "application/pdf", vec![b'x'; 300 * 1024])],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let small = || b"%PDF-1.4".to_vec();
    let (status, _) = send(
        &router,
        multipart(
            "/users/alice/documents",
            &[
                ("a.pdf", "application/pdf", small()),
                ("b.pdf", "application/pdf", small()),
                ("c.pdf", "application/pdf", small()),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = send(&router, get("/users/alice/documents")).await;
    assert_eq!(listed, json!([]));
}
