//! Router-level tests for the media service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agora_media::{MediaService, router};
use agora_testing::{InMemoryBlobStore, InMemoryMediaStore, SequentialIdGenerator, test_clock};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "agora-test-boundary";

struct Harness {
    app: Router,
    media: InMemoryMediaStore,
    blobs: InMemoryBlobStore,
}

fn harness(max_bytes: usize) -> Harness {
    let media = InMemoryMediaStore::new();
    let blobs = InMemoryBlobStore::new();
    let service = MediaService::new(
        Arc::new(media.clone()),
        Arc::new(blobs.clone()),
        Arc::new(test_clock()),
        Arc::new(SequentialIdGenerator::new("media")),
        max_bytes,
    );
    Harness {
        app: router(Arc::new(service), None),
        media,
        blobs,
    }
}

fn multipart(field: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(user: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/media/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn upload_records_the_media_and_returns_its_url() {
    let h = harness(1024);
    let (status, body) = send(
        &h.app,
        upload_request(Some("u1"), multipart("file", "cat.png", b"meow")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["mediaId"], "media-1");
    assert_eq!(body["url"], "memory://blob-1-cat.png");
    assert!(h.media.contains("media-1"));
    assert!(h.blobs.contains("blob-1-cat.png"));
}

#[tokio::test]
async fn upload_requires_the_gateway_subject_header() {
    let h = harness(1024);
    let (status, _) = send(&h.app, upload_request(None, multipart("file", "cat.png", b"meow"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn upload_without_a_file_field_is_a_bad_request() {
    let h = harness(1024);
    let (status, body) = send(
        &h.app,
        upload_request(Some("u1"), multipart("avatar", "cat.png", b"meow")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let h = harness(16);
    let (status, _) = send(
        &h.app,
        upload_request(Some("u1"), multipart("file", "big.png", &[0u8; 64])),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.media.is_empty());
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn get_media_filters_by_ids_and_ignores_unknown_ones() {
    let h = harness(1024);
    send(&h.app, upload_request(Some("u1"), multipart("file", "a.png", b"a"))).await;
    send(&h.app, upload_request(Some("u1"), multipart("file", "b.png", b"b"))).await;

    let request = Request::get("/api/media/get-media?ids=media-2,ghost")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "media-2");
    assert_eq!(results[0]["originalName"], "b.png");

    let all = Request::get("/api/media/get-media").body(Body::empty()).unwrap();
    let (_, body) = send(&h.app, all).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn health_is_public() {
    let h = harness(1024);
    let (status, body) = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "media-service");
}
