//! Register, post, search, delete: every hop through the gateway.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agora_tests::{Stack, eventually};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

const SETTLE: Duration = Duration::from_secs(5);

async fn call(
    gateway: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = gateway.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn upload(gateway: &Router, token: &str) -> String {
    let boundary = "e2e-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"sunset.png\"\r\n\
         Content-Type: image/png\r\n\r\npng-bytes\r\n--{boundary}--\r\n"
    );
    let request = Request::post("/v1/media/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = gateway.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    body["mediaId"].as_str().unwrap().to_string()
}

async fn search_hits(gateway: &Router, token: &str, query: &str) -> Vec<String> {
    let (status, body) = call(
        gateway,
        Method::GET,
        &format!("/v1/search/posts?query={query}"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["postId"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn post_lifecycle_propagates_to_search_and_media() {
    agora_testing::init_test_tracing();
    let stack = Stack::start().await.unwrap();
    let gateway = &stack.gateway;

    let (status, registered) = call(
        gateway,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({"username": "alice", "email": "alice@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = registered["userId"].as_str().unwrap().to_string();

    let (status, session) = call(
        gateway,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = session["accessToken"].as_str().unwrap().to_string();

    let media_id = upload(gateway, &token).await;

    let (status, created) = call(
        gateway,
        Method::POST,
        "/v1/posts/create-post",
        Some(&token),
        Some(json!({"content": "hello", "mediaIds": [media_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = created["postId"].as_str().unwrap().to_string();

    assert!(
        eventually(SETTLE, || async { search_hits(gateway, &token, "hello").await.contains(&post_id) }).await,
        "post never became searchable"
    );

    let (status, feed) = call(gateway, Method::GET, "/v1/posts/all-posts", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["posts"][0]["id"], post_id.as_str());
    assert_eq!(feed["posts"][0]["author"]["id"], user_id.as_str());
    assert_eq!(feed["posts"][0]["author"]["username"], "alice");
    assert_eq!(feed["posts"][0]["media"][0]["id"], media_id.as_str());

    let (status, _) = call(
        gateway,
        Method::DELETE,
        &format!("/v1/posts/{post_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert!(
        eventually(SETTLE, || async { !search_hits(gateway, &token, "hello").await.contains(&post_id) }).await,
        "deleted post is still searchable"
    );
    assert!(
        eventually(SETTLE, || async { !stack.media.contains(&media_id) && stack.blobs.is_empty() }).await,
        "media of the deleted post was not cleaned up"
    );
    assert!(stack.search_index.is_empty());
    assert!(stack.bus.exhausted().is_empty());
}

#[tokio::test]
async fn backend_routes_are_closed_without_a_token() {
    let stack = Stack::start().await.unwrap();

    for uri in ["/v1/posts/all-posts", "/v1/search/posts?query=hello", "/v1/media/get-media"] {
        let (status, _) = call(&stack.gateway, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn feed_page_referencing_more_media_than_one_lookup_still_resolves() {
    let stack = Stack::start().await.unwrap();
    let gateway = &stack.gateway;

    call(
        gateway,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({"username": "bob", "email": "bob@example.com", "password": "secret1"})),
    )
    .await;
    let (_, session) = call(
        gateway,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({"email": "bob@example.com", "password": "secret1"})),
    )
    .await;
    let token = session["accessToken"].as_str().unwrap().to_string();
    let real = upload(gateway, &token).await;

    // 11 posts x 10 ids: 110 distinct media ids on one page, one of them real.
    for post in 0..11 {
        let media_ids: Vec<String> = (0..10)
            .map(|n| {
                if post == 0 && n == 0 {
                    real.clone()
                } else {
                    format!("missing-{post}-{n}")
                }
            })
            .collect();
        let (status, _) = call(
            gateway,
            Method::POST,
            "/v1/posts/create-post",
            Some(&token),
            Some(json!({"content": format!("post {post}"), "mediaIds": media_ids})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, feed) = call(
        gateway,
        Method::GET,
        "/v1/posts/all-posts?page=1&limit=20",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let posts = feed["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 11);
    let with_media: Vec<&Value> = posts
        .iter()
        .filter(|post| !post["media"].as_array().unwrap().is_empty())
        .collect();
    assert_eq!(with_media.len(), 1);
    assert_eq!(with_media[0]["media"][0]["id"], real.as_str());
    assert!(posts.iter().all(|post| post["author"]["username"] == "bob"));
}
