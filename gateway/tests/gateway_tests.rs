//! Gateway routed against mock upstreams.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agora_core::environment::SystemClock;
use agora_core::token::TokenSigner;
use agora_gateway::config::UpstreamConfig;
use agora_gateway::rate_limit::parse_cidrs;
use agora_gateway::{Authenticator, GatewayState, Proxy, RateLimiter, router};
use agora_testing::InMemoryWindowCounter;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "gateway-test-secret";

fn gateway(upstream: &str, counter: &InMemoryWindowCounter, max_requests: u64) -> Router {
    let upstreams = UpstreamConfig {
        identity: upstream.to_string(),
        posts: upstream.to_string(),
        media: upstream.to_string(),
        // Nothing listens on port 1
        search: "http://127.0.0.1:1".to_string(),
    };
    router(GatewayState {
        auth: Authenticator::new(TokenSigner::new(SECRET)),
        limiter: RateLimiter::new(
            Arc::new(counter.clone()),
            Arc::new(SystemClock),
            max_requests,
            Duration::from_secs(900),
            parse_cidrs(&["10.0.0.0/8".to_string()]),
        ),
        proxy: Arc::new(Proxy::new(&upstreams, Duration::from_secs(2), 1024 * 1024).unwrap()),
        trust_forwarded_for: true,
    })
}

fn token(user_id: &str) -> String {
    TokenSigner::new(SECRET).issue(user_id, "alice", Utc::now()).unwrap()
}

fn request(method: Method, uri: &str, ip: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", ip)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn protected_route_without_token_is_rejected_before_forwarding() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let app = gateway(&upstream.uri(), &InMemoryWindowCounter::new(), 100);

    let (status, body) = send(
        &app,
        request(Method::GET, "/v1/posts/all-posts", "203.0.113.1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        request(Method::GET, "/v1/posts/all-posts", "203.0.113.1")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verified_subject_replaces_the_client_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts/all-posts"))
        .and(query_param("page", "2"))
        .and(header_is("x-user-id", "u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "posts": []})))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = gateway(&upstream.uri(), &InMemoryWindowCounter::new(), 100);

    let (status, body) = send(
        &app,
        request(Method::GET, "/v1/posts/all-posts?page=2", "203.0.113.1")
            .header(header::AUTHORIZATION, format!("Bearer {}", token("u1")))
            .header("x-user-id", "someone-else")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posts"], json!([]));
}

#[tokio::test]
async fn auth_prefix_needs_no_token_and_passes_cookies_back() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header_is("content-type", "application/json"))
        .and(body_string(r#"{"email":"a@example.com","password":"secret1"}"#))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refreshToken=abc; HttpOnly")
                .set_body_json(json!({"success": true, "accessToken": "t"})),
        )
        .expect(1)
        .mount(&upstream)
        .await;
    let app = gateway(&upstream.uri(), &InMemoryWindowCounter::new(), 100);

    let response = app
        .clone()
        .oneshot(
            request(Method::POST, "/v1/auth/login", "203.0.113.1")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from(r#"{"email":"a@example.com","password":"secret1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::SET_COOKIE).unwrap(),
        "refreshToken=abc; HttpOnly"
    );
}

#[tokio::test]
async fn multipart_uploads_keep_their_content_type() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/media/upload"))
        .and(header_is("content-type", "multipart/form-data; boundary=xyz"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = gateway(&upstream.uri(), &InMemoryWindowCounter::new(), 100);

    let (status, _) = send(
        &app,
        request(Method::POST, "/v1/media/upload", "203.0.113.1")
            .header(header::AUTHORIZATION, format!("Bearer {}", token("u1")))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=xyz")
            .body(Body::from("--xyz--\r\n"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    let app = gateway("http://127.0.0.1:1", &InMemoryWindowCounter::new(), 100);

    let (status, body) = send(
        &app,
        request(Method::GET, "/v1/search/posts?query=hello", "203.0.113.1")
            .header(header::AUTHORIZATION, format!("Bearer {}", token("u1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_prefix_is_not_found() {
    let app = gateway("http://127.0.0.1:1", &InMemoryWindowCounter::new(), 100);
    let (status, _) = send(
        &app,
        request(Method::GET, "/v1/nothing-here", "203.0.113.1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn limit_holds_across_gateway_instances_sharing_a_counter() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&upstream)
        .await;
    let counter = InMemoryWindowCounter::new();
    let first = gateway(&upstream.uri(), &counter, 3);
    let second = gateway(&upstream.uri(), &counter, 3);

    let call = |app: &Router, ip: &str| {
        let app = app.clone();
        let request = request(Method::POST, "/v1/auth/refresh-token", ip)
            .body(Body::empty())
            .unwrap();
        async move { send(&app, request).await }
    };

    assert_eq!(call(&first, "198.51.100.7").await.0, StatusCode::OK);
    assert_eq!(call(&second, "198.51.100.7").await.0, StatusCode::OK);
    assert_eq!(call(&first, "198.51.100.7").await.0, StatusCode::OK);

    let (status, body) = call(&second, "198.51.100.7").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Too many requests");

    // Another client is unaffected; health-check ranges are never limited
    assert_eq!(call(&first, "198.51.100.8").await.0, StatusCode::OK);
    for _ in 0..20 {
        assert_eq!(call(&second, "10.0.0.5").await.0, StatusCode::OK);
    }
}

#[tokio::test]
async fn health_skips_rate_limit_and_auth() {
    let counter = InMemoryWindowCounter::new();
    let app = gateway("http://127.0.0.1:1", &counter, 1);

    for _ in 0..5 {
        let (status, body) = send(
            &app,
            request(Method::GET, "/health", "203.0.113.1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "api-gateway");
    }
}

#[tokio::test]
async fn counter_outage_lets_requests_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&upstream)
        .await;
    let counter = InMemoryWindowCounter::new();
    counter.set_available(false);
    let app = gateway(&upstream.uri(), &counter, 1);

    for _ in 0..3 {
        let (status, _) = send(
            &app,
            request(Method::POST, "/v1/auth/logout", "203.0.113.1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
