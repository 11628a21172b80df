//! Search service driven through the bus and queried over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agora_core::environment::Clock;
use agora_core::event_bus::{EventBus, publish_event};
use agora_core::events::{PostCreated, PostDeleted, PostEvent, RoutingKey};
use agora_projections::EventSubscriber;
use agora_search::{SearchProjection, SearchService, router};
use agora_testing::{InMemoryEventBus, InMemorySearchIndex, test_clock};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    bus: InMemoryEventBus,
    index: InMemorySearchIndex,
    subscriber: EventSubscriber,
}

fn harness() -> Harness {
    let index = InMemorySearchIndex::new();
    let projection = Arc::new(SearchProjection::new(Arc::new(index.clone())));
    Harness {
        app: router(Arc::new(SearchService::new(Arc::new(index.clone())))),
        bus: InMemoryEventBus::new(),
        index,
        subscriber: EventSubscriber::new("search-service")
            .on(RoutingKey::PostCreated, projection.clone())
            .on(RoutingKey::PostDeleted, projection),
    }
}

fn created(id: &str, content: &str) -> PostEvent {
    PostEvent::Created(PostCreated {
        post_id: id.to_string(),
        user_id: "u1".to_string(),
        content: content.to_string(),
        created_at: test_clock().now(),
    })
}

fn deleted(id: &str) -> PostEvent {
    PostEvent::Deleted(PostDeleted {
        post_id: id.to_string(),
        user_id: "u1".to_string(),
        media_ids: vec![],
    })
}

async fn search(app: &Router, query: &str) -> (StatusCode, Value) {
    let request = Request::get(format!("/api/search/posts?query={query}"))
        .header("x-user-id", "u1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["postId"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn events_flow_into_and_out_of_the_index() {
    let h = harness();
    let mut deliveries = h.bus.subscribe(h.subscriber.subscription()).await.unwrap();

    publish_event(&h.bus, &created("p1", "hello world")).await.unwrap();
    publish_event(&h.bus, &created("p1", "hello world")).await.unwrap();
    for _ in 0..2 {
        h.subscriber.process(deliveries.next().await.unwrap().unwrap()).await;
    }
    let (status, body) = search(&h.app, "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post_ids(&body), vec!["p1"]);

    publish_event(&h.bus, &deleted("p1")).await.unwrap();
    publish_event(&h.bus, &deleted("p1")).await.unwrap();
    for _ in 0..2 {
        h.subscriber.process(deliveries.next().await.unwrap().unwrap()).await;
    }
    let (_, body) = search(&h.app, "hello").await;
    assert!(post_ids(&body).is_empty());
    assert!(h.index.is_empty());
    assert!(h.bus.exhausted().is_empty());
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
    let h = harness();
    let (status, body) = search(&h.app, "%20%20").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn search_requires_the_gateway_subject_header() {
    let h = harness();
    let request = Request::get("/api/search/posts?query=hello").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
