//! In-process Agora stack for cross-service scenarios.
//!
//! [`Stack::start`] runs identity, post, media and search services on
//! ephemeral local ports over in-memory stores and one shared
//! [`InMemoryEventBus`], starts the search and media-cleanup subscribers, and
//! builds a gateway router in front of them. Post-service reaches its peers
//! over real HTTP, exactly as in production.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use agora_cache::CacheAside;
use agora_core::environment::SystemClock;
use agora_core::event_bus::EventBus;
use agora_core::events::RoutingKey;
use agora_core::token::TokenSigner;
use agora_gateway::config::UpstreamConfig;
use agora_gateway::{Authenticator, GatewayState, Proxy, RateLimiter};
use agora_identity::IdentityService;
use agora_identity::password::Argon2Hasher;
use agora_media::{MediaCleanupProjection, MediaService};
use agora_posts::peers::{HttpMediaLookup, HttpUserLookup};
use agora_posts::{AppState, FeedReader, Interactions, PostService};
use agora_projections::EventSubscriber;
use agora_search::{SearchProjection, SearchService};
use agora_testing::{
    InMemoryBlobStore, InMemoryCacheStore, InMemoryCommentStore, InMemoryEventBus,
    InMemoryLikeStore, InMemoryMediaStore, InMemoryPostStore, InMemoryRefreshTokenStore,
    InMemorySearchIndex, InMemoryUserStore, InMemoryWindowCounter, SequentialIdGenerator,
};
use axum::Router;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const JWT_SECRET: &str = "end-to-end-secret";
const PEER_TIMEOUT: Duration = Duration::from_secs(2);

/// Every service of the system wired together in one process.
pub struct Stack {
    /// Gateway router; send requests with `tower::ServiceExt::oneshot`
    pub gateway: Router,
    /// Bus shared by post-service and the subscribers
    pub bus: InMemoryEventBus,
    /// Search-service's index
    pub search_index: InMemorySearchIndex,
    /// Media-service's rows
    pub media: InMemoryMediaStore,
    /// Media-service's blob provider
    pub blobs: InMemoryBlobStore,
    tasks: Vec<JoinHandle<()>>,
}

impl Stack {
    /// Start every service.
    ///
    /// # Errors
    ///
    /// Fails if a listener cannot bind or a subscription cannot be opened.
    pub async fn start() -> anyhow::Result<Self> {
        let bus = InMemoryEventBus::new();
        let search_index = InMemorySearchIndex::new();
        let media = InMemoryMediaStore::new();
        let blobs = InMemoryBlobStore::new();
        let mut tasks = Vec::new();

        let identity = IdentityService::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(Argon2Hasher),
            TokenSigner::new(JWT_SECRET),
            Arc::new(SystemClock),
            Arc::new(SequentialIdGenerator::new("user")),
        );
        let identity_url = serve(agora_identity::router(Arc::new(identity)), &mut tasks).await?;

        let media_service = MediaService::new(
            Arc::new(media.clone()),
            Arc::new(blobs.clone()),
            Arc::new(SystemClock),
            Arc::new(SequentialIdGenerator::new("media")),
            agora_media::config::DEFAULT_MAX_UPLOAD_BYTES,
        );
        let media_url = serve(agora_media::router(Arc::new(media_service), None), &mut tasks).await?;

        let search_url = serve(
            agora_search::router(Arc::new(SearchService::new(Arc::new(search_index.clone())))),
            &mut tasks,
        )
        .await?;

        let posts = Arc::new(InMemoryPostStore::new());
        let cache = CacheAside::new(Arc::new(InMemoryCacheStore::new()), CacheAside::DEFAULT_TTL);
        let feed = FeedReader::new(
            Arc::new(HttpUserLookup::new(&identity_url, PEER_TIMEOUT)?),
            Arc::new(HttpMediaLookup::new(&media_url, PEER_TIMEOUT)?),
            PEER_TIMEOUT,
        );
        let state = AppState {
            posts: Arc::new(PostService::new(
                posts.clone(),
                Arc::new(bus.clone()),
                cache.clone(),
                feed.clone(),
                Arc::new(SystemClock),
                Arc::new(SequentialIdGenerator::new("post")),
            )),
            interactions: Arc::new(Interactions::new(
                posts,
                Arc::new(InMemoryLikeStore::new()),
                Arc::new(InMemoryCommentStore::new()),
                cache,
                feed,
                Arc::new(SystemClock),
                Arc::new(SequentialIdGenerator::new("comment")),
            )),
        };
        let posts_url = serve(agora_posts::router(state), &mut tasks).await?;

        let search_projection = Arc::new(SearchProjection::new(Arc::new(search_index.clone())));
        tasks.push(
            consume(
                &bus,
                EventSubscriber::new("search-service")
                    .on(RoutingKey::PostCreated, search_projection.clone())
                    .on(RoutingKey::PostDeleted, search_projection),
            )
            .await?,
        );
        tasks.push(
            consume(
                &bus,
                EventSubscriber::new("media-service").on(
                    RoutingKey::PostDeleted,
                    Arc::new(MediaCleanupProjection::new(
                        Arc::new(media.clone()),
                        Arc::new(blobs.clone()),
                    )),
                ),
            )
            .await?,
        );

        let upstreams = UpstreamConfig {
            identity: identity_url,
            posts: posts_url,
            media: media_url,
            search: search_url,
        };
        let gateway = agora_gateway::router(GatewayState {
            auth: Authenticator::new(TokenSigner::new(JWT_SECRET)),
            limiter: RateLimiter::new(
                Arc::new(InMemoryWindowCounter::new()),
                Arc::new(SystemClock),
                1_000,
                Duration::from_secs(900),
                Vec::new(),
            ),
            proxy: Arc::new(Proxy::new(&upstreams, Duration::from_secs(5), 8 * 1024 * 1024)?),
            trust_forwarded_for: false,
        });

        Ok(Self {
            gateway,
            bus,
            search_index,
            media,
            blobs,
            tasks,
        })
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Serve `router` on an ephemeral port, returning its base URL.
async fn serve(router: Router, tasks: &mut Vec<JoinHandle<()>>) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tasks.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Test server stopped");
        }
    }));
    Ok(format!("http://{addr}"))
}

/// Open the subscription now, then process deliveries in the background.
async fn consume(bus: &InMemoryEventBus, subscriber: EventSubscriber) -> anyhow::Result<JoinHandle<()>> {
    let mut deliveries = bus.subscribe(subscriber.subscription()).await?;
    Ok(tokio::spawn(async move {
        while let Some(delivery) = deliveries.next().await {
            match delivery {
                Ok(delivery) => subscriber.process(delivery).await,
                Err(e) => tracing::error!(error = %e, "Delivery failed"),
            }
        }
    }))
}

/// Poll `check` until it returns `true` or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
