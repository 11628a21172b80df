//! Post service HTTP server.

use agora_cache::{CacheAside, RedisCacheStore};
use agora_core::environment::{SystemClock, UuidIdGenerator};
use agora_core::event_bus::EventBus;
use agora_postgres::{PgCommentStore, PgLikeStore, PgPostStore, Schema};
use agora_posts::peers::{HttpMediaLookup, HttpUserLookup};
use agora_posts::{AppState, FeedReader, Interactions, PostService, config::Config, router};
use agora_redpanda::RedpandaEventBus;
use agora_web::server::{init_tracing, shutdown_signal};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("agora_posts=info,agora_web=info,agora_cache=info");

    info!("Starting post service");
    let config = Config::from_env();
    info!(
        port = config.server.port,
        identity = %config.identity_service_url,
        media = %config.media_service_url,
        "Configuration loaded"
    );

    let pool = agora_postgres::connect(&config.database_url, config.database_max_connections).await?;
    Schema::Posts.migrate(&pool).await?;

    let cache = match RedisCacheStore::connect(&config.redis_url, config.redis_timeout()).await {
        Ok(store) => {
            info!("Connected to Redis");
            CacheAside::new(Arc::new(store), config.cache_ttl())
        }
        Err(e) => {
            warn!(error = %e, "Redis unreachable, running without cache");
            CacheAside::disabled()
        }
    };

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.event_bus.brokers.clone())
            .topic(config.event_bus.topic.clone())
            .build()?,
    );
    info!(brokers = %config.event_bus.brokers, topic = %config.event_bus.topic, "Event bus ready");

    let feed = FeedReader::new(
        Arc::new(HttpUserLookup::new(&config.identity_service_url, config.peer_timeout())?),
        Arc::new(HttpMediaLookup::new(&config.media_service_url, config.peer_timeout())?),
        config.peer_timeout(),
    );
    let posts = Arc::new(PgPostStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let ids = Arc::new(UuidIdGenerator);

    let state = AppState {
        posts: Arc::new(PostService::new(
            posts.clone(),
            bus,
            cache.clone(),
            feed.clone(),
            clock.clone(),
            ids.clone(),
        )),
        interactions: Arc::new(Interactions::new(
            posts,
            Arc::new(PgLikeStore::new(pool.clone())),
            Arc::new(PgCommentStore::new(pool)),
            cache,
            feed,
            clock,
            ids,
        )),
    };

    let app = router(state);

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Post service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Post service stopped");
    Ok(())
}
