//! API gateway HTTP server.

use agora_cache::RedisWindowCounter;
use agora_core::environment::SystemClock;
use agora_core::token::TokenSigner;
use agora_gateway::rate_limit::parse_cidrs;
use agora_gateway::{Authenticator, GatewayState, Proxy, RateLimiter, config::Config, router};
use agora_web::server::{init_tracing, shutdown_signal};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("agora_gateway=info,agora_web=info,agora_cache=info");

    info!("Starting API gateway");
    let config = Config::from_env()?;
    info!(
        port = config.server.port,
        identity = %config.upstreams.identity,
        posts = %config.upstreams.posts,
        media = %config.upstreams.media,
        search = %config.upstreams.search,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    let redis = agora_cache::connect(&config.redis_url, config.redis_timeout()).await?;
    info!("Connected to Redis");

    let bypass = parse_cidrs(&config.rate_limit.health_check_cidrs);
    let state = GatewayState {
        auth: Authenticator::new(TokenSigner::new(&config.jwt_secret)),
        limiter: RateLimiter::new(
            Arc::new(RedisWindowCounter::new(redis)),
            Arc::new(SystemClock),
            config.rate_limit.max_requests,
            config.rate_limit.window(),
            bypass,
        ),
        proxy: Arc::new(Proxy::new(
            &config.upstreams,
            config.upstream_timeout(),
            config.max_body_bytes,
        )?),
        trust_forwarded_for: config.rate_limit.trust_forwarded_for,
    };

    let app = router(state);

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "API gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API gateway stopped");
    Ok(())
}
