//! Identity service HTTP server.

use agora_core::environment::{SystemClock, UuidIdGenerator};
use agora_core::token::TokenSigner;
use agora_identity::{IdentityService, config::Config, password::Argon2Hasher, router};
use agora_postgres::{PgRefreshTokenStore, PgUserStore, Schema};
use agora_web::server::{init_tracing, shutdown_signal};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("agora_identity=info,agora_web=info");

    info!("Starting identity service");
    let config = Config::from_env()?;
    info!(port = config.server.port, "Configuration loaded");

    let pool = agora_postgres::connect(&config.database_url, config.database_max_connections).await?;
    Schema::Identity.migrate(&pool).await?;

    let service = IdentityService::new(
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool)),
        Arc::new(Argon2Hasher),
        TokenSigner::with_ttl(
            &config.jwt_secret,
            chrono::Duration::minutes(config.access_token_ttl_minutes),
        ),
        Arc::new(SystemClock),
        Arc::new(UuidIdGenerator),
    )
    .with_refresh_ttl(chrono::Duration::days(config.refresh_token_ttl_days));
    let service = Arc::new(service);

    // Hourly sweep of expired refresh tokens
    let sweeper = Arc::clone(&service);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.purge_expired_tokens().await {
                tracing::warn!(error = %e, "Failed to purge expired refresh tokens");
            }
        }
    });

    let app = router(service);

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Identity service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Identity service stopped");
    Ok(())
}
