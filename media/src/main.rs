//! Media service: HTTP server plus the media cleanup subscriber.

use agora_core::environment::{SystemClock, UuidIdGenerator};
use agora_core::event_bus::EventBus;
use agora_core::events::RoutingKey;
use agora_media::{FilesystemBlobStore, MediaCleanupProjection, MediaService, config::Config, router};
use agora_postgres::{PgMediaStore, Schema};
use agora_projections::EventSubscriber;
use agora_redpanda::RedpandaEventBus;
use agora_web::server::{init_tracing, shutdown_signal};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("agora_media=info,agora_projections=info,agora_web=info");

    info!("Starting media service");
    let config = Config::from_env();
    info!(
        port = config.server.port,
        media_root = %config.media_root,
        max_upload_bytes = config.max_upload_bytes,
        "Configuration loaded"
    );

    let pool = agora_postgres::connect(&config.database_url, config.database_max_connections).await?;
    Schema::Media.migrate(&pool).await?;

    let media = Arc::new(PgMediaStore::new(pool));
    let blobs = Arc::new(FilesystemBlobStore::new(
        config.media_root.clone(),
        config.media_public_url.clone(),
    ));

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.event_bus.brokers.clone())
            .topic(config.event_bus.topic.clone())
            .build()?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriber = EventSubscriber::new(config.subscription_name.clone()).on(
        RoutingKey::PostDeleted,
        Arc::new(MediaCleanupProjection::new(media.clone(), blobs.clone())),
    );
    let subscriber_task = tokio::spawn(async move {
        if let Err(e) = subscriber.run(bus, shutdown_rx).await {
            error!(error = %e, "Media cleanup subscriber stopped");
        }
    });

    let service = Arc::new(MediaService::new(
        media,
        blobs.clone(),
        Arc::new(SystemClock),
        Arc::new(UuidIdGenerator),
        config.max_upload_bytes,
    ));
    let app = router(service, Some(blobs.root().to_path_buf()));

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Media service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = subscriber_task.await {
        error!(error = %e, "Subscriber task panicked");
    }

    info!("Media service stopped");
    Ok(())
}
