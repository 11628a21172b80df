//! Search service: HTTP server plus the search projection subscriber.

use agora_core::event_bus::EventBus;
use agora_core::events::RoutingKey;
use agora_postgres::{PgSearchIndex, Schema};
use agora_projections::EventSubscriber;
use agora_redpanda::RedpandaEventBus;
use agora_search::{SearchProjection, SearchService, config::Config, router};
use agora_web::server::{init_tracing, shutdown_signal};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("agora_search=info,agora_projections=info,agora_web=info");

    info!("Starting search service");
    let config = Config::from_env();
    info!(port = config.server.port, subscription = %config.subscription_name, "Configuration loaded");

    let pool = agora_postgres::connect(&config.database_url, config.database_max_connections).await?;
    Schema::Search.migrate(&pool).await?;
    let index = Arc::new(PgSearchIndex::new(pool));

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.event_bus.brokers.clone())
            .topic(config.event_bus.topic.clone())
            .build()?,
    );

    let projection = Arc::new(SearchProjection::new(index.clone()));
    let subscriber = EventSubscriber::new(config.subscription_name.clone())
        .on(RoutingKey::PostCreated, projection.clone())
        .on(RoutingKey::PostDeleted, projection);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriber_task = tokio::spawn(async move {
        if let Err(e) = subscriber.run(bus, shutdown_rx).await {
            error!(error = %e, "Search subscriber stopped");
        }
    });

    let app = router(Arc::new(SearchService::new(index)));

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Search service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = subscriber_task.await {
        error!(error = %e, "Subscriber task panicked");
    }

    info!("Search service stopped");
    Ok(())
}
