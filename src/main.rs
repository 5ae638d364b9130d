use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::info;

use daybreak::clock::SystemClock;
use daybreak::config::AppConfig;
use daybreak::routing::Resolver;
use daybreak::routing::routes::{RoutingRouteState, routing_routes};
use daybreak::sequences::StepTracker;
use daybreak::sequences::routes::{SequenceRouteState, sequence_routes};
use daybreak::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let clock = Arc::new(SystemClock);

    let resolver = Arc::new(Resolver::new(
        Arc::clone(&db),
        clock.clone(),
        config.default_reflection_time,
    ));
    let tracker = Arc::new(StepTracker::new(Arc::clone(&db), clock));

    let app = axum::Router::new()
        .merge(routing_routes(RoutingRouteState {
            resolver,
            db: Arc::clone(&db),
        }))
        .merge(sequence_routes(SequenceRouteState {
            tracker,
            support_chat_url: config.support_chat_url.clone(),
        }))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        %addr,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Daybreak listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
