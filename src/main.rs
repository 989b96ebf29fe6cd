//! guarantee-service entry point.
//!
//! Starts the Axum HTTP server and, when enabled, the nightly batch
//! scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use guarantee_service::api;
use guarantee_service::app_state::AppState;
use guarantee_service::clock::{Clock, SystemClock};
use guarantee_service::config::{LogFormat, ServiceConfig};
use guarantee_service::persistence::{
    GuaranteeStore, MemoryPlaySource, MemoryStore, PlaySource, PostgresStore,
};
use guarantee_service::service::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, rules = ?config.rules, "starting guarantee-service");

    // Build persistence layer
    let (store, plays): (Arc<dyn GuaranteeStore>, Arc<dyn PlaySource>) =
        if config.persistence_enabled {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .min_connections(config.database_min_connections)
                .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
                .connect(&config.database_url)
                .await
                .context("connecting to PostgreSQL")?;
            let pg = Arc::new(PostgresStore::new(pool));
            pg.migrate().await.context("running migrations")?;
            tracing::info!("using PostgreSQL persistence");
            (Arc::clone(&pg) as Arc<dyn GuaranteeStore>, pg as Arc<dyn PlaySource>)
        } else {
            tracing::warn!("persistence disabled, state is kept in memory");
            (
                Arc::new(MemoryStore::new()) as Arc<dyn GuaranteeStore>,
                Arc::new(MemoryPlaySource::new()) as Arc<dyn PlaySource>,
            )
        };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Build application state
    let app_state = AppState::new(
        Arc::clone(&store),
        plays,
        Arc::clone(&clock),
        config.rules,
        config.aggregation_concurrency,
    );

    // Start nightly batch
    if config.scheduler_enabled {
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&app_state.aggregator),
            Arc::clone(&app_state.decisions),
            store,
            clock,
            config.rules,
            config.schedule(),
        ));
        tokio::spawn(scheduler.run());
    }

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
