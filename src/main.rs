/// Observation ingest service: validates submissions against SatChecker and stores them
mod clients;
mod config;
mod csv_io;
mod domain;
mod errors;
mod handlers;
mod pipeline;
mod repo;
mod routes;
mod services;
mod utils;

#[cfg(test)]
mod fakes;

use crate::clients::SatCheckerClient;
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::pipeline::Pipeline;
use crate::repo::{init_db, PgStore};
use crate::routes::build_router;
use crate::services::ObservationService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = AppConfig::from_env()?;
    info!(
        satchecker = %config.satchecker.base_url,
        concurrency = config.batch_concurrency,
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established");

    init_db(&pool).await?;
    info!("Database schema initialized");

    let store = Arc::new(PgStore::new(pool));
    let satchecker = Arc::new(SatCheckerClient::new(&config.satchecker)?);
    let pipeline = Pipeline::new(satchecker);

    let state = AppState {
        observation_service: Arc::new(ObservationService::new(
            pipeline,
            store,
            config.batch_concurrency,
        )),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("score_ingest listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
