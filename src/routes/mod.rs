/// Application routes configuration
use crate::handlers::{
    export_observation_ids, export_observations, get_stats, health, names_from_norad_id,
    norad_ids_from_name, submit_observation, upload_observations, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Observation ingest and export
        .route("/observations", post(submit_observation))
        .route("/observations/upload", post(upload_observations))
        .route("/observations/export", get(export_observations))
        .route("/observations/export-ids", get(export_observation_ids))
        .route("/stats", get(get_stats))
        // Catalog name tools
        .route("/tools/names-from-norad-id/:id", get(names_from_norad_id))
        .route("/tools/norad-ids-from-name", get(norad_ids_from_name))
        .with_state(state)
}
