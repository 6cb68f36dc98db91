// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    control, db_tables, health_check, list_panels, machine_list, panel_snapshot, reload_view, resize_panel,
    set_range, set_theme, stream_panel, view_summary,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    // Gzip buffers chunks, so panel streams go out uncompressed.
    let compression = CompressionLayer::new()
        .compress_when(DefaultPredicate::new().and(NotForContentType::const_new("application/x-ndjson")));

    Router::new()
        .route("/healthz", get(health_check))
        .route("/panels", get(list_panels))
        .route("/panels/:id", get(panel_snapshot))
        .route("/panels/:id/stream", get(stream_panel))
        .route("/panels/:id/size", post(resize_panel))
        .route("/view", get(view_summary).post(set_range))
        .route("/view/theme", post(set_theme))
        .route("/view/reload", post(reload_view))
        .route("/api/control/:act", get(control))
        .route("/api/machine/:category", get(machine_list))
        .route("/api/db/tables", get(db_tables))
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
