// HTTP request handlers
use crate::domain::panel::Theme;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RangeRequest {
    pub range: String,
}

#[derive(Deserialize)]
pub struct ThemeRequest {
    pub theme: Theme,
}

#[derive(Deserialize)]
pub struct SizeRequest {
    pub width: u32,
    pub height: u32,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_panels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard_service.panels())
}

/// Last rendered chart for a panel
pub async fn panel_snapshot(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let Some(surface) = state.dashboard_service.surface(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match surface.latest() {
        Some(frame) => ([(header::CONTENT_TYPE, "application/json")], frame).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Stream every chart update for a panel as newline-delimited JSON
pub async fn stream_panel(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    match state.dashboard_service.surface(&id) {
        Some(surface) => {
            let rx = surface.subscribe();
            stream_from_receiver(surface.latest(), rx).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn resize_panel(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SizeRequest>,
) -> StatusCode {
    if state.dashboard_service.resize(&id, request.width, request.height) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn view_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard_service.summary())
}

pub async fn set_range(State(state): State<Arc<AppState>>, Json(request): Json<RangeRequest>) -> Response {
    match state.dashboard_service.set_range(&request.range) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

pub async fn set_theme(State(state): State<Arc<AppState>>, Json(request): Json<ThemeRequest>) -> impl IntoResponse {
    Json(state.dashboard_service.set_theme(request.theme).await)
}

pub async fn reload_view(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard_service.reload().await)
}

/// Collector process control pass-through
pub async fn control(Path(act): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.control_service.control(&act).await)
}

pub async fn machine_list(Path(category): Path<String>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.control_service.machine_list(&category).await)
}

pub async fn db_tables(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.control_service.db_tables().await)
}
