use std::path::PathBuf;
use std::sync::Arc;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use shared::protocol::{DATA_PATH, HEALTH_PATH, PAGE_PATH};
use shared::types::DataResponse;
use crate::aggregator::Aggregator;
use crate::config::ViewerConfig;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub viewer: Arc<ViewerConfig>,
    pub static_page: Arc<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PAGE_PATH, get(serve_page))
        .route(DATA_PATH, get(get_data))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

async fn serve_page(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.static_page.as_path()).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Error reading {}: {}", state.static_page.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_data(State(state): State<AppState>) -> Json<DataResponse> {
    let viewer = &state.viewer;
    let result = state
        .aggregator
        .aggregate(
            &viewer.project,
            &viewer.location,
            &viewer.identifying_label,
            viewer.max_revisions,
        )
        .await;

    match result {
        Ok(rows) => Json(DataResponse { data: Some(rows) }),
        Err(e) => {
            tracing::error!("Failed to aggregate revisions: {}", e);
            Json(DataResponse { data: None })
        }
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "OK\n")
}
