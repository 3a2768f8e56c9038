use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{cache::CacheInfo, middleware::RequestId, routes::AppState};

/// Route cache counters at the top level, recommendation cache nested
#[derive(Debug, Serialize)]
pub struct CacheInfoResponse {
    #[serde(flatten)]
    pub routes: CacheInfo,
    pub recommendations: CacheInfo,
}

/// Handler for clearing the route and recommendation caches
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> Json<Value> {
    state.routing.cache().clear().await;
    state.recommendation_cache.clear().await;

    tracing::info!(request_id = %request_id, "Caches cleared");

    Json(json!({ "message": "Cache cleared successfully" }))
}

pub async fn cache_info(State(state): State<Arc<AppState>>) -> Json<CacheInfoResponse> {
    Json(CacheInfoResponse {
        routes: state.routing.cache().info().await,
        recommendations: state.recommendation_cache.info().await,
    })
}
