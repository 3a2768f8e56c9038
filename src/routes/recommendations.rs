use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    cache::CacheKey,
    cached,
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{PoiId, PopularRoute, Recommendation, RecommenderStats},
    routes::AppState,
    services::nearby::{recommend_near, NearbyPoi},
};

const DEFAULT_COUNT: usize = 3;
const MAX_COUNT: usize = 10;
const DEFAULT_NEARBY_LIMIT: usize = 5;
const POPULAR_ROUTES_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default, alias = "current_route")]
    pub route: Vec<PoiId>,
    #[serde(default, alias = "num_recommendations")]
    pub count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub status: &'static str,
    pub recommendations: Vec<Recommendation>,
    pub route: Vec<PoiId>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct NearbyRequest {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub themes: Vec<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub recommendations: Vec<NearbyPoi>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PopularRoutesResponse {
    pub routes: Vec<PopularRoute>,
    pub total: usize,
}

/// Validated result count: default 3, accepted range 1..=10
fn parse_count(count: Option<i64>) -> AppResult<usize> {
    match count {
        None => Ok(DEFAULT_COUNT),
        Some(n) if (1..=MAX_COUNT as i64).contains(&n) => Ok(n as usize),
        Some(_) => Err(AppError::InvalidInput(format!(
            "Count must be between 1 and {}",
            MAX_COUNT
        ))),
    }
}

fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

async fn cached_recommendations(
    state: &AppState,
    route: &[PoiId],
    count: usize,
) -> AppResult<Vec<Recommendation>> {
    cached!(
        state.recommendation_cache,
        CacheKey::Recommendation {
            route: route.to_vec(),
            count,
        },
        async { Ok::<_, AppError>(state.recommender.recommend_next(route, count).await) }
    )
}

/// Handler for next-POI recommendations
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let count = parse_count(request.count)?;

    tracing::info!(
        request_id = %request_id,
        route_len = request.route.len(),
        count,
        "Processing recommendation request"
    );

    let recommendations: Vec<Recommendation> =
        cached_recommendations(&state, &request.route, count)
            .await?
            .into_iter()
            .map(|rec| Recommendation {
                score: round_score(rec.score),
                ..rec
            })
            .collect();

    tracing::info!(
        request_id = %request_id,
        returned = recommendations.len(),
        "Recommendations generated"
    );

    Ok(Json(RecommendationResponse {
        status: "success",
        count: recommendations.len(),
        recommendations,
        route: request.route,
    }))
}

/// Handler for recommendations around a position
pub async fn recommend_nearby(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NearbyRequest>,
) -> AppResult<Json<NearbyResponse>> {
    if !(-90.0..=90.0).contains(&request.lat) || !(-180.0..=180.0).contains(&request.lon) {
        return Err(AppError::InvalidInput(
            "Coordinates out of range".to_string(),
        ));
    }

    let recommendations = recommend_near(
        &state.store,
        request.lat,
        request.lon,
        &request.themes,
        request.limit.unwrap_or(DEFAULT_NEARBY_LIMIT),
    );

    Ok(Json(NearbyResponse {
        count: recommendations.len(),
        recommendations,
    }))
}

pub async fn recommender_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Recommendation service is running",
        "city": state.config.city,
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<RecommenderStats> {
    Json(state.recommender.stats())
}

pub async fn popular_routes(State(state): State<Arc<AppState>>) -> Json<PopularRoutesResponse> {
    let routes = state.recommender.popular_routes(POPULAR_ROUTES_LIMIT);
    Json(PopularRoutesResponse {
        total: routes.len(),
        routes,
    })
}
