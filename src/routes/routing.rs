use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{LonLat, TravelProfile},
    routes::AppState,
    services::routing::{OnRoutePoi, SegmentRequest, SegmentRoutes},
};

const DEFAULT_BUFFER_KM: f64 = 5.0;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    #[serde(default = "default_transport_mode")]
    pub transport_mode: String,
}

fn default_transport_mode() -> String {
    "driving".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SegmentBody {
    pub from: LonLat,
    pub to: LonLat,
    pub profiles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub segments: Vec<SegmentRequest>,
    pub profiles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct OnRouteBody {
    pub from: LonLat,
    pub to: LonLat,
    pub profile: Option<String>,
    pub buffer_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct OnRouteResponse {
    pub pois: Vec<OnRoutePoi>,
    pub total: usize,
    pub buffer_km: f64,
}

/// Requested profiles, every profile when none are given
fn parse_profiles(names: Option<Vec<String>>) -> AppResult<Vec<TravelProfile>> {
    match names {
        None => Ok(TravelProfile::ALL.to_vec()),
        Some(names) => names
            .iter()
            .map(|name| name.parse().map_err(AppError::InvalidInput))
            .collect(),
    }
}

/// Handler for the raw routing engine proxy
pub async fn proxy_route(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ProxyQuery>,
) -> AppResult<Json<Value>> {
    let profile = TravelProfile::parse_lenient(&query.transport_mode);

    tracing::info!(
        request_id = %request_id,
        profile = %profile,
        "Proxying route request"
    );

    let body = state
        .routing
        .proxy(
            [query.start_lon, query.start_lat],
            [query.end_lon, query.end_lat],
            profile,
        )
        .await?;

    Ok(Json(body))
}

/// Handler for per-profile routes of one segment
pub async fn route_segment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SegmentBody>,
) -> AppResult<Json<SegmentRoutes>> {
    let profiles = parse_profiles(body.profiles)?;
    Ok(Json(state.routing.segment(body.from, body.to, &profiles).await))
}

/// Handler for per-profile routes of many segments
pub async fn routes_batch(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<BatchBody>,
) -> AppResult<Json<BTreeMap<String, SegmentRoutes>>> {
    let profiles = parse_profiles(body.profiles)?;

    tracing::info!(
        request_id = %request_id,
        segments = body.segments.len(),
        profiles = profiles.len(),
        "Processing batch route request"
    );

    Ok(Json(state.routing.batch(body.segments, &profiles).await))
}

/// Handler for POIs along the route between two points
pub async fn pois_on_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OnRouteBody>,
) -> AppResult<Json<OnRouteResponse>> {
    let profile = match body.profile.as_deref() {
        Some(name) => name.parse().map_err(AppError::InvalidInput)?,
        None => TravelProfile::Car,
    };
    let buffer_km = body.buffer_km.unwrap_or(DEFAULT_BUFFER_KM);
    if !buffer_km.is_finite() || buffer_km < 0.0 {
        return Err(AppError::InvalidInput(
            "buffer_km must be a non-negative number".to_string(),
        ));
    }

    let pois = state
        .routing
        .pois_on_route(&state.store, body.from, body.to, profile, buffer_km)
        .await?;

    Ok(Json(OnRouteResponse {
        total: pois.len(),
        pois,
        buffer_km,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profiles() {
        assert_eq!(parse_profiles(None).unwrap(), TravelProfile::ALL.to_vec());
        assert_eq!(
            parse_profiles(Some(vec!["foot".to_string(), "car".to_string()])).unwrap(),
            vec![TravelProfile::Foot, TravelProfile::Car]
        );
        assert!(parse_profiles(Some(vec!["rocket".to_string()])).is_err());
    }
}
