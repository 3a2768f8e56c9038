use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Poi, PoiId},
    routes::AppState,
};

/// POI as exposed to clients
#[derive(Debug, Serialize)]
pub struct PoiView {
    pub id: PoiId,
    pub name: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub theme: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Poi> for PoiView {
    fn from(poi: &Poi) -> Self {
        Self {
            id: poi.id,
            name: poi.name.clone(),
            full_name: poi.display_full_name().to_string(),
            theme: poi.theme.clone(),
            latitude: poi.lat,
            longitude: poi.lon,
            rating: poi.rating,
            description: poi.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PoiListResponse {
    pub pois: Vec<PoiView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct PoiDetail {
    #[serde(flatten)]
    pub poi: PoiView,
    pub estimated_visit_hours: f64,
}

#[derive(Debug, Serialize)]
pub struct ThemesResponse {
    pub themes: Vec<String>,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
pub struct PoiFilter {
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TravelTimeQuery {
    pub from: PoiId,
    pub to: PoiId,
}

#[derive(Debug, Serialize)]
pub struct TravelTimeResponse {
    pub from: PoiId,
    pub to: PoiId,
    pub hours: f64,
}

/// Handler for listing POIs, optionally filtered by theme
pub async fn list_pois(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<PoiFilter>,
) -> Json<PoiListResponse> {
    let pois: Vec<PoiView> = match filter.theme.as_deref() {
        Some(theme) => state.store.by_theme(theme).map(PoiView::from).collect(),
        None => state.store.all().map(PoiView::from).collect(),
    };

    Json(PoiListResponse {
        total: pois.len(),
        pois,
    })
}

pub async fn get_poi(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<PoiId>,
) -> AppResult<Json<PoiDetail>> {
    let poi = state.store.get(id).ok_or_else(|| {
        tracing::debug!(request_id = %request_id, poi_id = id, "POI lookup missed");
        AppError::NotFound("POI not found".to_string())
    })?;

    Ok(Json(PoiDetail {
        poi: PoiView::from(poi),
        estimated_visit_hours: state.visit_hours.get(&id).copied().unwrap_or(1.5),
    }))
}

pub async fn list_themes(State(state): State<Arc<AppState>>) -> Json<ThemesResponse> {
    let themes = state.store.themes();
    Json(ThemesResponse {
        themes: themes.iter().map(|t| t.theme.clone()).collect(),
        counts: themes.into_iter().map(|t| (t.theme, t.count)).collect(),
    })
}

/// Handler for the estimated travel time between two POIs
pub async fn travel_time(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TravelTimeQuery>,
) -> AppResult<Json<TravelTimeResponse>> {
    let hours = state
        .transition_hours
        .get(&(query.from, query.to))
        .copied()
        .ok_or_else(|| AppError::NotFound("POI not found".to_string()))?;

    Ok(Json(TravelTimeResponse {
        from: query.from,
        to: query.to,
        hours,
    }))
}
