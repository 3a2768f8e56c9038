use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    cache::Cache,
    config::Config,
    middleware::{make_span_with_request_id, request_id_middleware},
    models::{PoiId, VisitRecord},
    services::{
        timing, HybridRecommender, RouteClassifier, RoutingEngine, RoutingService, SmartCache,
    },
    store::PoiStore,
};

pub mod cache;
pub mod pois;
pub mod recommendations;
pub mod routing;

/// Everything the handlers share; built once at startup
pub struct AppState {
    pub config: Config,
    pub store: Arc<PoiStore>,
    pub recommender: HybridRecommender,
    pub routing: RoutingService,
    pub recommendation_cache: Cache,
    pub visit_hours: HashMap<PoiId, f64>,
    pub transition_hours: HashMap<(PoiId, PoiId), f64>,
}

impl AppState {
    /// Derives every in-memory structure from the loaded data
    ///
    /// The smart cache is read from `config.smart_cache_path` when usable and
    /// rebuilt (and saved) otherwise.
    pub async fn build(
        config: Config,
        store: PoiStore,
        visits: Vec<VisitRecord>,
        engine: Arc<dyn RoutingEngine>,
        classifier: Option<Arc<dyn RouteClassifier>>,
    ) -> Self {
        let store = Arc::new(store);

        let smart_cache = SmartCache::load_or_build(
            &config.smart_cache_path,
            &store,
            &visits,
            classifier.as_deref(),
        )
        .await;

        let visit_hours = timing::infer_visit_hours(&store, &visits);
        let transition_hours = timing::infer_transition_hours(&store, &visits);

        let routing = RoutingService::new(
            engine,
            Cache::new(config.route_cache_capacity),
            config.route_fallback,
        );
        let recommendation_cache = Cache::new(config.recommendation_cache_capacity);
        let recommender = HybridRecommender::new(store.clone(), smart_cache, classifier);

        tracing::info!(
            pois = store.len(),
            visits = visits.len(),
            engine = routing.engine().name(),
            classifier = recommender.classifier_available(),
            "Application state ready"
        );

        Self {
            config,
            store,
            recommender,
            routing,
            recommendation_cache,
            visit_hours,
            transition_hours,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/route", get(routing::proxy_route))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// Routes under /api
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        // POIs
        .route("/pois", get(pois::list_pois))
        .route("/pois/:id", get(pois::get_poi))
        .route("/pois/on-route", post(routing::pois_on_route))
        .route("/themes", get(pois::list_themes))
        .route("/travel-time", get(pois::travel_time))
        // Recommendations
        .route("/recommend", post(recommendations::recommend))
        .route("/recommend/nearby", post(recommendations::recommend_nearby))
        .route("/recommendations", post(recommendations::recommend))
        .route(
            "/recommendations/health",
            get(recommendations::recommender_health),
        )
        .route("/stats", get(recommendations::stats))
        .route("/popular-routes", get(recommendations::popular_routes))
        // Routing
        .route("/route", post(routing::route_segment))
        .route("/routes/batch", post(routing::routes_batch))
        .route("/cache/clear", post(cache::clear_cache))
        .route("/cache/info", get(cache::cache_info))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let engine = state.routing.engine();
    let available = engine.health_check().await;

    Json(json!({
        "status": "healthy",
        "city": state.config.city,
        "recommender_loaded": true,
        "classifier_available": state.recommender.classifier_available(),
        "total_pois": state.store.len(),
        "routing": {
            "engine": engine.name(),
            "available": available,
            "endpoints": engine.endpoints(),
        }
    }))
}
