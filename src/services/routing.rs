/// Routing engine access
///
/// Wraps an external road-network router (OSRM or Valhalla) behind the
/// [`RoutingEngine`] trait, memoizes per-profile lookups in a bounded LRU
/// cache and degrades to a straight line when the engine cannot be reached.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use geo::{Distance, Haversine, Point};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    cache::{Cache, CacheKey},
    cached,
    config::Config,
    error::{AppError, AppResult},
    models::{
        format_distance, straight_line, LonLat, OsrmRouteResponse, PoiId, RouteSummary,
        TravelProfile, ValhallaDirectionsOptions, ValhallaLocation, ValhallaRouteRequest,
        ValhallaRouteResponse,
    },
    store::PoiStore,
};

/// Point inside the city used to probe engine health
const PROBE_POINT: LonLat = [123.735, 13.142];

/// Trait for routing engines
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RoutingEngine: Send + Sync {
    /// Best route between two points, reshaped into a summary
    async fn route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<RouteSummary>;

    /// The engine's own response body, untouched
    async fn raw_route(&self, from: LonLat, to: LonLat, profile: TravelProfile)
        -> AppResult<Value>;

    /// Whether the engine currently answers requests
    async fn health_check(&self) -> bool;

    fn name(&self) -> &'static str;

    /// Base URLs, keyed by what they serve
    fn endpoints(&self) -> BTreeMap<String, String>;
}

/// OSRM over HTTP, one server per travel profile
#[derive(Clone)]
pub struct OsrmClient {
    http_client: HttpClient,
    car_url: String,
    bicycle_url: String,
    foot_url: String,
}

impl OsrmClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.routing_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            car_url: config.osrm_car_url.trim_end_matches('/').to_string(),
            bicycle_url: config.osrm_bicycle_url.trim_end_matches('/').to_string(),
            foot_url: config.osrm_foot_url.trim_end_matches('/').to_string(),
        })
    }

    fn base_url(&self, profile: TravelProfile) -> &str {
        match profile {
            TravelProfile::Car => &self.car_url,
            TravelProfile::Bicycle => &self.bicycle_url,
            TravelProfile::Foot => &self.foot_url,
        }
    }

    /// `{base}/route/v1/{profile}/{lon},{lat};{lon},{lat}`
    fn route_url(&self, from: LonLat, to: LonLat, profile: TravelProfile) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url(profile),
            profile.osrm_profile(),
            from[0],
            from[1],
            to[0],
            to[1]
        )
    }

    async fn fetch(&self, from: LonLat, to: LonLat, profile: TravelProfile) -> AppResult<Value> {
        let response = self
            .http_client
            .get(self.route_url(from, to, profile))
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "OSRM returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl RoutingEngine for OsrmClient {
    #[instrument(skip(self))]
    async fn route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<RouteSummary> {
        let body = self.fetch(from, to, profile).await?;
        let response: OsrmRouteResponse = serde_json::from_value(body)?;

        if response.code != "Ok" {
            return Err(AppError::ExternalApi(format!(
                "OSRM returned code {}: {}",
                response.code,
                response.message.unwrap_or_default()
            )));
        }

        response
            .routes
            .into_iter()
            .next()
            .map(RouteSummary::from)
            .ok_or_else(|| AppError::ExternalApi("OSRM returned no routes".to_string()))
    }

    #[instrument(skip(self))]
    async fn raw_route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<Value> {
        self.fetch(from, to, profile).await
    }

    async fn health_check(&self) -> bool {
        let url = format!(
            "{}/nearest/v1/{}/{},{}",
            self.car_url,
            TravelProfile::Car.osrm_profile(),
            PROBE_POINT[0],
            PROBE_POINT[1]
        );
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "OSRM health probe failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "osrm"
    }

    fn endpoints(&self) -> BTreeMap<String, String> {
        TravelProfile::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), self.base_url(*p).to_string()))
            .collect()
    }
}

/// Valhalla over HTTP; one server handles every costing model
#[derive(Clone)]
pub struct ValhallaClient {
    http_client: HttpClient,
    url: String,
}

impl ValhallaClient {
    pub fn new(url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    fn request(from: LonLat, to: LonLat, profile: TravelProfile) -> ValhallaRouteRequest {
        ValhallaRouteRequest {
            locations: vec![
                ValhallaLocation {
                    lat: from[1],
                    lon: from[0],
                },
                ValhallaLocation {
                    lat: to[1],
                    lon: to[0],
                },
            ],
            costing: profile.valhalla_costing().to_string(),
            directions_options: ValhallaDirectionsOptions {
                units: "kilometers".to_string(),
            },
        }
    }

    async fn fetch(&self, from: LonLat, to: LonLat, profile: TravelProfile) -> AppResult<Value> {
        let response = self
            .http_client
            .post(format!("{}/route", self.url))
            .json(&Self::request(from, to, profile))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Valhalla returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl RoutingEngine for ValhallaClient {
    #[instrument(skip(self))]
    async fn route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<RouteSummary> {
        let response: ValhallaRouteResponse =
            serde_json::from_value(self.fetch(from, to, profile).await?)?;
        Ok(response.trip.into())
    }

    #[instrument(skip(self))]
    async fn raw_route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<Value> {
        self.fetch(from, to, profile).await
    }

    async fn health_check(&self) -> bool {
        match self.http_client.get(format!("{}/status", self.url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Valhalla health probe failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "valhalla"
    }

    fn endpoints(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("valhalla".to_string(), self.url.clone())])
    }
}

/// Builds the engine named by `ROUTING_ENGINE`
pub fn engine_from_config(config: &Config) -> AppResult<Arc<dyn RoutingEngine>> {
    match config.routing_engine.to_lowercase().as_str() {
        "osrm" => Ok(Arc::new(OsrmClient::new(config)?)),
        "valhalla" => Ok(Arc::new(ValhallaClient::new(
            &config.valhalla_url,
            Duration::from_secs(config.routing_timeout_secs),
        )?)),
        other => Err(AppError::InvalidInput(format!(
            "Unknown routing engine: {}",
            other
        ))),
    }
}

/// Routes for one segment, keyed by profile name, plus a display distance
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SegmentRoutes {
    #[serde(flatten)]
    pub routes: BTreeMap<String, RouteSummary>,
    pub distance_formatted: String,
}

/// One named origin/destination pair of a batch request
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentRequest {
    pub id: String,
    pub from: LonLat,
    pub to: LonLat,
}

/// A POI lying close to a computed route
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OnRoutePoi {
    pub id: PoiId,
    pub name: String,
    pub theme: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance to the nearest route vertex
    pub distance_km: f64,
}

/// Straight-line stand-in for an unreachable engine, shaped like an OSRM answer
pub fn fallback_route(from: LonLat, to: LonLat) -> Value {
    json!({
        "code": "Ok",
        "routes": [{
            "geometry": straight_line(from, to),
            "duration": 0,
            "distance": 0
        }],
        "fallback": true,
        "message": "Routing engine not available, showing direct route"
    })
}

/// Routing engine plus the route cache and fallback policy
#[derive(Clone)]
pub struct RoutingService {
    engine: Arc<dyn RoutingEngine>,
    cache: Cache,
    fallback: bool,
}

impl RoutingService {
    pub fn new(engine: Arc<dyn RoutingEngine>, cache: Cache, fallback: bool) -> Self {
        Self {
            engine,
            cache,
            fallback,
        }
    }

    pub fn engine(&self) -> &dyn RoutingEngine {
        self.engine.as_ref()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Cached route lookup; failures are not cached
    pub async fn route(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<RouteSummary> {
        cached!(
            self.cache,
            CacheKey::Route { from, to, profile },
            self.engine.route(from, to, profile)
        )
    }

    /// Looks up every requested profile; profiles that fail are left out
    ///
    /// `distance_formatted` reflects the last profile that succeeded, or
    /// `"0 m"` when none did.
    pub async fn segment(
        &self,
        from: LonLat,
        to: LonLat,
        profiles: &[TravelProfile],
    ) -> SegmentRoutes {
        let mut routes = BTreeMap::new();
        let mut distance = 0.0;

        for profile in profiles {
            match self.route(from, to, *profile).await {
                Ok(summary) => {
                    distance = summary.distance;
                    routes.insert(profile.as_str().to_string(), summary);
                }
                Err(e) => {
                    tracing::warn!(profile = %profile, error = %e, "Route lookup failed");
                }
            }
        }

        SegmentRoutes {
            routes,
            distance_formatted: format_distance(distance),
        }
    }

    /// Runs [`segment`](Self::segment) for many segments in parallel
    pub async fn batch(
        &self,
        segments: Vec<SegmentRequest>,
        profiles: &[TravelProfile],
    ) -> BTreeMap<String, SegmentRoutes> {
        let mut tasks = Vec::new();

        for segment in segments {
            let service = self.clone();
            let profiles = profiles.to_vec();
            let task = tokio::spawn(async move {
                service.segment(segment.from, segment.to, &profiles).await
            });
            tasks.push((segment.id, task));
        }

        let mut results = BTreeMap::new();
        for (id, task) in tasks {
            match task.await {
                Ok(routes) => {
                    results.insert(id, routes);
                }
                Err(e) => {
                    tracing::error!(segment = %id, error = %e, "Task join error");
                }
            }
        }

        results
    }

    /// Raw engine response, or a straight line when the engine is
    /// unreachable and fallback is enabled
    pub async fn proxy(
        &self,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
    ) -> AppResult<Value> {
        match self.engine.raw_route(from, to, profile).await {
            Ok(body) => Ok(body),
            Err(e @ (AppError::HttpClient(_) | AppError::Unavailable(_))) if self.fallback => {
                tracing::warn!(
                    engine = self.engine.name(),
                    error = %e,
                    "Routing engine unreachable, serving straight line"
                );
                Ok(fallback_route(from, to))
            }
            Err(e) => Err(e),
        }
    }

    /// POIs within `buffer_km` of any vertex of the route from `from` to `to`
    pub async fn pois_on_route(
        &self,
        store: &PoiStore,
        from: LonLat,
        to: LonLat,
        profile: TravelProfile,
        buffer_km: f64,
    ) -> AppResult<Vec<OnRoutePoi>> {
        let vertices: Vec<Point<f64>> = self
            .route(from, to, profile)
            .await?
            .vertices()
            .into_iter()
            .map(|v| Point::new(v[0], v[1]))
            .collect();

        if vertices.is_empty() {
            return Ok(Vec::new());
        }

        let pois = store
            .all()
            .filter_map(|poi| {
                let distance_km = vertices
                    .iter()
                    .map(|v| Haversine::distance(poi.point(), *v) / 1000.0)
                    .fold(f64::INFINITY, f64::min);

                (distance_km <= buffer_km).then(|| OnRoutePoi {
                    id: poi.id,
                    name: poi.name.clone(),
                    theme: poi.theme.clone(),
                    latitude: poi.lat,
                    longitude: poi.lon,
                    distance_km,
                })
            })
            .collect();

        Ok(pois)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Poi;
    use axum::{extract::Path, routing::get, routing::post, Json, Router};

    const FROM: LonLat = [123.735, 13.142];
    const TO: LonLat = [123.746, 13.136];

    fn summary(distance: f64) -> RouteSummary {
        RouteSummary {
            duration: 5.0,
            distance,
            geometry: straight_line(FROM, TO),
            fallback: false,
        }
    }

    fn service(engine: MockRoutingEngine, fallback: bool) -> RoutingService {
        RoutingService::new(Arc::new(engine), Cache::new(10), fallback)
    }

    /// Serves `router` on an ephemeral local port and returns its base URL
    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_route_is_cached() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .times(1)
            .returning(|_, _, _| Ok(summary(1500.0)));
        let service = service(engine, true);

        let first = service.route(FROM, TO, TravelProfile::Car).await.unwrap();
        let second = service.route(FROM, TO, TravelProfile::Car).await.unwrap();
        assert_eq!(first, second);

        let info = service.cache().info().await;
        assert_eq!((info.hits, info.misses, info.size), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .times(2)
            .returning(|_, _, _| Err(AppError::ExternalApi("NoRoute".to_string())));
        let service = service(engine, true);

        assert!(service.route(FROM, TO, TravelProfile::Foot).await.is_err());
        assert!(service.route(FROM, TO, TravelProfile::Foot).await.is_err());
        assert_eq!(service.cache().info().await.size, 0);
    }

    #[tokio::test]
    async fn test_segment_omits_failed_profiles() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .returning(|_, _, profile| match profile {
                TravelProfile::Car => Ok(summary(5000.0)),
                TravelProfile::Bicycle => Err(AppError::ExternalApi("down".to_string())),
                TravelProfile::Foot => Ok(summary(4200.0)),
            });
        let service = service(engine, true);

        let segment = service.segment(FROM, TO, &TravelProfile::ALL).await;
        assert_eq!(
            segment.routes.keys().collect::<Vec<_>>(),
            vec!["car", "foot"]
        );
        assert_eq!(segment.distance_formatted, "4.2 km");

        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["car"]["distance"], 5000.0);
        assert!(json.get("bicycle").is_none());
        assert_eq!(json["distance_formatted"], "4.2 km");
    }

    #[tokio::test]
    async fn test_segment_with_no_success_reports_zero() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .returning(|_, _, _| Err(AppError::ExternalApi("down".to_string())));
        let segment = service(engine, true)
            .segment(FROM, TO, &[TravelProfile::Car])
            .await;
        assert!(segment.routes.is_empty());
        assert_eq!(segment.distance_formatted, "0 m");
    }

    #[tokio::test]
    async fn test_batch_keys_results_by_segment_id() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .returning(|from, _, _| Ok(summary(if from == FROM { 800.0 } else { 2500.0 })));
        let service = service(engine, true);

        let segments = vec![
            SegmentRequest {
                id: "a-b".to_string(),
                from: FROM,
                to: TO,
            },
            SegmentRequest {
                id: "b-a".to_string(),
                from: TO,
                to: FROM,
            },
        ];
        let results = service.batch(segments, &[TravelProfile::Car]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["a-b"].distance_formatted, "800 m");
        assert_eq!(results["b-a"].distance_formatted, "2.5 km");
    }

    #[tokio::test]
    async fn test_proxy_falls_back_to_straight_line() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_raw_route()
            .returning(|_, _, _| Err(AppError::Unavailable("connection refused".to_string())));
        engine.expect_name().return_const("mock");

        let body = service(engine, true)
            .proxy(FROM, TO, TravelProfile::Car)
            .await
            .unwrap();
        assert_eq!(body["code"], "Ok");
        assert_eq!(body["fallback"], true);
        assert_eq!(body["routes"][0]["distance"], 0);
        assert_eq!(
            body["routes"][0]["geometry"]["coordinates"],
            json!([[123.735, 13.142], [123.746, 13.136]])
        );
    }

    #[tokio::test]
    async fn test_proxy_without_fallback_propagates() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_raw_route()
            .returning(|_, _, _| Err(AppError::Unavailable("connection refused".to_string())));

        let err = service(engine, false)
            .proxy(FROM, TO, TravelProfile::Car)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_proxy_does_not_mask_engine_errors() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_raw_route()
            .returning(|_, _, _| {
                Err(AppError::ExternalApi(
                    "OSRM returned status 400".to_string(),
                ))
            });

        let err = service(engine, true)
            .proxy(FROM, TO, TravelProfile::Car)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalApi(_)));
    }

    #[tokio::test]
    async fn test_pois_on_route_within_buffer() {
        let mut engine = MockRoutingEngine::new();
        engine
            .expect_route()
            .returning(|_, _, _| Ok(summary(1500.0)));
        let store = PoiStore::from_pois(vec![
            Poi::new(1, "Legazpi Cathedral", "Religious", 13.142, 123.735),
            Poi::new(2, "Embarcadero", "Waterfront", 13.143, 123.742),
            Poi::new(3, "Mayon Viewpoint", "Scenic", 13.257, 123.685),
        ]);

        let pois = service(engine, true)
            .pois_on_route(&store, FROM, TO, TravelProfile::Car, 1.0)
            .await
            .unwrap();

        let ids: Vec<PoiId> = pois.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(pois[0].distance_km, 0.0);
    }

    #[tokio::test]
    async fn test_osrm_client_against_local_server() {
        let router = Router::new().route(
            "/route/v1/:profile/:coords",
            get(|Path((profile, coords)): Path<(String, String)>| async move {
                assert_eq!(profile, "cycling");
                assert_eq!(coords, "123.735,13.142;123.746,13.136");
                Json(json!({
                    "code": "Ok",
                    "routes": [{
                        "duration": 600.0,
                        "distance": 1500.0,
                        "geometry": {"type": "LineString", "coordinates": [[123.735, 13.142], [123.746, 13.136]]}
                    }]
                }))
            }),
        );
        let url = spawn_server(router).await;
        let config = Config {
            osrm_bicycle_url: url,
            ..Config::default()
        };
        let client = OsrmClient::new(&config).unwrap();

        let summary = client.route(FROM, TO, TravelProfile::Bicycle).await.unwrap();
        assert_eq!(summary.duration, 10.0);
        assert_eq!(summary.distance, 1500.0);

        let raw = client.raw_route(FROM, TO, TravelProfile::Bicycle).await.unwrap();
        assert_eq!(raw["code"], "Ok");
    }

    #[tokio::test]
    async fn test_osrm_client_rejects_non_ok_code() {
        let router = Router::new().route(
            "/route/v1/:profile/:coords",
            get(|| async { Json(json!({"code": "NoRoute", "message": "Impossible route"})) }),
        );
        let url = spawn_server(router).await;
        let config = Config {
            osrm_car_url: url,
            ..Config::default()
        };

        let err = OsrmClient::new(&config)
            .unwrap()
            .route(FROM, TO, TravelProfile::Car)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalApi(msg) if msg.contains("NoRoute")));
    }

    #[tokio::test]
    async fn test_osrm_client_unreachable_is_http_error() {
        let config = Config {
            osrm_car_url: "http://127.0.0.1:1".to_string(),
            routing_timeout_secs: 2,
            ..Config::default()
        };
        let client = OsrmClient::new(&config).unwrap();

        let err = client.raw_route(FROM, TO, TravelProfile::Car).await.unwrap_err();
        assert!(matches!(err, AppError::HttpClient(_)));
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_valhalla_client_against_local_server() {
        let router = Router::new().route(
            "/route",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["costing"], "pedestrian");
                assert_eq!(body["locations"][0]["lat"], 13.142);
                Json(json!({
                    "trip": {
                        "locations": body["locations"],
                        "summary": {"length": 1.2, "time": 900.0}
                    }
                }))
            }),
        );
        let url = spawn_server(router).await;
        let client = ValhallaClient::new(&url, Duration::from_secs(5)).unwrap();

        let summary = client.route(FROM, TO, TravelProfile::Foot).await.unwrap();
        assert_eq!(summary.distance, 1200.0);
        assert_eq!(summary.duration, 15.0);
        assert_eq!(summary.vertices(), vec![FROM, TO]);
    }

    #[test]
    fn test_engine_from_config() {
        let osrm = engine_from_config(&Config::default()).unwrap();
        assert_eq!(osrm.name(), "osrm");
        assert_eq!(osrm.endpoints().len(), 3);

        let valhalla = engine_from_config(&Config {
            routing_engine: "Valhalla".to_string(),
            ..Config::default()
        })
        .unwrap();
        assert_eq!(valhalla.name(), "valhalla");

        let unknown = engine_from_config(&Config {
            routing_engine: "graphhopper".to_string(),
            ..Config::default()
        });
        assert!(unknown.is_err());
    }
}
