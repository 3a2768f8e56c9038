mod poi;
mod recommendation;
mod routing;
mod visit;

pub use poi::{Poi, PoiId, ThemeCount};
pub use recommendation::{
    ClassifierPrediction, PopularRoute, Recommendation, RecommendationSource, RecommenderStats,
    RouteStop,
};
pub use routing::{
    format_distance, line_vertices, straight_line, LonLat, OsrmRoute, OsrmRouteResponse,
    RouteSummary, TravelProfile, ValhallaDirectionsOptions, ValhallaLocation,
    ValhallaRouteRequest, ValhallaRouteResponse, ValhallaSummary, ValhallaTrip,
};
pub use visit::{VisitRecord, VisitRow};
