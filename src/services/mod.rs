pub mod classifier;
pub mod clustering;
pub mod nearby;
pub mod recommender;
pub mod routing;
pub mod smart_cache;
pub mod timing;
pub mod transitions;

pub use classifier::{HttpClassifier, RouteClassifier};
pub use recommender::HybridRecommender;
pub use routing::{engine_from_config, RoutingEngine, RoutingService};
pub use smart_cache::SmartCache;
