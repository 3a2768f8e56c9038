pub mod loader;
mod poi_store;

pub use loader::{load_pois, load_visits};
pub use poi_store::PoiStore;
