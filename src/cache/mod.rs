pub mod memo;

mod macros;

pub use memo::{Cache, CacheInfo, CacheKey};
