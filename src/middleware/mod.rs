pub mod response_cache;

pub use response_cache::{cache_layer, cache_lookup, cache_store, CacheContext, CacheMiddlewareState};
