pub mod fetch;
pub mod freshness;
pub mod kline_cache;
pub mod kline_store;
pub mod scalar_cache;
