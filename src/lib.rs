//! UPC Product Lookup
//!
//! Looks up product metadata by UPC, downloads and validates product images,
//! asks a vision model for the best product photo and caches the combined
//! record in Redis. Processing runs as one background job per UPC; results
//! are read back from the cache.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
